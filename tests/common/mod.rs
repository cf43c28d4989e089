#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use flightwx::{descriptors, Dataset};

pub type FixtureRow = Vec<(&'static str, String)>;

/// Write a CSV whose header is the dataset's raw column names. Cells not
/// named in a row are left empty; a later entry for the same column wins.
pub fn write_dataset_csv(path: &Path, dataset: Dataset, rows: &[FixtureRow]) -> PathBuf {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("fixture directory should be creatable");
    }

    let header: Vec<&str> = descriptors(dataset).iter().map(|d| d.raw_name).collect();
    let mut body = header.join(",");
    body.push('\n');
    for row in rows {
        let cells: Vec<String> = header
            .iter()
            .map(|name| {
                row.iter()
                    .rev()
                    .find(|(key, _)| key == name)
                    .map(|(_, value)| value.clone())
                    .unwrap_or_default()
            })
            .collect();
        body.push_str(&cells.join(","));
        body.push('\n');
    }

    fs::write(path, body).expect("fixture should be written");
    path.to_path_buf()
}

pub fn airport(code: &str, seq_id: &str, airport_id: &str, lat: f64, lon: f64) -> FixtureRow {
    vec![
        ("AIRPORT_SEQ_ID", seq_id.to_string()),
        ("AIRPORT_ID", airport_id.to_string()),
        ("AIRPORT", code.to_string()),
        ("DISPLAY_AIRPORT_NAME", format!("{code} International")),
        ("LATITUDE", lat.to_string()),
        ("LONGITUDE", lon.to_string()),
        ("AIRPORT_START_DATE", "2007-01-01".to_string()),
        ("AIRPORT_IS_CLOSED", "0".to_string()),
        ("AIRPORT_IS_LATEST", "1".to_string()),
    ]
}

pub fn mdt() -> FixtureRow {
    airport("MDT", "1146703", "11467", 40.1935, -76.7633)
}

/// An on-time MDT → ORD departure.
pub fn flight(date: &str, departure: &str, departure_delay: &str) -> FixtureRow {
    vec![
        ("FlightDate", date.to_string()),
        ("UniqueCarrier", "AA".to_string()),
        ("Origin", "MDT".to_string()),
        ("OriginAirportID", "11467".to_string()),
        ("OriginAirportSeqID", "1146703".to_string()),
        ("Dest", "ORD".to_string()),
        ("DestAirportID", "13930".to_string()),
        ("CRSDepTime", departure.to_string()),
        ("DepDelay", departure_delay.to_string()),
        ("DepDel15", "0.00".to_string()),
        ("CRSArrTime", "1617".to_string()),
        ("ArrDelay", "0.00".to_string()),
        ("ArrDel15", "0.00".to_string()),
        ("Cancelled", "0.00".to_string()),
        ("Diverted", "0.00".to_string()),
        ("Distance", "461.00".to_string()),
        ("Flights", "1.00".to_string()),
    ]
}

pub fn with(mut row: FixtureRow, column: &'static str, value: &str) -> FixtureRow {
    row.push((column, value.to_string()));
    row
}

/// A Harrisburg observation inside MDT's location bucket.
pub fn weather(timestamp: &str, dry_bulb: &str) -> FixtureRow {
    vec![
        ("STATION", "WBAN:14751".to_string()),
        ("STATION_NAME", "HARRISBURG CAPITAL CITY AIRPORT PA US".to_string()),
        ("ELEVATION", "103.6".to_string()),
        ("LATITUDE", "40.1936".to_string()),
        ("LONGITUDE", "-76.7628".to_string()),
        ("DATE", timestamp.to_string()),
        ("HOURLYVISIBILITY", "10.00".to_string()),
        ("HOURLYDRYBULBTEMPF", dry_bulb.to_string()),
        ("HOURLYWETBULBTEMPF", "60".to_string()),
        ("HOURLYDewPointTempF", "55".to_string()),
        ("HOURLYRelativeHumidity", "58".to_string()),
        ("HOURLYPrecip", "0.00".to_string()),
        ("HOURLYWindSpeed", "7".to_string()),
        ("HOURLYWindDirection", "270".to_string()),
        ("HOURLYStationPressure", "29.80".to_string()),
    ]
}
