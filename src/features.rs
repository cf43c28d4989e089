//! Departure/weather feature join.
//!
//! A flight departing in hour `H` from airport `X` is paired with the weather
//! observation(s) recorded in hour `H - lag` at a station sharing `X`'s
//! tenth-degree bucket. Flights and weather are read with two independent
//! parameterized queries and joined in memory.

use std::collections::HashMap;

use chrono::{Datelike, Duration as ChronoDuration, NaiveDate, NaiveDateTime, Timelike};
use rusqlite::{named_params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::geo::GeoBucket;
use crate::store::{Store, StoreError, ROW_INDEX_COLUMN};
use crate::temporal::{
    combine, format_date, format_timestamp, parse_date, parse_timestamp, shift_forward,
};
use crate::transform::CellValue;

pub const FEATURES_TABLE: &str = "features";
pub const DEFAULT_HOUR_LAG: i64 = 3;

pub const FEATURE_COLUMNS: &[(&str, &str)] = &[
    ("flight_row_index", "INTEGER"),
    ("weather_row_index", "INTEGER"),
    ("flight_date", "DATE"),
    ("carrier", "TEXT"),
    ("origin", "TEXT"),
    ("dest", "TEXT"),
    ("departure_time_scheduled", "TIMESTAMP"),
    ("departure_hour_scheduled", "TIMESTAMP"),
    ("departure_delay", "INTEGER"),
    ("departure_was_delayed_15", "INTEGER"),
    ("cancelled", "INTEGER"),
    ("distance", "INTEGER"),
    ("int_latitude", "INTEGER"),
    ("int_longitude", "INTEGER"),
    ("station", "TEXT"),
    ("measurement_hour", "TIMESTAMP"),
    ("hourly_visibility", "REAL"),
    ("hourly_dry_bulb_temp_f", "REAL"),
    ("hourly_wet_bulb_temp_f", "REAL"),
    ("hourly_dew_point_temp_f", "REAL"),
    ("hourly_relative_humidity", "INTEGER"),
    ("hourly_precipitation", "REAL"),
    ("hourly_wind_speed", "INTEGER"),
    ("hourly_wind_direction", "INTEGER"),
    ("hourly_wind_gust_speed", "INTEGER"),
    ("hourly_station_pressure", "REAL"),
    ("month", "INTEGER"),
    ("day_of_month", "INTEGER"),
    ("day_of_week", "INTEGER"),
    ("hour_of_day", "INTEGER"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchPolicy {
    FanOut,
    Strict,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureRequest {
    pub airport_code: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureJoinConfig {
    pub hour_lag: i64,
    pub match_policy: MatchPolicy,
}

impl Default for FeatureJoinConfig {
    fn default() -> Self {
        Self {
            hour_lag: DEFAULT_HOUR_LAG,
            match_policy: MatchPolicy::FanOut,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureJoinReport {
    pub airport_code: String,
    pub start_date: String,
    pub end_date: String,
    pub hour_lag: i64,
    pub location: Option<GeoBucket>,
    pub flights_read: u64,
    pub weather_rows_read: u64,
    pub records_emitted: u64,
    pub unmatched_flights: u64,
    pub ambiguous_flights: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureTableReport {
    pub table: String,
    pub rows_written: u64,
    pub airports: Vec<FeatureJoinReport>,
}

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("invalid feature request: {0}")]
    InvalidRequest(String),
    #[error("invalid feature join config: {0}")]
    InvalidConfig(String),
    #[error(
        "flight {flight_row_index} at {departure_hour} matches {matches} weather rows"
    )]
    AmbiguousWeatherMatch {
        flight_row_index: i64,
        departure_hour: String,
        matches: usize,
    },
    #[error("unreadable value '{value}' in {table}.{column}")]
    InvalidStoredValue {
        table: &'static str,
        column: &'static str,
        value: String,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<rusqlite::Error> for FeatureError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Store(StoreError::Sqlite(err))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlightFacts {
    pub row_index: i64,
    pub flight_date: NaiveDate,
    pub carrier: Option<String>,
    pub origin: String,
    pub dest: Option<String>,
    pub departure_time_scheduled: Option<NaiveDateTime>,
    pub departure_hour_scheduled: NaiveDateTime,
    pub departure_delay: Option<i64>,
    pub departure_was_delayed_15: bool,
    pub cancelled: bool,
    pub distance: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeatherObservation {
    pub row_index: i64,
    pub station: Option<String>,
    pub measurement_hour: NaiveDateTime,
    pub visibility: Option<f64>,
    pub dry_bulb_temp_f: Option<f64>,
    pub wet_bulb_temp_f: Option<f64>,
    pub dew_point_temp_f: Option<f64>,
    pub relative_humidity: Option<i64>,
    pub precipitation: Option<f64>,
    pub wind_speed: Option<i64>,
    pub wind_direction: Option<i64>,
    pub wind_gust_speed: Option<i64>,
    pub station_pressure: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarFeatures {
    pub month: u32,
    pub day_of_month: u32,
    pub day_of_week: u32,
    pub hour_of_day: u32,
}

impl CalendarFeatures {
    pub fn from_departure(ts: NaiveDateTime) -> Self {
        Self {
            month: ts.month(),
            day_of_month: ts.day(),
            day_of_week: ts.weekday().num_days_from_monday(),
            hour_of_day: ts.hour(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRecord {
    pub flight: FlightFacts,
    pub weather: WeatherObservation,
    pub location: GeoBucket,
    pub calendar: CalendarFeatures,
}

impl FeatureRecord {
    fn to_cells(&self, row_index: i64) -> Vec<CellValue> {
        let flight = &self.flight;
        let weather = &self.weather;
        vec![
            CellValue::Integer(row_index),
            CellValue::Integer(flight.row_index),
            CellValue::Integer(weather.row_index),
            CellValue::Date(flight.flight_date),
            opt_text(&flight.carrier),
            CellValue::Text(flight.origin.clone()),
            opt_text(&flight.dest),
            flight
                .departure_time_scheduled
                .map_or(CellValue::Null, CellValue::Timestamp),
            CellValue::Timestamp(flight.departure_hour_scheduled),
            opt_int(flight.departure_delay),
            CellValue::Boolean(flight.departure_was_delayed_15),
            CellValue::Boolean(flight.cancelled),
            opt_int(flight.distance),
            CellValue::Integer(self.location.lat),
            CellValue::Integer(self.location.lon),
            opt_text(&weather.station),
            CellValue::Timestamp(weather.measurement_hour),
            opt_float(weather.visibility),
            opt_float(weather.dry_bulb_temp_f),
            opt_float(weather.wet_bulb_temp_f),
            opt_float(weather.dew_point_temp_f),
            opt_int(weather.relative_humidity),
            opt_float(weather.precipitation),
            opt_int(weather.wind_speed),
            opt_int(weather.wind_direction),
            opt_int(weather.wind_gust_speed),
            opt_float(weather.station_pressure),
            CellValue::Integer(i64::from(self.calendar.month)),
            CellValue::Integer(i64::from(self.calendar.day_of_month)),
            CellValue::Integer(i64::from(self.calendar.day_of_week)),
            CellValue::Integer(i64::from(self.calendar.hour_of_day)),
        ]
    }
}

pub fn build_departure_features(
    store: &Store,
    req: &FeatureRequest,
    cfg: &FeatureJoinConfig,
) -> Result<(Vec<FeatureRecord>, FeatureJoinReport), FeatureError> {
    validate_request(req)?;
    validate_config(cfg)?;

    info!(
        component = "features",
        event = "features.join.start",
        store_path = %store.path().display(),
        airport_code = %req.airport_code,
        start_date = %req.start_date,
        end_date = %req.end_date,
        hour_lag = cfg.hour_lag,
        match_policy = ?cfg.match_policy
    );

    let mut report = FeatureJoinReport {
        airport_code: req.airport_code.clone(),
        start_date: format_date(req.start_date),
        end_date: format_date(req.end_date),
        hour_lag: cfg.hour_lag,
        location: None,
        flights_read: 0,
        weather_rows_read: 0,
        records_emitted: 0,
        unmatched_flights: 0,
        ambiguous_flights: 0,
    };

    let Some(location) = resolve_airport_location(store, &req.airport_code)? else {
        warn!(
            component = "features",
            event = "features.airport.unresolved",
            airport_code = %req.airport_code
        );
        return Ok((Vec::new(), report));
    };
    report.location = Some(location);

    let flights = read_flights(store, req)?;
    let weather = read_weather(store, req, cfg, location)?;
    report.flights_read = flights.len() as u64;
    report.weather_rows_read = weather.len() as u64;

    let mut by_departure_hour: HashMap<NaiveDateTime, Vec<&WeatherObservation>> = HashMap::new();
    for observation in &weather {
        by_departure_hour
            .entry(shift_forward(observation.measurement_hour, cfg.hour_lag))
            .or_default()
            .push(observation);
    }

    let mut records = Vec::new();
    for flight in &flights {
        let matches = by_departure_hour
            .get(&flight.departure_hour_scheduled)
            .map(Vec::as_slice)
            .unwrap_or_default();

        match matches.len() {
            0 => {
                report.unmatched_flights += 1;
                continue;
            }
            1 => {}
            n => {
                if cfg.match_policy == MatchPolicy::Strict {
                    return Err(FeatureError::AmbiguousWeatherMatch {
                        flight_row_index: flight.row_index,
                        departure_hour: format_timestamp(flight.departure_hour_scheduled),
                        matches: n,
                    });
                }
                report.ambiguous_flights += 1;
            }
        }

        let calendar = CalendarFeatures::from_departure(flight.departure_hour_scheduled);
        for observation in matches {
            records.push(FeatureRecord {
                flight: flight.clone(),
                weather: (*observation).clone(),
                location,
                calendar,
            });
        }
    }
    report.records_emitted = records.len() as u64;

    if report.ambiguous_flights > 0 {
        warn!(
            component = "features",
            event = "features.join.ambiguous",
            airport_code = %req.airport_code,
            ambiguous_flights = report.ambiguous_flights
        );
    }

    info!(
        component = "features",
        event = "features.join.finish",
        airport_code = %req.airport_code,
        flights_read = report.flights_read,
        weather_rows_read = report.weather_rows_read,
        records_emitted = report.records_emitted,
        unmatched_flights = report.unmatched_flights,
        ambiguous_flights = report.ambiguous_flights
    );

    Ok((records, report))
}

pub fn rebuild_feature_table(
    store: &mut Store,
    requests: &[FeatureRequest],
    cfg: &FeatureJoinConfig,
) -> Result<FeatureTableReport, FeatureError> {
    validate_config(cfg)?;
    for req in requests {
        validate_request(req)?;
    }

    let mut columns: Vec<(&str, &str)> = vec![(ROW_INDEX_COLUMN, "INTEGER NOT NULL")];
    columns.extend_from_slice(FEATURE_COLUMNS);
    let names: Vec<&str> = columns.iter().map(|(name, _)| *name).collect();

    store.drop_table(FEATURES_TABLE)?;
    store.create_table(FEATURES_TABLE, &columns)?;
    info!(
        component = "features",
        event = "features.table.recreated",
        table = FEATURES_TABLE,
        requests = requests.len()
    );

    let mut report = FeatureTableReport {
        table: FEATURES_TABLE.to_string(),
        rows_written: 0,
        airports: Vec::with_capacity(requests.len()),
    };
    let mut next_index = 1_i64;

    for req in requests {
        let (records, join_report) = build_departure_features(store, req, cfg)?;
        let rows: Vec<Vec<CellValue>> = records
            .iter()
            .enumerate()
            .map(|(offset, record)| record.to_cells(next_index + offset as i64))
            .collect();
        let written = store.insert_rows(FEATURES_TABLE, &names, &rows)?;
        next_index += written as i64;
        report.rows_written += written as u64;
        report.airports.push(join_report);
    }

    info!(
        component = "features",
        event = "features.table.finish",
        table = FEATURES_TABLE,
        rows_written = report.rows_written
    );

    Ok(report)
}

fn resolve_airport_location(
    store: &Store,
    airport_code: &str,
) -> Result<Option<GeoBucket>, FeatureError> {
    // Re-ingested airport files repeat rows; the newest copy wins.
    let location = store
        .connection()
        .query_row(
            "
            SELECT int_latitude, int_longitude
            FROM airports
            WHERE airport = :airport_code
              AND airport_is_latest = 1
              AND int_latitude IS NOT NULL
              AND int_longitude IS NOT NULL
            ORDER BY row_index DESC
            LIMIT 1
            ",
            named_params! { ":airport_code": airport_code },
            |row| {
                Ok(GeoBucket {
                    lat: row.get(0)?,
                    lon: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(location)
}

fn read_flights(store: &Store, req: &FeatureRequest) -> Result<Vec<FlightFacts>, FeatureError> {
    let mut stmt = store.connection().prepare(
        "
        SELECT
            row_index,
            flight_date,
            carrier,
            origin,
            dest,
            departure_time_scheduled,
            departure_hour_scheduled,
            departure_delay,
            departure_was_delayed_15,
            cancelled,
            distance
        FROM flights
        WHERE origin = :airport_code
          AND flight_date BETWEEN :start_date AND :end_date
          AND departure_hour_scheduled IS NOT NULL
        ORDER BY departure_hour_scheduled ASC, row_index ASC
        ",
    )?;

    let mut rows = stmt.query(named_params! {
        ":airport_code": req.airport_code,
        ":start_date": format_date(req.start_date),
        ":end_date": format_date(req.end_date),
    })?;

    let mut flights = Vec::new();
    while let Some(row) = rows.next()? {
        let flight_date: String = row.get(1)?;
        let flight_date = parse_date(&flight_date).ok_or(FeatureError::InvalidStoredValue {
            table: "flights",
            column: "flight_date",
            value: flight_date,
        })?;

        flights.push(FlightFacts {
            row_index: row.get(0)?,
            flight_date,
            carrier: row.get(2)?,
            origin: row.get(3)?,
            dest: row.get(4)?,
            departure_time_scheduled: optional_timestamp(row, 5, "flights", "departure_time_scheduled")?,
            departure_hour_scheduled: required_timestamp(row, 6, "flights", "departure_hour_scheduled")?,
            departure_delay: row.get(7)?,
            departure_was_delayed_15: row.get::<_, Option<i64>>(8)?.unwrap_or(0) != 0,
            cancelled: row.get::<_, Option<i64>>(9)?.unwrap_or(0) != 0,
            distance: row.get(10)?,
        });
    }

    Ok(flights)
}

fn read_weather(
    store: &Store,
    req: &FeatureRequest,
    cfg: &FeatureJoinConfig,
    location: GeoBucket,
) -> Result<Vec<WeatherObservation>, FeatureError> {
    // Widened by the lag so departures early on the first day still see the
    // previous evening's observations.
    let window_start =
        combine(req.start_date, ChronoDuration::zero()) - ChronoDuration::hours(cfg.hour_lag);
    let window_end = combine(req.end_date, ChronoDuration::days(1));

    let mut stmt = store.connection().prepare(
        "
        SELECT
            row_index,
            station,
            measurement_hour,
            hourly_visibility,
            hourly_dry_bulb_temp_f,
            hourly_wet_bulb_temp_f,
            hourly_dew_point_temp_f,
            hourly_relative_humidity,
            hourly_precipitation,
            hourly_wind_speed,
            hourly_wind_direction,
            hourly_wind_gust_speed,
            hourly_station_pressure
        FROM weather
        WHERE int_latitude = :int_latitude
          AND int_longitude = :int_longitude
          AND measurement_hour >= :window_start
          AND measurement_hour < :window_end
        ORDER BY measurement_hour ASC, row_index ASC
        ",
    )?;

    let mut rows = stmt.query(named_params! {
        ":int_latitude": location.lat,
        ":int_longitude": location.lon,
        ":window_start": format_timestamp(window_start),
        ":window_end": format_timestamp(window_end),
    })?;

    let mut observations = Vec::new();
    while let Some(row) = rows.next()? {
        observations.push(WeatherObservation {
            row_index: row.get(0)?,
            station: row.get(1)?,
            measurement_hour: required_timestamp(row, 2, "weather", "measurement_hour")?,
            visibility: row.get(3)?,
            dry_bulb_temp_f: row.get(4)?,
            wet_bulb_temp_f: row.get(5)?,
            dew_point_temp_f: row.get(6)?,
            relative_humidity: row.get(7)?,
            precipitation: row.get(8)?,
            wind_speed: row.get(9)?,
            wind_direction: row.get(10)?,
            wind_gust_speed: row.get(11)?,
            station_pressure: row.get(12)?,
        });
    }

    Ok(observations)
}

fn optional_timestamp(
    row: &Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<Option<NaiveDateTime>, FeatureError> {
    match row.get::<_, Option<String>>(idx)? {
        None => Ok(None),
        Some(raw) => match parse_timestamp(&raw) {
            Some(ts) => Ok(Some(ts)),
            None => Err(FeatureError::InvalidStoredValue {
                table,
                column,
                value: raw,
            }),
        },
    }
}

fn required_timestamp(
    row: &Row<'_>,
    idx: usize,
    table: &'static str,
    column: &'static str,
) -> Result<NaiveDateTime, FeatureError> {
    optional_timestamp(row, idx, table, column)?.ok_or_else(|| FeatureError::InvalidStoredValue {
        table,
        column,
        value: "NULL".to_string(),
    })
}

fn validate_request(req: &FeatureRequest) -> Result<(), FeatureError> {
    if req.airport_code.trim().is_empty() {
        return Err(FeatureError::InvalidRequest(
            "airport_code must not be empty".to_string(),
        ));
    }

    if req.end_date < req.start_date {
        return Err(FeatureError::InvalidRequest(format!(
            "end_date {} is before start_date {}",
            req.end_date, req.start_date
        )));
    }

    Ok(())
}

fn validate_config(cfg: &FeatureJoinConfig) -> Result<(), FeatureError> {
    if cfg.hour_lag < 0 {
        return Err(FeatureError::InvalidConfig(
            "hour_lag must be >= 0".to_string(),
        ));
    }
    Ok(())
}

fn opt_text(value: &Option<String>) -> CellValue {
    value.clone().map_or(CellValue::Null, CellValue::Text)
}

fn opt_int(value: Option<i64>) -> CellValue {
    value.map_or(CellValue::Null, CellValue::Integer)
}

fn opt_float(value: Option<f64>) -> CellValue {
    value.map_or(CellValue::Null, CellValue::Float)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(start: &str, end: &str) -> FeatureRequest {
        FeatureRequest {
            airport_code: "MDT".to_string(),
            start_date: parse_date(start).unwrap(),
            end_date: parse_date(end).unwrap(),
        }
    }

    #[test]
    fn calendar_features_use_monday_zero() {
        // 2017-06-01 was a Thursday.
        let calendar =
            CalendarFeatures::from_departure(parse_timestamp("2017-06-01 14:00").unwrap());
        assert_eq!(
            calendar,
            CalendarFeatures {
                month: 6,
                day_of_month: 1,
                day_of_week: 3,
                hour_of_day: 14,
            }
        );
    }

    #[test]
    fn inverted_date_range_is_rejected() {
        let err = validate_request(&request("2017-06-02", "2017-06-01")).unwrap_err();
        assert!(matches!(err, FeatureError::InvalidRequest(_)));
        assert!(validate_request(&request("2017-06-01", "2017-06-01")).is_ok());
    }

    #[test]
    fn blank_airport_code_is_rejected() {
        let mut req = request("2017-06-01", "2017-06-01");
        req.airport_code = "  ".to_string();
        assert!(matches!(
            validate_request(&req),
            Err(FeatureError::InvalidRequest(_))
        ));
    }

    #[test]
    fn negative_lag_is_rejected() {
        let cfg = FeatureJoinConfig {
            hour_lag: -1,
            ..FeatureJoinConfig::default()
        };
        assert!(matches!(
            validate_config(&cfg),
            Err(FeatureError::InvalidConfig(_))
        ));
    }

    #[test]
    fn record_cells_follow_column_layout() {
        let hour = parse_timestamp("2017-06-01 14:00").unwrap();
        let record = FeatureRecord {
            flight: FlightFacts {
                row_index: 9,
                flight_date: parse_date("2017-06-01").unwrap(),
                carrier: Some("AA".to_string()),
                origin: "MDT".to_string(),
                dest: None,
                departure_time_scheduled: Some(hour),
                departure_hour_scheduled: hour,
                departure_delay: Some(4),
                departure_was_delayed_15: false,
                cancelled: false,
                distance: Some(461),
            },
            weather: WeatherObservation {
                row_index: 3,
                station: Some("WBAN:14751".to_string()),
                measurement_hour: parse_timestamp("2017-06-01 11:00").unwrap(),
                visibility: None,
                dry_bulb_temp_f: Some(70.0),
                wet_bulb_temp_f: None,
                dew_point_temp_f: None,
                relative_humidity: Some(58),
                precipitation: Some(0.0),
                wind_speed: None,
                wind_direction: None,
                wind_gust_speed: Some(0),
                station_pressure: None,
            },
            location: GeoBucket { lat: 402, lon: -767 },
            calendar: CalendarFeatures::from_departure(hour),
        };

        let cells = record.to_cells(1);
        assert_eq!(cells.len(), FEATURE_COLUMNS.len() + 1);
        assert_eq!(cells[0], CellValue::Integer(1));
        assert_eq!(cells[1], CellValue::Integer(9));
        assert_eq!(cells[2], CellValue::Integer(3));
        assert_eq!(cells[6], CellValue::Null);
        assert_eq!(cells[cells.len() - 1], CellValue::Integer(14));
    }
}
