//! Canonical descriptor tables for the raw datasets.
//!
//! Each dataset has exactly one ordered list mapping a raw CSV column to its
//! storage column and semantic type. The lists are versioned through
//! [`SCHEMA_VERSION`] and a SHA-256 fingerprint over the ordered
//! `storage_name:type` pairs, so a change to any mapping is visible in the
//! load logs.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dataset {
    Airports,
    Flights,
    Weather,
}

impl Dataset {
    pub const ALL: [Dataset; 3] = [Dataset::Airports, Dataset::Flights, Dataset::Weather];

    pub fn table_name(self) -> &'static str {
        match self {
            Self::Airports => "airports",
            Self::Flights => "flights",
            Self::Weather => "weather",
        }
    }

    pub fn missing_policy(self) -> MissingPolicy {
        match self {
            Self::Airports | Self::Flights => MissingPolicy::ZeroDefault,
            Self::Weather => MissingPolicy::ForwardFill,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissingPolicy {
    ZeroDefault,
    ForwardFill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SemanticType {
    Integer,
    Float,
    Boolean,
    String,
    Date,
    TimeOfDay,
    Timestamp,
}

impl SemanticType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::String => "string",
            Self::Date => "date",
            Self::TimeOfDay => "time_of_day",
            Self::Timestamp => "timestamp",
        }
    }

    pub fn sql_type(self) -> &'static str {
        match self {
            Self::Integer | Self::Boolean => "INTEGER",
            Self::Float => "REAL",
            Self::String => "TEXT",
            Self::Date => "DATE",
            Self::TimeOfDay | Self::Timestamp => "TIMESTAMP",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeatureDescriptor {
    pub raw_name: &'static str,
    pub storage_name: &'static str,
    pub semantic_type: SemanticType,
}

const fn fd(
    raw_name: &'static str,
    storage_name: &'static str,
    semantic_type: SemanticType,
) -> FeatureDescriptor {
    FeatureDescriptor {
        raw_name,
        storage_name,
        semantic_type,
    }
}

use SemanticType::{Boolean, Date, Float, Integer, String as Text, TimeOfDay, Timestamp};

// Identifier-like numeric codes stay text: no arithmetic is ever applied to them.
const AIRPORT_DESCRIPTORS: &[FeatureDescriptor] = &[
    fd("AIRPORT_SEQ_ID", "airport_seq_id", Text),
    fd("AIRPORT_ID", "airport_id", Text),
    fd("AIRPORT", "airport", Text),
    fd("DISPLAY_AIRPORT_NAME", "display_airport_name", Text),
    fd(
        "DISPLAY_AIRPORT_CITY_NAME_FULL",
        "display_airport_city_name_full",
        Text,
    ),
    fd("AIRPORT_WAC_SEQ_ID2", "airport_wac_seq_id2", Text),
    fd("AIRPORT_WAC", "airport_wac", Integer),
    fd("AIRPORT_COUNTRY_NAME", "airport_country_name", Text),
    fd("AIRPORT_COUNTRY_CODE_ISO", "airport_country_code_iso", Text),
    fd("AIRPORT_STATE_NAME", "airport_state_name", Text),
    fd("AIRPORT_STATE_CODE", "airport_state_code", Text),
    fd("AIRPORT_STATE_FIPS", "airport_state_fips", Integer),
    fd("CITY_MARKET_SEQ_ID", "city_market_seq_id", Integer),
    fd("CITY_MARKET_ID", "city_market_id", Integer),
    fd(
        "DISPLAY_CITY_MARKET_NAME_FULL",
        "display_city_market_full_name",
        Text,
    ),
    fd("CITY_MARKET_WAC_SEQ_ID2", "city_market_wac_seq_id2", Integer),
    fd("CITY_MARKET_WAC", "city_market_wac", Integer),
    fd("LAT_DEGREES", "lat_degrees", Integer),
    fd("LAT_HEMISPHERE", "lat_hemisphere", Text),
    fd("LAT_MINUTES", "lat_minutes", Integer),
    fd("LAT_SECONDS", "lat_seconds", Integer),
    fd("LATITUDE", "latitude", Float),
    fd("LON_DEGREES", "lon_degrees", Integer),
    fd("LON_HEMISPHERE", "lon_hemisphere", Text),
    fd("LON_MINUTES", "lon_minutes", Integer),
    fd("LON_SECONDS", "lon_seconds", Integer),
    fd("LONGITUDE", "longitude", Float),
    fd("UTC_LOCAL_TIME_VARIATION", "utc_local_time_variation", Text),
    fd("AIRPORT_START_DATE", "airport_start_date", Date),
    fd("AIRPORT_THRU_DATE", "airport_thru_date", Date),
    fd("AIRPORT_IS_CLOSED", "airport_is_closed", Boolean),
    fd("AIRPORT_IS_LATEST", "airport_is_latest", Boolean),
];

const FLIGHT_DESCRIPTORS: &[FeatureDescriptor] = &[
    fd("Year", "year", Integer),
    fd("Month", "month", Integer),
    fd("DayofMonth", "day_of_month", Integer),
    fd("DayOfWeek", "day_of_week", Integer),
    fd("FlightDate", "flight_date", Date),
    fd("UniqueCarrier", "carrier", Text),
    fd("AirlineID", "airline_id", Text),
    fd("TailNum", "tail_number", Text),
    fd("Origin", "origin", Text),
    fd("OriginAirportID", "origin_airport_id", Text),
    fd("OriginAirportSeqID", "origin_airport_sequence_id", Text),
    fd("Dest", "dest", Text),
    fd("DestAirportID", "dest_airport_id", Text),
    fd("CRSDepTime", "departure_time_scheduled", TimeOfDay),
    fd("DepTimeBlk", "departure_time_block", Text),
    fd("DepTime", "departure_time_actual", TimeOfDay),
    fd("DepDelay", "departure_delay", Integer),
    fd("DepDel15", "departure_was_delayed_15", Boolean),
    fd("CRSArrTime", "arrival_time_scheduled", TimeOfDay),
    fd("ArrTimeBlk", "arrival_time_block", Text),
    fd("ArrTime", "arrival_time_actual", TimeOfDay),
    fd("ArrDelay", "arrival_delay", Integer),
    fd("ArrDel15", "arrival_was_delayed_15", Boolean),
    fd("Cancelled", "cancelled", Boolean),
    fd("CancellationCode", "cancelled_code", Text),
    fd("Diverted", "diverted", Boolean),
    fd("CRSElapsedTime", "elapsed_time_scheduled", Integer),
    fd("ActualElapsedTime", "elapsed_time_actual", Integer),
    fd("Distance", "distance", Integer),
    fd("Flights", "flights", Integer),
];

// Temperatures, precipitation, pressure and visibility keep their decimals;
// counts and compass/speed readings are whole numbers in the source.
const WEATHER_DESCRIPTORS: &[FeatureDescriptor] = &[
    fd("STATION", "station", Text),
    fd("STATION_NAME", "station_name", Text),
    fd("ELEVATION", "elevation", Float),
    fd("LATITUDE", "latitude", Float),
    fd("LONGITUDE", "longitude", Float),
    fd("DATE", "date", Timestamp),
    fd("HOURLYVISIBILITY", "hourly_visibility", Float),
    fd("HOURLYDRYBULBTEMPF", "hourly_dry_bulb_temp_f", Float),
    fd("HOURLYWETBULBTEMPF", "hourly_wet_bulb_temp_f", Float),
    fd("HOURLYDewPointTempF", "hourly_dew_point_temp_f", Float),
    fd("HOURLYRelativeHumidity", "hourly_relative_humidity", Integer),
    fd("HOURLYPrecip", "hourly_precipitation", Float),
    fd("HOURLYWindSpeed", "hourly_wind_speed", Integer),
    fd("HOURLYWindDirection", "hourly_wind_direction", Integer),
    fd("HOURLYWindGustSpeed", "hourly_wind_gust_speed", Integer),
    fd("HOURLYStationPressure", "hourly_station_pressure", Float),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DerivedColumn {
    pub storage_name: &'static str,
    pub sql_type: &'static str,
}

const AIRPORT_DERIVED: &[DerivedColumn] = &[
    DerivedColumn {
        storage_name: "int_latitude",
        sql_type: "INTEGER",
    },
    DerivedColumn {
        storage_name: "int_longitude",
        sql_type: "INTEGER",
    },
];

const FLIGHT_DERIVED: &[DerivedColumn] = &[
    DerivedColumn {
        storage_name: "departure_hour_scheduled",
        sql_type: "TIMESTAMP",
    },
    DerivedColumn {
        storage_name: "arrival_hour_scheduled",
        sql_type: "TIMESTAMP",
    },
];

const WEATHER_DERIVED: &[DerivedColumn] = &[
    DerivedColumn {
        storage_name: "int_latitude",
        sql_type: "INTEGER",
    },
    DerivedColumn {
        storage_name: "int_longitude",
        sql_type: "INTEGER",
    },
    DerivedColumn {
        storage_name: "measurement_hour",
        sql_type: "TIMESTAMP",
    },
];

pub fn descriptors(dataset: Dataset) -> &'static [FeatureDescriptor] {
    match dataset {
        Dataset::Airports => AIRPORT_DESCRIPTORS,
        Dataset::Flights => FLIGHT_DESCRIPTORS,
        Dataset::Weather => WEATHER_DESCRIPTORS,
    }
}

pub fn derived_columns(dataset: Dataset) -> &'static [DerivedColumn] {
    match dataset {
        Dataset::Airports => AIRPORT_DERIVED,
        Dataset::Flights => FLIGHT_DERIVED,
        Dataset::Weather => WEATHER_DERIVED,
    }
}

pub fn storage_columns(dataset: Dataset) -> Vec<&'static str> {
    descriptors(dataset)
        .iter()
        .map(|d| d.storage_name)
        .chain(derived_columns(dataset).iter().map(|d| d.storage_name))
        .collect()
}

pub fn normalize_column_name(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase()
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("duplicate raw column '{name}' in {dataset:?} descriptors")]
    DuplicateRawName { dataset: Dataset, name: String },
    #[error("duplicate storage column '{name}' in {dataset:?} descriptors")]
    DuplicateStorageName { dataset: Dataset, name: String },
}

pub fn validate_descriptors(dataset: Dataset) -> Result<(), SchemaError> {
    validate_descriptor_list(dataset, descriptors(dataset), derived_columns(dataset))
}

fn validate_descriptor_list(
    dataset: Dataset,
    list: &[FeatureDescriptor],
    derived: &[DerivedColumn],
) -> Result<(), SchemaError> {
    let mut raw_seen = HashSet::new();
    let mut storage_seen = HashSet::new();

    for descriptor in list {
        if !raw_seen.insert(normalize_column_name(descriptor.raw_name)) {
            return Err(SchemaError::DuplicateRawName {
                dataset,
                name: descriptor.raw_name.to_string(),
            });
        }
        if !storage_seen.insert(descriptor.storage_name) {
            return Err(SchemaError::DuplicateStorageName {
                dataset,
                name: descriptor.storage_name.to_string(),
            });
        }
    }

    for column in derived {
        if !storage_seen.insert(column.storage_name) {
            return Err(SchemaError::DuplicateStorageName {
                dataset,
                name: column.storage_name.to_string(),
            });
        }
    }

    Ok(())
}

pub fn schema_fingerprint(dataset: Dataset) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("version:{SCHEMA_VERSION};"));
    hasher.update(format!("table:{};columns:", dataset.table_name()));
    for descriptor in descriptors(dataset) {
        hasher.update(descriptor.storage_name.as_bytes());
        hasher.update(format!(":{};", descriptor.semantic_type.as_str()));
    }
    hasher.update("derived:");
    for column in derived_columns(dataset) {
        hasher.update(column.storage_name.as_bytes());
        hasher.update(";");
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_registry_list_passes_validation() {
        for dataset in Dataset::ALL {
            validate_descriptors(dataset).expect("canonical lists must be unique");
        }
    }

    #[test]
    fn duplicate_storage_name_is_rejected() {
        let list = [
            fd("A", "same", Integer),
            fd("B", "same", Float),
        ];
        let err = validate_descriptor_list(Dataset::Flights, &list, &[]).unwrap_err();
        assert_eq!(
            err,
            SchemaError::DuplicateStorageName {
                dataset: Dataset::Flights,
                name: "same".to_string()
            }
        );
    }

    #[test]
    fn raw_names_collide_after_normalization() {
        let list = [fd("Dep Time", "a", Text), fd("DEPTIME", "b", Text)];
        let err = validate_descriptor_list(Dataset::Flights, &list, &[]).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateRawName { .. }));
    }

    #[test]
    fn derived_column_cannot_shadow_descriptor() {
        let list = [fd("LAT", "int_latitude", Integer)];
        let err = validate_descriptor_list(Dataset::Airports, &list, AIRPORT_DERIVED).unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateStorageName { .. }));
    }

    #[test]
    fn normalization_strips_whitespace_and_folds_case() {
        assert_eq!(normalize_column_name(" Dep Time\t"), "deptime");
        assert_eq!(normalize_column_name("HOURLYDewPointTempF"), "hourlydewpointtempf");
    }

    #[test]
    fn fingerprint_is_stable_and_dataset_specific() {
        assert_eq!(
            schema_fingerprint(Dataset::Weather),
            schema_fingerprint(Dataset::Weather)
        );
        assert_ne!(
            schema_fingerprint(Dataset::Weather),
            schema_fingerprint(Dataset::Flights)
        );
        assert_eq!(schema_fingerprint(Dataset::Airports).len(), 64);
    }

    #[test]
    fn storage_columns_append_derived_after_descriptors() {
        let columns = storage_columns(Dataset::Flights);
        assert_eq!(columns.first(), Some(&"year"));
        assert_eq!(
            &columns[columns.len() - 2..],
            &["departure_hour_scheduled", "arrival_hour_scheduled"]
        );
    }
}
