//! flightwx core crate.
//!
//! Current implemented scope:
//! - chunked, schema-driven ingestion of airport, flight and weather CSVs
//! - departure/weather feature join on location bucket and lagged hour
//! - derived delay status, hourly congestion tables and delay summaries

mod config;
mod congestion;
mod features;
mod geo;
mod loader;
mod observability;
mod queries;
mod reader;
mod schema;
mod status;
mod store;
mod temporal;
mod transform;

pub use config::{pipeline_config_from_env, PipelineConfig, DEFAULT_DELAY_THRESHOLD};
pub use congestion::{
    rebuild_congestion_tables, CongestionReport, CongestionTableReport, Direction,
    CONGESTION_COLUMNS,
};
pub use features::{
    build_departure_features, rebuild_feature_table, CalendarFeatures, FeatureError,
    FeatureJoinConfig, FeatureJoinReport, FeatureRecord, FeatureRequest, FeatureTableReport,
    FlightFacts, MatchPolicy, WeatherObservation, DEFAULT_HOUR_LAG, FEATURES_TABLE,
    FEATURE_COLUMNS,
};
pub use geo::{quantize, quantize_degrees, GeoBucket};
pub use loader::{
    discover_files, file_pattern, load_dataset, load_file, FileFailure, FileLoadReport,
    LoadConfig, LoadError, LoadReport, DEFAULT_CHUNK_SIZE,
};
pub use observability::{
    init_logging, log_job_finish, log_job_start, log_pipeline_config, logging_config_from_env,
    LogFormat, LoggingConfig, LoggingInitError, LOG_MODULES,
};
pub use queries::{flight_and_delay_summary_by_airport, AirportDelaySummary};
pub use reader::{ChunkedCsvReader, RowBatch};
pub use schema::{
    derived_columns, descriptors, normalize_column_name, schema_fingerprint, storage_columns,
    validate_descriptors, Dataset, DerivedColumn, FeatureDescriptor, MissingPolicy, SchemaError,
    SemanticType, SCHEMA_VERSION,
};
pub use status::{
    apply_delay_status, DelayStatus, StatusReport, ARRIVAL_STATUS_COLUMN, DEPARTURE_STATUS_COLUMN,
};
pub use store::{Store, StoreError, ROW_INDEX_COLUMN};
pub use temporal::{
    combine, format_date, format_timestamp, parse_date, parse_time_of_day, parse_timestamp,
    round_to_hour, shift_back, shift_forward, TimeOfDay, DATE_FORMAT, TIMESTAMP_FORMAT,
};
pub use transform::{
    parse_boolean, parse_float, parse_integer, CellValue, CoercionStats, TransformedBatch,
    TransformedRecord, Transformer,
};
