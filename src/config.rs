//! Pipeline configuration from `FLIGHTWX_*` environment variables.

use std::env;
use std::path::PathBuf;

use chrono::NaiveDate;
use tracing::warn;

use crate::features::{FeatureJoinConfig, FeatureRequest, MatchPolicy, DEFAULT_HOUR_LAG};
use crate::loader::{LoadConfig, DEFAULT_CHUNK_SIZE};
use crate::temporal::parse_date;

pub const DEFAULT_DELAY_THRESHOLD: i64 = 15;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub store_path: PathBuf,
    pub raw_root: PathBuf,
    pub chunk_size: usize,
    pub hour_lag: i64,
    pub airport_codes: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub delay_threshold: i64,
    pub match_policy: MatchPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("data/interim/airline_data.db"),
            raw_root: PathBuf::from("data/raw"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            hour_lag: DEFAULT_HOUR_LAG,
            airport_codes: vec!["MDT".to_string(), "ATL".to_string(), "LAX".to_string()],
            start_date: NaiveDate::from_ymd_opt(2017, 1, 1).expect("valid calendar date"),
            end_date: NaiveDate::from_ymd_opt(2017, 12, 31).expect("valid calendar date"),
            delay_threshold: DEFAULT_DELAY_THRESHOLD,
            match_policy: MatchPolicy::FanOut,
        }
    }
}

impl PipelineConfig {
    pub fn load_config(&self) -> LoadConfig {
        LoadConfig {
            chunk_size: self.chunk_size,
        }
    }

    pub fn join_config(&self) -> FeatureJoinConfig {
        FeatureJoinConfig {
            hour_lag: self.hour_lag,
            match_policy: self.match_policy,
        }
    }

    pub fn feature_requests(&self) -> Vec<FeatureRequest> {
        self.airport_codes
            .iter()
            .map(|code| FeatureRequest {
                airport_code: code.clone(),
                start_date: self.start_date,
                end_date: self.end_date,
            })
            .collect()
    }
}

pub fn pipeline_config_from_env() -> PipelineConfig {
    let mut config = PipelineConfig::default();

    if let Some(path) = non_empty_var("FLIGHTWX_STORE_PATH") {
        config.store_path = PathBuf::from(path);
    }

    if let Some(path) = non_empty_var("FLIGHTWX_RAW_ROOT") {
        config.raw_root = PathBuf::from(path);
    }

    if let Some(raw) = non_empty_var("FLIGHTWX_CHUNK_SIZE") {
        match raw.parse::<usize>() {
            Ok(size) if size > 0 => config.chunk_size = size,
            _ => invalid_value("FLIGHTWX_CHUNK_SIZE", &raw),
        }
    }

    if let Some(raw) = non_empty_var("FLIGHTWX_HOUR_LAG") {
        match raw.parse::<i64>() {
            Ok(lag) if lag >= 0 => config.hour_lag = lag,
            _ => invalid_value("FLIGHTWX_HOUR_LAG", &raw),
        }
    }

    if let Some(raw) = non_empty_var("FLIGHTWX_AIRPORTS") {
        let codes = parse_airport_codes(&raw);
        if codes.is_empty() {
            invalid_value("FLIGHTWX_AIRPORTS", &raw);
        } else {
            config.airport_codes = codes;
        }
    }

    if let Some(raw) = non_empty_var("FLIGHTWX_START_DATE") {
        match parse_date(&raw) {
            Some(date) => config.start_date = date,
            None => invalid_value("FLIGHTWX_START_DATE", &raw),
        }
    }

    if let Some(raw) = non_empty_var("FLIGHTWX_END_DATE") {
        match parse_date(&raw) {
            Some(date) => config.end_date = date,
            None => invalid_value("FLIGHTWX_END_DATE", &raw),
        }
    }

    if let Some(raw) = non_empty_var("FLIGHTWX_DELAY_THRESHOLD") {
        match raw.parse::<i64>() {
            Ok(threshold) => config.delay_threshold = threshold,
            Err(_) => invalid_value("FLIGHTWX_DELAY_THRESHOLD", &raw),
        }
    }

    if let Some(raw) = non_empty_var("FLIGHTWX_MATCH_POLICY") {
        match parse_match_policy(&raw) {
            Some(policy) => config.match_policy = policy,
            None => invalid_value("FLIGHTWX_MATCH_POLICY", &raw),
        }
    }

    config
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn invalid_value(key: &str, raw: &str) {
    warn!(
        component = "config",
        event = "config.invalid_value",
        key,
        value = raw,
        action = "default_kept"
    );
}

fn parse_airport_codes(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|code| code.trim().to_ascii_uppercase())
        .filter(|code| !code.is_empty())
        .collect()
}

fn parse_match_policy(raw: &str) -> Option<MatchPolicy> {
    match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
        "fan_out" | "fanout" => Some(MatchPolicy::FanOut),
        "strict" => Some(MatchPolicy::Strict),
        _ => None,
    }
}
