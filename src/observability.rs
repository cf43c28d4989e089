//! Logging setup for the flightwx jobs.
//!
//! `FLIGHTWX_LOG_MODULES` takes `module=level` pairs (for example
//! `loader=debug,features=warn`) layered over the base level, so per-chunk
//! loader events can be enabled without flooding the other stages.

use std::env;

use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::PipelineConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub include_target: bool,
    pub module_levels: Vec<(String, String)>,
}

pub const LOG_MODULES: [&str; 9] = [
    "config",
    "congestion",
    "features",
    "loader",
    "queries",
    "reader",
    "status",
    "store",
    "transform",
];

const LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            include_target: true,
            module_levels: Vec::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LoggingInitError {
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] tracing::subscriber::SetGlobalDefaultError),
}

pub fn logging_config_from_env() -> LoggingConfig {
    let mut config = LoggingConfig::default();

    if let Ok(level) = env::var("FLIGHTWX_LOG_LEVEL") {
        let trimmed = level.trim();
        if !trimmed.is_empty() {
            config.level = trimmed.to_string();
        }
    }

    if let Ok(format) = env::var("FLIGHTWX_LOG_FORMAT") {
        if let Some(parsed) = parse_log_format(&format) {
            config.format = parsed;
        }
    }

    if let Ok(include_target) = env::var("FLIGHTWX_LOG_TARGET") {
        if let Some(parsed) = parse_bool(&include_target) {
            config.include_target = parsed;
        }
    }

    if let Ok(modules) = env::var("FLIGHTWX_LOG_MODULES") {
        config.module_levels = parse_module_levels(&modules);
    }

    config
}

impl LoggingConfig {
    pub fn filter_directives(&self) -> String {
        let mut directives = vec![self.level.clone()];
        directives.extend(
            self.module_levels
                .iter()
                .map(|(module, level)| format!("flightwx::{module}={level}")),
        );
        directives.join(",")
    }
}

// stdout carries the job's JSON report.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingInitError> {
    let env_filter = EnvFilter::try_new(config.filter_directives())
        .or_else(|_| EnvFilter::try_new(config.level.clone()))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(config.include_target)
        .with_ansi(matches!(config.format, LogFormat::Pretty))
        .with_writer(std::io::stderr);

    match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.pretty().finish())?,
    }

    Ok(())
}

pub fn log_job_start(job: &str, config: &LoggingConfig) {
    info!(
        component = job,
        event = "job.start",
        log_level = %config.level,
        log_format = ?config.format,
        include_target = config.include_target,
        filter = %config.filter_directives()
    );
}

pub fn log_pipeline_config(job: &str, config: &PipelineConfig) {
    info!(
        component = job,
        event = "job.config",
        store_path = %config.store_path.display(),
        raw_root = %config.raw_root.display(),
        chunk_size = config.chunk_size,
        hour_lag = config.hour_lag,
        airport_codes = ?config.airport_codes,
        start_date = %config.start_date,
        end_date = %config.end_date,
        delay_threshold = config.delay_threshold,
        match_policy = ?config.match_policy
    );
}

pub fn log_job_finish(job: &str, failures: usize) {
    if failures == 0 {
        info!(component = job, event = "job.finish", status = "ok");
    } else {
        warn!(
            component = job,
            event = "job.finish",
            status = "partial",
            failures
        );
    }
}

fn parse_log_format(raw: &str) -> Option<LogFormat> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "json" => Some(LogFormat::Json),
        "pretty" => Some(LogFormat::Pretty),
        _ => None,
    }
}

// Unknown modules and levels are dropped with a warning; the rest still apply.
fn parse_module_levels(raw: &str) -> Vec<(String, String)> {
    let mut levels = Vec::new();
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let parsed = pair.split_once('=').and_then(|(module, level)| {
            let module = module.trim().to_ascii_lowercase();
            let level = level.trim().to_ascii_lowercase();
            (LOG_MODULES.contains(&module.as_str()) && LEVELS.contains(&level.as_str()))
                .then_some((module, level))
        });
        match parsed {
            Some(entry) => levels.push(entry),
            None => warn!(
                component = "observability",
                event = "config.invalid_value",
                key = "FLIGHTWX_LOG_MODULES",
                value = pair
            ),
        }
    }
    levels
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
