//! Raw dataset ingestion.
//!
//! Files are loaded one at a time, chunk by chunk, each chunk committed in
//! its own transaction. Ingestion is additive: running it twice over the same
//! files appends the rows twice. Row indices continue from whatever the
//! table already holds, so they stay contiguous across chunks, files and runs.

use std::path::{Path, PathBuf};

use glob::glob;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::reader::ChunkedCsvReader;
use crate::schema::{schema_fingerprint, validate_descriptors, Dataset, SchemaError, SCHEMA_VERSION};
use crate::store::{Store, StoreError};
use crate::transform::{CoercionStats, Transformer};

pub const DEFAULT_CHUNK_SIZE: usize = 10_000;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("{}: missing required columns {missing:?}", .path.display())]
    SchemaMismatch { path: PathBuf, missing: Vec<String> },
    #[error("malformed temporal value '{value}' in column {column} at row {row_index}")]
    TemporalParse {
        column: String,
        row_index: i64,
        value: String,
    },
    #[error("invalid load configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid file pattern: {0}")]
    Pattern(#[from] glob::PatternError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadConfig {
    pub chunk_size: usize,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileLoadReport {
    pub path: PathBuf,
    pub rows_loaded: u64,
    pub chunks: u64,
    pub first_index: Option<i64>,
    pub last_index: Option<i64>,
    pub coercion: CoercionStats,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub dataset: Dataset,
    pub schema_version: u32,
    pub schema_fingerprint: String,
    pub files: Vec<FileLoadReport>,
    pub failures: Vec<FileFailure>,
    pub rows_loaded: u64,
    pub next_index: i64,
    pub coercion: CoercionStats,
}

pub fn file_pattern(dataset: Dataset) -> &'static str {
    match dataset {
        Dataset::Airports => "airports/*MASTER_CORD_All_All.csv",
        Dataset::Flights => "flights/On_Time_On_Time*.csv",
        Dataset::Weather => "weather/*.csv",
    }
}

pub fn discover_files(raw_root: &Path, dataset: Dataset) -> Result<Vec<PathBuf>, LoadError> {
    let pattern = raw_root.join(file_pattern(dataset));
    let pattern = pattern.to_str().ok_or_else(|| {
        LoadError::InvalidConfig(format!("non UTF-8 raw data root: {}", raw_root.display()))
    })?;

    let mut files = Vec::new();
    for entry in glob(pattern)? {
        let path = entry.map_err(glob::GlobError::into_error)?;
        if path.is_file() {
            files.push(path);
        }
    }

    files.sort();
    if dataset == Dataset::Flights {
        files.reverse();
    }

    info!(
        component = "loader",
        event = "load.discover",
        dataset = dataset.table_name(),
        pattern,
        file_count = files.len()
    );
    Ok(files)
}

// Chunks appended before a failure stay committed.
pub fn load_file(
    store: &mut Store,
    path: &Path,
    dataset: Dataset,
    cfg: &LoadConfig,
    start_index: i64,
) -> Result<FileLoadReport, LoadError> {
    info!(
        component = "loader",
        event = "load.file.start",
        dataset = dataset.table_name(),
        path = %path.display(),
        start_index
    );

    let mut reader = ChunkedCsvReader::open(path, dataset, cfg.chunk_size)?;
    let mut transformer = Transformer::new(dataset, start_index);
    let mut report = FileLoadReport {
        path: path.to_path_buf(),
        rows_loaded: 0,
        chunks: 0,
        first_index: None,
        last_index: None,
        coercion: CoercionStats::default(),
    };

    for batch in reader.by_ref() {
        let batch = batch?;
        let transformed = transformer.transform(&batch)?;
        let appended = store.append(&transformed)?;

        report.first_index = report.first_index.or(transformed.first_index());
        report.last_index = transformed.last_index().or(report.last_index);
        report.rows_loaded += appended as u64;
        report.chunks += 1;

        debug!(
            component = "loader",
            event = "load.chunk.appended",
            dataset = dataset.table_name(),
            chunk = report.chunks,
            rows = appended,
            next_index = transformed.next_index
        );
    }

    report.coercion = transformer.stats().clone();
    if report.coercion.total() > 0 {
        warn!(
            component = "loader",
            event = "load.file.defaults_substituted",
            dataset = dataset.table_name(),
            path = %path.display(),
            substituted = report.coercion.total(),
            by_column = ?report.coercion.defaults_by_column
        );
    }

    info!(
        component = "loader",
        event = "load.file.finish",
        dataset = dataset.table_name(),
        path = %path.display(),
        rows_read = reader.rows_read(),
        rows_loaded = report.rows_loaded,
        chunks = report.chunks,
        next_index = transformer.next_index()
    );

    Ok(report)
}

pub fn load_dataset(
    store: &mut Store,
    dataset: Dataset,
    files: &[PathBuf],
    cfg: &LoadConfig,
) -> Result<LoadReport, LoadError> {
    validate_descriptors(dataset)?;
    if cfg.chunk_size == 0 {
        return Err(LoadError::InvalidConfig(
            "chunk_size must be > 0".to_string(),
        ));
    }

    let fingerprint = schema_fingerprint(dataset);
    store.ensure_dataset_table(dataset)?;
    let mut next_index = store.next_row_index(dataset)?;

    info!(
        component = "loader",
        event = "load.dataset.start",
        dataset = dataset.table_name(),
        schema_version = SCHEMA_VERSION,
        schema_fingerprint = %fingerprint,
        file_count = files.len(),
        start_index = next_index,
        chunk_size = cfg.chunk_size
    );

    let mut report = LoadReport {
        dataset,
        schema_version: SCHEMA_VERSION,
        schema_fingerprint: fingerprint,
        files: Vec::new(),
        failures: Vec::new(),
        rows_loaded: 0,
        next_index,
        coercion: CoercionStats::default(),
    };

    for path in files {
        match load_file(store, path, dataset, cfg, next_index) {
            Ok(file_report) => {
                report.rows_loaded += file_report.rows_loaded;
                report.coercion.merge(&file_report.coercion);
                if let Some(last) = file_report.last_index {
                    next_index = last + 1;
                }
                report.files.push(file_report);
            }
            Err(err) => {
                error!(
                    component = "loader",
                    event = "load.file.failed",
                    dataset = dataset.table_name(),
                    path = %path.display(),
                    error = %err
                );
                report.failures.push(FileFailure {
                    path: path.clone(),
                    error: err.to_string(),
                });
                // Chunks committed before the failure still own their indices.
                next_index = store.next_row_index(dataset)?;
            }
        }
    }

    report.next_index = next_index;
    info!(
        component = "loader",
        event = "load.dataset.finish",
        dataset = dataset.table_name(),
        files_loaded = report.files.len(),
        files_failed = report.failures.len(),
        rows_loaded = report.rows_loaded,
        defaults_substituted = report.coercion.total(),
        next_index
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn discovery_applies_dataset_patterns_and_order() {
        let root = tempdir().unwrap();
        for rel in [
            "flights/On_Time_On_Time_Performance_2016_1.csv",
            "flights/On_Time_On_Time_Performance_2017_1.csv",
            "flights/readme.csv",
            "airports/123_MASTER_CORD_All_All.csv",
            "weather/b.csv",
            "weather/a.csv",
        ] {
            let path = root.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "x\n").unwrap();
        }

        let flights = discover_files(root.path(), Dataset::Flights).unwrap();
        assert_eq!(flights.len(), 2);
        assert!(flights[0].ends_with("On_Time_On_Time_Performance_2017_1.csv"));

        let weather = discover_files(root.path(), Dataset::Weather).unwrap();
        assert!(weather[0].ends_with("a.csv"));

        assert_eq!(discover_files(root.path(), Dataset::Airports).unwrap().len(), 1);
    }

    #[test]
    fn zero_chunk_size_is_rejected_before_touching_files() {
        let dir = tempdir().unwrap();
        let mut store = Store::open(&dir.path().join("airlines.db")).unwrap();
        let err = load_dataset(
            &mut store,
            Dataset::Weather,
            &[],
            &LoadConfig { chunk_size: 0 },
        )
        .unwrap_err();
        assert!(matches!(err, LoadError::InvalidConfig(_)));
    }
}
