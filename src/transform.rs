//! Type coercion of raw row batches.
//!
//! A [`Transformer`] is created per file with the first row index to assign.
//! Every batch it transforms carries the index to hand to the next batch, so
//! indices stay contiguous across chunks and, when the caller threads
//! [`TransformedBatch::next_index`] into the next file's transformer, across
//! files too.
//!
//! Missing or unparseable numeric and boolean cells never fail a row. Airport
//! and flight files substitute zero; weather files forward-fill within the
//! file. Every substitution is counted per column in [`CoercionStats`].

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::{ToSqlOutput, Value};
use rusqlite::ToSql;
use serde::{Deserialize, Serialize};

use crate::geo::quantize_degrees;
use crate::loader::LoadError;
use crate::reader::RowBatch;
use crate::schema::{descriptors, Dataset, FeatureDescriptor, MissingPolicy, SemanticType};
use crate::temporal::{
    combine, format_date, format_timestamp, parse_date, parse_time_of_day, parse_timestamp,
    round_to_hour,
};

const TRACE_PRECIPITATION: f64 = 0.001;
const PRECIPITATION_FILL_LIMIT: u32 = 2;
const PRECIPITATION_COLUMN: &str = "hourly_precipitation";
const WIND_GUST_COLUMN: &str = "hourly_wind_gust_speed";

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

impl CellValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Self::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(date) => Some(*date),
            _ => None,
        }
    }
}

impl ToSql for CellValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let value = match self {
            Self::Null => Value::Null,
            Self::Integer(v) => Value::Integer(*v),
            Self::Float(v) => Value::Real(*v),
            Self::Boolean(v) => Value::Integer(i64::from(*v)),
            Self::Text(v) => return Ok(ToSqlOutput::from(v.as_str())),
            Self::Date(date) => Value::Text(format_date(*date)),
            Self::Timestamp(ts) => Value::Text(format_timestamp(*ts)),
        };
        Ok(ToSqlOutput::Owned(value))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransformedRecord {
    pub row_index: i64,
    pub values: Vec<CellValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransformedBatch {
    pub dataset: Dataset,
    pub records: Vec<TransformedRecord>,
    pub next_index: i64,
}

impl TransformedBatch {
    pub fn first_index(&self) -> Option<i64> {
        self.records.first().map(|r| r.row_index)
    }

    pub fn last_index(&self) -> Option<i64> {
        self.records.last().map(|r| r.row_index)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoercionStats {
    pub defaults_by_column: BTreeMap<String, u64>,
}

impl CoercionStats {
    pub fn record(&mut self, column: &str) {
        *self
            .defaults_by_column
            .entry(column.to_string())
            .or_insert(0) += 1;
    }

    pub fn total(&self) -> u64 {
        self.defaults_by_column.values().sum()
    }

    pub fn merge(&mut self, other: &CoercionStats) {
        for (column, count) in &other.defaults_by_column {
            *self.defaults_by_column.entry(column.clone()).or_insert(0) += count;
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum DerivedPlan {
    Location { lat: usize, lon: usize },
    FlightHours { departure: usize, arrival: usize },
    Observation { lat: usize, lon: usize, date: usize },
}

#[derive(Debug, Clone, Default)]
struct ForwardFillState {
    last: Vec<Option<CellValue>>,
    precipitation_gap: u32,
}

pub struct Transformer {
    dataset: Dataset,
    descriptors: &'static [FeatureDescriptor],
    anchor_date: Option<usize>,
    derived: DerivedPlan,
    fill: ForwardFillState,
    next_index: i64,
    stats: CoercionStats,
}

impl Transformer {
    pub fn new(dataset: Dataset, start_index: i64) -> Self {
        let descriptors = descriptors(dataset);
        let position = |name: &str| {
            descriptors
                .iter()
                .position(|d| d.storage_name == name)
                .unwrap_or(usize::MAX)
        };
        let derived = match dataset {
            Dataset::Airports => DerivedPlan::Location {
                lat: position("latitude"),
                lon: position("longitude"),
            },
            Dataset::Flights => DerivedPlan::FlightHours {
                departure: position("departure_time_scheduled"),
                arrival: position("arrival_time_scheduled"),
            },
            Dataset::Weather => DerivedPlan::Observation {
                lat: position("latitude"),
                lon: position("longitude"),
                date: position("date"),
            },
        };

        Self {
            dataset,
            descriptors,
            anchor_date: descriptors
                .iter()
                .position(|d| d.semantic_type == SemanticType::Date),
            derived,
            fill: ForwardFillState {
                last: vec![None; descriptors.len()],
                precipitation_gap: 0,
            },
            next_index: start_index,
            stats: CoercionStats::default(),
        }
    }

    pub fn next_index(&self) -> i64 {
        self.next_index
    }

    pub fn stats(&self) -> &CoercionStats {
        &self.stats
    }

    pub fn transform(&mut self, batch: &RowBatch) -> Result<TransformedBatch, LoadError> {
        let mut records = Vec::with_capacity(batch.len());
        for row in &batch.rows {
            let row_index = self.next_index;
            let values = self.transform_row(row, row_index)?;
            records.push(TransformedRecord { row_index, values });
            self.next_index += 1;
        }

        Ok(TransformedBatch {
            dataset: self.dataset,
            records,
            next_index: self.next_index,
        })
    }

    fn transform_row(&mut self, row: &[String], row_index: i64) -> Result<Vec<CellValue>, LoadError> {
        let policy = self.dataset.missing_policy();
        let descriptors = self.descriptors;
        if row.len() != descriptors.len() {
            return Err(LoadError::InvalidConfig(format!(
                "row {row_index} has {} cells, {} expects {}",
                row.len(),
                self.dataset.table_name(),
                descriptors.len()
            )));
        }
        let mut cells: Vec<Option<CellValue>> = Vec::with_capacity(descriptors.len());

        for (descriptor, raw) in descriptors.iter().zip(row) {
            cells.push(self.coerce_cell(descriptor, raw, row_index, policy)?);
        }

        // Clock readings only become timestamps once the row's date is known.
        let anchor = self
            .anchor_date
            .and_then(|idx| cells[idx].as_ref())
            .and_then(CellValue::as_date);
        for (idx, descriptor) in descriptors.iter().enumerate() {
            if descriptor.semantic_type != SemanticType::TimeOfDay {
                continue;
            }
            let parsed = parse_time_of_day(&row[idx]);
            if parsed.defaulted {
                self.stats.record(descriptor.storage_name);
            }
            cells[idx] = Some(match anchor {
                Some(date) => CellValue::Timestamp(combine(date, parsed.offset)),
                None => CellValue::Null,
            });
        }

        let mut values = match policy {
            MissingPolicy::ZeroDefault => cells
                .into_iter()
                .map(|cell| cell.unwrap_or(CellValue::Null))
                .collect(),
            MissingPolicy::ForwardFill => self.forward_fill(cells),
        };
        self.append_derived(&mut values);
        Ok(values)
    }

    fn coerce_cell(
        &mut self,
        descriptor: &FeatureDescriptor,
        raw: &str,
        row_index: i64,
        policy: MissingPolicy,
    ) -> Result<Option<CellValue>, LoadError> {
        let parsed = match descriptor.semantic_type {
            SemanticType::Integer => parse_integer(raw).map(CellValue::Integer),
            SemanticType::Float => {
                if self.dataset == Dataset::Weather
                    && descriptor.storage_name == PRECIPITATION_COLUMN
                    && raw.trim() == "T"
                {
                    Some(CellValue::Float(TRACE_PRECIPITATION))
                } else {
                    parse_float(raw).map(CellValue::Float)
                }
            }
            SemanticType::Boolean => parse_boolean(raw).map(CellValue::Boolean),
            SemanticType::String => {
                if policy == MissingPolicy::ForwardFill && raw.trim().is_empty() {
                    None
                } else {
                    Some(CellValue::Text(raw.to_string()))
                }
            }
            SemanticType::Date => {
                if raw.trim().is_empty() {
                    return Ok(Some(CellValue::Null));
                }
                let date = parse_date(raw).ok_or_else(|| temporal_error(descriptor, row_index, raw))?;
                return Ok(Some(CellValue::Date(date)));
            }
            SemanticType::Timestamp => {
                if raw.trim().is_empty() {
                    return Ok(Some(CellValue::Null));
                }
                let ts =
                    parse_timestamp(raw).ok_or_else(|| temporal_error(descriptor, row_index, raw))?;
                return Ok(Some(CellValue::Timestamp(ts)));
            }
            // Resolved in a second pass against the row's date.
            SemanticType::TimeOfDay => return Ok(Some(CellValue::Null)),
        };

        if parsed.is_some() || policy == MissingPolicy::ForwardFill {
            return Ok(parsed);
        }

        self.stats.record(descriptor.storage_name);
        Ok(Some(zero_value(descriptor.semantic_type)))
    }

    fn forward_fill(&mut self, cells: Vec<Option<CellValue>>) -> Vec<CellValue> {
        let mut out = Vec::with_capacity(cells.len());
        for (idx, cell) in cells.into_iter().enumerate() {
            let name = self.descriptors[idx].storage_name;
            let is_precipitation = name == PRECIPITATION_COLUMN;

            let value = match cell {
                Some(value) => {
                    self.fill.last[idx] = Some(value.clone());
                    if is_precipitation {
                        self.fill.precipitation_gap = 0;
                    }
                    value
                }
                None if name == WIND_GUST_COLUMN => {
                    self.stats.record(name);
                    CellValue::Integer(0)
                }
                None if is_precipitation => {
                    self.fill.precipitation_gap += 1;
                    self.stats.record(name);
                    match &self.fill.last[idx] {
                        Some(last) if self.fill.precipitation_gap <= PRECIPITATION_FILL_LIMIT => {
                            last.clone()
                        }
                        _ => CellValue::Float(0.0),
                    }
                }
                None => match &self.fill.last[idx] {
                    Some(last) => {
                        self.stats.record(name);
                        last.clone()
                    }
                    None => CellValue::Null,
                },
            };
            out.push(value);
        }
        out
    }

    fn append_derived(&self, values: &mut Vec<CellValue>) {
        match self.derived {
            DerivedPlan::Location { lat, lon } => {
                let lat = bucket_at(values, lat);
                let lon = bucket_at(values, lon);
                values.extend([lat, lon]);
            }
            DerivedPlan::FlightHours { departure, arrival } => {
                let departure = hour_at(values, departure);
                let arrival = hour_at(values, arrival);
                values.extend([departure, arrival]);
            }
            DerivedPlan::Observation { lat, lon, date } => {
                let lat = bucket_at(values, lat);
                let lon = bucket_at(values, lon);
                let measurement_hour = hour_at(values, date);
                values.extend([lat, lon, measurement_hour]);
            }
        }
    }
}

fn bucket_at(values: &[CellValue], idx: usize) -> CellValue {
    match values.get(idx).and_then(CellValue::as_f64) {
        Some(degrees) => CellValue::Integer(quantize_degrees(degrees)),
        None => CellValue::Null,
    }
}

fn hour_at(values: &[CellValue], idx: usize) -> CellValue {
    match values.get(idx).and_then(CellValue::as_timestamp) {
        Some(ts) => CellValue::Timestamp(round_to_hour(ts)),
        None => CellValue::Null,
    }
}

fn temporal_error(descriptor: &FeatureDescriptor, row_index: i64, raw: &str) -> LoadError {
    LoadError::TemporalParse {
        column: descriptor.storage_name.to_string(),
        row_index,
        value: raw.to_string(),
    }
}

fn zero_value(semantic_type: SemanticType) -> CellValue {
    match semantic_type {
        SemanticType::Integer => CellValue::Integer(0),
        SemanticType::Float => CellValue::Float(0.0),
        SemanticType::Boolean => CellValue::Boolean(false),
        _ => CellValue::Null,
    }
}

pub fn parse_integer(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if let Ok(value) = trimmed.parse::<i64>() {
        return Some(value);
    }
    parse_float(trimmed).map(|v| v.trunc() as i64)
}

pub fn parse_float(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn parse_boolean(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" => None,
        "true" | "t" | "yes" | "y" => Some(true),
        "false" | "f" | "no" | "n" => Some(false),
        other => parse_float(other).map(|v| v != 0.0),
    }
}
