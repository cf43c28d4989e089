//! Hourly congestion tables per airport.
//!
//! `departure_features` groups flights by origin airport and scheduled
//! departure hour, `arrival_features` by destination airport and scheduled
//! arrival hour. Both are dropped and rebuilt from `flights` on every run.

use serde::Serialize;
use tracing::{error, info};

use crate::store::{Store, StoreError};

pub const CONGESTION_COLUMNS: &[(&str, &str)] = &[
    ("airport_id", "INTEGER"),
    ("scheduled_hour", "TIMESTAMP"),
    ("scheduled_count", "INTEGER"),
    ("fraction_cancelled", "DOUBLE"),
    ("fraction_delayed", "DOUBLE"),
    ("average_delay", "INTEGER"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    Departure,
    Arrival,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Arrival, Direction::Departure];

    pub fn table_name(self) -> &'static str {
        match self {
            Self::Departure => "departure_features",
            Self::Arrival => "arrival_features",
        }
    }

    fn source_columns(self) -> SourceColumns {
        match self {
            Self::Departure => SourceColumns {
                airport_id: "origin_airport_id",
                hour: "departure_hour_scheduled",
                delayed_15: "departure_was_delayed_15",
                delay: "departure_delay",
            },
            Self::Arrival => SourceColumns {
                airport_id: "dest_airport_id",
                hour: "arrival_hour_scheduled",
                delayed_15: "arrival_was_delayed_15",
                delay: "arrival_delay",
            },
        }
    }
}

struct SourceColumns {
    airport_id: &'static str,
    hour: &'static str,
    delayed_15: &'static str,
    delay: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CongestionTableReport {
    pub table: String,
    pub rows_written: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CongestionReport {
    pub tables: Vec<CongestionTableReport>,
}

impl CongestionReport {
    pub fn failed_tables(&self) -> usize {
        self.tables.iter().filter(|t| t.error.is_some()).count()
    }
}

pub fn rebuild_congestion_tables(store: &Store) -> CongestionReport {
    let mut tables = Vec::with_capacity(Direction::ALL.len());
    for direction in Direction::ALL {
        let table = direction.table_name();
        let outcome = rebuild_table(store, direction);
        match &outcome {
            Ok(rows_written) => info!(
                component = "congestion",
                event = "congestion.table.rebuilt",
                table,
                rows_written
            ),
            Err(err) => error!(
                component = "congestion",
                event = "congestion.table.failed",
                table,
                error = %err
            ),
        }
        tables.push(CongestionTableReport {
            table: table.to_string(),
            rows_written: *outcome.as_ref().unwrap_or(&0),
            error: outcome.err().map(|err| err.to_string()),
        });
    }
    CongestionReport { tables }
}

fn rebuild_table(store: &Store, direction: Direction) -> Result<u64, StoreError> {
    let table = direction.table_name();
    store.drop_table(table)?;
    store.create_table(table, CONGESTION_COLUMNS)?;
    let inserted = store.execute(&aggregate_sql(direction))?;
    Ok(inserted as u64)
}

fn aggregate_sql(direction: Direction) -> String {
    let table = direction.table_name();
    let SourceColumns {
        airport_id,
        hour,
        delayed_15,
        delay,
    } = direction.source_columns();

    // Ratios are forced to REAL; integer division would truncate them to 0.
    format!(
        "INSERT INTO {table} (
            airport_id, scheduled_hour, scheduled_count,
            fraction_cancelled, fraction_delayed, average_delay
        )
        SELECT
            CAST({airport_id} AS INTEGER),
            {hour},
            SUM(flights),
            CASE WHEN SUM(flights) = 0 THEN 0.0
                 ELSE SUM(cancelled) * 1.0 / SUM(flights) END,
            CASE WHEN SUM(flights) = 0 THEN 0.0
                 ELSE SUM({delayed_15}) * 1.0 / SUM(flights) END,
            CASE WHEN SUM({delayed_15}) > 0
                 THEN SUM({delay}) / SUM({delayed_15})
                 ELSE 0 END
        FROM flights
        GROUP BY {airport_id}, {hour}
        ORDER BY {airport_id}, {hour}"
    )
}
