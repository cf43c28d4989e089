//! Delay status classification for flights.

use serde::Serialize;
use tracing::info;

use crate::schema::Dataset;
use crate::store::{Store, StoreError};

pub const DEPARTURE_STATUS_COLUMN: &str = "departure_status";
pub const ARRIVAL_STATUS_COLUMN: &str = "arrival_status";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DelayStatus {
    Cancelled,
    Early,
    OnTime,
    Delayed15To30,
    Delayed31To60,
    Delayed61To120,
    Delayed120Plus,
}

impl DelayStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cancelled => "CANCELLED",
            Self::Early => "EARLY",
            Self::OnTime => "ON_TIME",
            Self::Delayed15To30 => "DELAYED_15_TO_30",
            Self::Delayed31To60 => "DELAYED_31_TO_60",
            Self::Delayed61To120 => "DELAYED_61_TO_120",
            Self::Delayed120Plus => "DELAYED_120_PLUS",
        }
    }

    // Exactly 120 minutes falls through to OnTime.
    pub fn classify(cancelled: bool, delay_minutes: i64) -> Self {
        if cancelled {
            Self::Cancelled
        } else if delay_minutes < -15 {
            Self::Early
        } else if delay_minutes < 15 {
            Self::OnTime
        } else if delay_minutes < 31 {
            Self::Delayed15To30
        } else if delay_minutes < 61 {
            Self::Delayed31To60
        } else if delay_minutes < 120 {
            Self::Delayed61To120
        } else if delay_minutes > 120 {
            Self::Delayed120Plus
        } else {
            Self::OnTime
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub columns_added: Vec<String>,
    pub rows_classified: u64,
}

pub fn apply_delay_status(store: &Store) -> Result<StatusReport, StoreError> {
    let table = Dataset::Flights.table_name();
    store.ensure_dataset_table(Dataset::Flights)?;

    let mut columns_added = Vec::new();
    for column in [DEPARTURE_STATUS_COLUMN, ARRIVAL_STATUS_COLUMN] {
        if store.add_column_if_missing(table, column, "TEXT")? {
            columns_added.push(column.to_string());
        }
    }

    let sql = format!(
        "UPDATE {table} SET {DEPARTURE_STATUS_COLUMN} = {}, {ARRIVAL_STATUS_COLUMN} = {}",
        status_case_sql("departure_delay"),
        status_case_sql("arrival_delay"),
    );
    let rows_classified = store.execute(&sql)? as u64;

    info!(
        component = "status",
        event = "status.applied",
        table,
        columns_added = columns_added.len(),
        rows_classified
    );

    Ok(StatusReport {
        columns_added,
        rows_classified,
    })
}

fn status_case_sql(delay_column: &str) -> String {
    format!(
        "CASE
            WHEN cancelled = 1 THEN '{cancelled}'
            WHEN {delay_column} < -15 THEN '{early}'
            WHEN {delay_column} < 15 THEN '{on_time}'
            WHEN {delay_column} < 31 THEN '{d15}'
            WHEN {delay_column} < 61 THEN '{d31}'
            WHEN {delay_column} < 120 THEN '{d61}'
            WHEN {delay_column} > 120 THEN '{d120}'
            ELSE '{on_time}'
        END",
        cancelled = DelayStatus::Cancelled.as_str(),
        early = DelayStatus::Early.as_str(),
        on_time = DelayStatus::OnTime.as_str(),
        d15 = DelayStatus::Delayed15To30.as_str(),
        d31 = DelayStatus::Delayed31To60.as_str(),
        d61 = DelayStatus::Delayed61To120.as_str(),
        d120 = DelayStatus::Delayed120Plus.as_str(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets_follow_thresholds() {
        let cases = [
            (-16, DelayStatus::Early),
            (-15, DelayStatus::OnTime),
            (14, DelayStatus::OnTime),
            (15, DelayStatus::Delayed15To30),
            (30, DelayStatus::Delayed15To30),
            (31, DelayStatus::Delayed31To60),
            (61, DelayStatus::Delayed61To120),
            (119, DelayStatus::Delayed61To120),
            (120, DelayStatus::OnTime),
            (121, DelayStatus::Delayed120Plus),
        ];
        for (delay, expected) in cases {
            assert_eq!(DelayStatus::classify(false, delay), expected, "delay {delay}");
        }
    }

    #[test]
    fn cancellation_wins_over_delay() {
        assert_eq!(DelayStatus::classify(true, 300), DelayStatus::Cancelled);
    }
}
