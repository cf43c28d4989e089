use chrono::NaiveDate;
use rusqlite::named_params;
use serde::Serialize;
use tracing::debug;

use crate::store::{Store, StoreError};
use crate::temporal::format_date;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AirportDelaySummary {
    pub airport_code: String,
    pub display_airport_name: Option<String>,
    pub departures: u64,
    pub delayed_departures: u64,
}

// One row per origin code. A code whose sequence id changed over time still
// aggregates into a single row.
pub fn flight_and_delay_summary_by_airport(
    store: &Store,
    start_date: NaiveDate,
    end_date: NaiveDate,
    delay_threshold: i64,
) -> Result<Vec<AirportDelaySummary>, StoreError> {
    let mut stmt = store.connection().prepare(
        "
        SELECT
            f.origin,
            MAX(a.display_airport_name),
            COUNT(*),
            SUM(CASE WHEN f.departure_delay > :delay_threshold THEN 1 ELSE 0 END)
        FROM flights f
        JOIN (
            SELECT airport_seq_id, MAX(display_airport_name) AS display_airport_name
            FROM airports
            GROUP BY airport_seq_id
        ) a ON a.airport_seq_id = f.origin_airport_sequence_id
        WHERE f.flight_date BETWEEN :start_date AND :end_date
        GROUP BY f.origin
        ORDER BY COUNT(*) DESC, f.origin ASC
        ",
    )?;

    let rows = stmt.query_map(
        named_params! {
            ":start_date": format_date(start_date),
            ":end_date": format_date(end_date),
            ":delay_threshold": delay_threshold,
        },
        |row| {
            Ok(AirportDelaySummary {
                airport_code: row.get(0)?,
                display_airport_name: row.get(1)?,
                departures: row.get::<_, i64>(2)? as u64,
                delayed_departures: row.get::<_, i64>(3)? as u64,
            })
        },
    )?;

    let summaries = rows.collect::<Result<Vec<_>, _>>()?;
    debug!(
        component = "queries",
        event = "queries.delay_summary",
        start_date = %start_date,
        end_date = %end_date,
        delay_threshold,
        airports = summaries.len()
    );
    Ok(summaries)
}
