//! SQLite-backed relational store.
//!
//! The store is always opened from an explicit path. Base tables are created
//! from the schema registry and only ever appended to; derived tables are
//! dropped and recreated by the jobs that own them.

use std::path::{Path, PathBuf};

use rusqlite::{params, params_from_iter, Connection, OptionalExtension, ToSql};
use thiserror::Error;
use tracing::{debug, info};

use crate::schema::{derived_columns, descriptors, Dataset};
use crate::transform::{CellValue, TransformedBatch};

pub const ROW_INDEX_COLUMN: &str = "row_index";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unreachable at {}: {source}", .path.display())]
    Connectivity {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
    #[error("cannot prepare store directory {}: {source}", .path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub struct Store {
    conn: Connection,
    path: PathBuf,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Directory {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let connectivity = |source| StoreError::Connectivity {
            path: path.to_path_buf(),
            source,
        };
        let conn = Connection::open(path).map_err(connectivity)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA temp_store=MEMORY;
            ",
        )
        .map_err(connectivity)?;

        debug!(
            component = "store",
            event = "store.open",
            path = %path.display()
        );

        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn ensure_dataset_table(&self, dataset: Dataset) -> Result<(), StoreError> {
        let mut columns: Vec<(&str, &str)> = vec![(ROW_INDEX_COLUMN, "INTEGER NOT NULL")];
        columns.extend(
            descriptors(dataset)
                .iter()
                .map(|d| (d.storage_name, d.semantic_type.sql_type())),
        );
        columns.extend(
            derived_columns(dataset)
                .iter()
                .map(|d| (d.storage_name, d.sql_type)),
        );

        self.conn
            .execute_batch(&create_table_sql(dataset.table_name(), &columns, true))?;
        self.conn.execute_batch(lookup_index_sql(dataset))?;
        Ok(())
    }

    pub fn create_table(&self, table: &str, columns: &[(&str, &str)]) -> Result<(), StoreError> {
        self.conn
            .execute_batch(&create_table_sql(table, columns, false))?;
        Ok(())
    }

    // No de-duplication: replaying a batch appends it again.
    pub fn append(&mut self, batch: &TransformedBatch) -> Result<usize, StoreError> {
        if batch.records.is_empty() {
            return Ok(0);
        }

        let mut columns = vec![ROW_INDEX_COLUMN];
        columns.extend(descriptors(batch.dataset).iter().map(|d| d.storage_name));
        columns.extend(derived_columns(batch.dataset).iter().map(|d| d.storage_name));
        let sql = insert_sql(batch.dataset.table_name(), &columns);

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(&sql)?;
            for record in &batch.records {
                let row = std::iter::once(&record.row_index as &dyn ToSql)
                    .chain(record.values.iter().map(|v| v as &dyn ToSql));
                stmt.execute(params_from_iter(row))?;
            }
        }
        tx.commit()?;

        Ok(batch.records.len())
    }

    pub fn insert_rows(
        &mut self,
        table: &str,
        columns: &[&str],
        rows: &[Vec<CellValue>],
    ) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let sql = insert_sql(table, columns);
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(&sql)?;
            for row in rows {
                stmt.execute(params_from_iter(row.iter()))?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    pub fn next_row_index(&self, dataset: Dataset) -> Result<i64, StoreError> {
        let table = dataset.table_name();
        if !self.table_exists(table)? {
            return Ok(1);
        }
        let max: i64 = self.conn.query_row(
            &format!("SELECT COALESCE(MAX({ROW_INDEX_COLUMN}), 0) FROM \"{table}\""),
            [],
            |row| row.get(0),
        )?;
        Ok(max + 1)
    }

    pub fn count_rows(&self, table: &str) -> Result<u64, StoreError> {
        let count: i64 =
            self.conn
                .query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |row| {
                    row.get(0)
                })?;
        Ok(count as u64)
    }

    pub fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
        let exists = self
            .conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type='table' AND name=?1 LIMIT 1",
                params![table],
                |row| row.get::<_, i64>(0),
            )
            .optional()?
            .is_some();
        Ok(exists)
    }

    pub fn table_has_column(&self, table: &str, column: &str) -> Result<bool, StoreError> {
        let pragma = format!("PRAGMA table_info(\"{table}\")");
        let mut stmt = self.conn.prepare(&pragma)?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let name: String = row.get(1)?;
            if name.eq_ignore_ascii_case(column) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn add_column_if_missing(
        &self,
        table: &str,
        column: &str,
        sql_type: &str,
    ) -> Result<bool, StoreError> {
        if self.table_has_column(table, column)? {
            info!(
                component = "store",
                event = "store.migration.skipped",
                table,
                column,
                reason = "column_exists"
            );
            return Ok(false);
        }

        self.conn.execute_batch(&format!(
            "ALTER TABLE \"{table}\" ADD COLUMN \"{column}\" {sql_type};"
        ))?;
        info!(
            component = "store",
            event = "store.migration.applied",
            table,
            column
        );
        Ok(true)
    }

    pub fn drop_table(&self, table: &str) -> Result<(), StoreError> {
        self.conn
            .execute_batch(&format!("DROP TABLE IF EXISTS \"{table}\";"))?;
        Ok(())
    }

    pub fn execute(&self, sql: &str) -> Result<usize, StoreError> {
        Ok(self.conn.execute(sql, [])?)
    }
}

fn create_table_sql(table: &str, columns: &[(&str, &str)], if_not_exists: bool) -> String {
    let body = columns
        .iter()
        .map(|(name, sql_type)| format!("    \"{name}\" {sql_type}"))
        .collect::<Vec<_>>()
        .join(",\n");
    let guard = if if_not_exists { "IF NOT EXISTS " } else { "" };
    format!("CREATE TABLE {guard}\"{table}\" (\n{body}\n);")
}

fn insert_sql(table: &str, columns: &[&str]) -> String {
    let names = columns
        .iter()
        .map(|c| format!("\"{c}\""))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=columns.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("INSERT INTO \"{table}\" ({names}) VALUES ({placeholders})")
}

fn lookup_index_sql(dataset: Dataset) -> &'static str {
    match dataset {
        Dataset::Airports => {
            "CREATE INDEX IF NOT EXISTS airports_location_idx
                ON airports (int_latitude, int_longitude);"
        }
        Dataset::Flights => {
            "CREATE INDEX IF NOT EXISTS flights_origin_date_idx
                ON flights (origin, flight_date);"
        }
        Dataset::Weather => {
            "CREATE INDEX IF NOT EXISTS weather_location_date_idx
                ON weather (int_latitude, int_longitude, date);"
        }
    }
}
