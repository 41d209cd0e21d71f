use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension};
use tradegraph_models::{DataCategory, VendorId};

use crate::error::VendorError;
use crate::vendor::DataVendor;

/// Table the local vendor reads. Rows are written by offline data pipelines.
///
/// ```sql
/// CREATE TABLE IF NOT EXISTS vendor_data (
///     ticker        TEXT NOT NULL,
///     category      TEXT NOT NULL,
///     as_of         TEXT NOT NULL,   -- YYYY-MM-DD
///     payload_json  TEXT NOT NULL,
///     source        TEXT NOT NULL,
///     fetched_at    TEXT NOT NULL,
///     PRIMARY KEY (ticker, category, as_of)
/// );
/// ```
pub const VENDOR_TABLE_DDL: &str = "\
CREATE TABLE IF NOT EXISTS vendor_data (
    ticker        TEXT NOT NULL,
    category      TEXT NOT NULL,
    as_of         TEXT NOT NULL,
    payload_json  TEXT NOT NULL,
    source        TEXT NOT NULL,
    fetched_at    TEXT NOT NULL,
    PRIMARY KEY (ticker, category, as_of)
);
CREATE INDEX IF NOT EXISTS idx_vendor_data_lookup ON vendor_data(ticker, category);
";

/// Offline vendor over a SQLite file of pre-fetched payloads.
///
/// Serves the newest row for `(ticker, category)` dated on or before the
/// requested date. `rusqlite::Connection` is not `Sync`, hence the `Mutex`.
pub struct LocalVendor {
    conn: Mutex<Connection>,
}

impl LocalVendor {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        conn.execute_batch(VENDOR_TABLE_DDL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(VENDOR_TABLE_DDL)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Store a payload. Replaces any row with the same `(ticker, category, as_of)`.
    pub fn insert(
        &self,
        ticker: &str,
        category: DataCategory,
        as_of: NaiveDate,
        payload: &serde_json::Value,
        source: &str,
    ) -> Result<(), VendorError> {
        let conn = self.lock(category)?;
        conn.execute(
            "INSERT OR REPLACE INTO vendor_data \
             (ticker, category, as_of, payload_json, source, fetched_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                ticker,
                category.as_str(),
                as_of.format("%Y-%m-%d").to_string(),
                payload.to_string(),
                source,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| VendorError::unavailable(VendorId::Local, category, e.to_string()))?;
        Ok(())
    }

    fn lock(
        &self,
        category: DataCategory,
    ) -> Result<std::sync::MutexGuard<'_, Connection>, VendorError> {
        self.conn.lock().map_err(|e| {
            VendorError::unavailable(
                VendorId::Local,
                category,
                format!("SQLite mutex poisoned: {e}"),
            )
        })
    }
}

#[async_trait]
impl DataVendor for LocalVendor {
    fn id(&self) -> VendorId {
        VendorId::Local
    }

    async fn fetch(
        &self,
        ticker: &str,
        date: NaiveDate,
        category: DataCategory,
    ) -> Result<serde_json::Value, VendorError> {
        let row: Option<String> = {
            let conn = self.lock(category)?;
            let mut stmt = conn
                .prepare_cached(
                    "SELECT payload_json FROM vendor_data \
                     WHERE ticker = ?1 AND category = ?2 AND as_of <= ?3 \
                     ORDER BY as_of DESC LIMIT 1",
                )
                .map_err(|e| VendorError::unavailable(VendorId::Local, category, e.to_string()))?;
            stmt.query_row(
                rusqlite::params![ticker, category.as_str(), date.format("%Y-%m-%d").to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| VendorError::unavailable(VendorId::Local, category, e.to_string()))?
        };

        let json = row.ok_or_else(|| {
            VendorError::rejected(
                VendorId::Local,
                category,
                format!("no local data for {ticker} on or before {date}"),
            )
        })?;
        serde_json::from_str(&json).map_err(|e| {
            VendorError::rejected(
                VendorId::Local,
                category,
                format!("stored payload is not valid JSON: {e}"),
            )
        })
    }
}
