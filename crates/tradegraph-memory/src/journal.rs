use std::path::Path;

use rusqlite::Connection;
use tradegraph_models::MemoryRecord;

use crate::error::MemoryError;

/// The journal's schema. `(ticker, date, action)` is unique; repeats are ignored.
pub const MEMORY_TABLE_DDL: &str = "\
CREATE TABLE IF NOT EXISTS memory_records (
    id           TEXT PRIMARY KEY,
    ticker       TEXT NOT NULL,
    date         TEXT NOT NULL,
    action       TEXT NOT NULL,
    record_json  TEXT NOT NULL,
    recorded_at  TEXT NOT NULL,
    UNIQUE (ticker, date, action)
);
CREATE INDEX IF NOT EXISTS idx_memory_ticker ON memory_records(ticker);
";

/// Append-only SQLite persistence for memory records.
pub struct Journal {
    conn: Connection,
}

impl Journal {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MemoryError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(MEMORY_TABLE_DDL)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, MemoryError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(MEMORY_TABLE_DDL)?;
        Ok(Self { conn })
    }

    /// Returns `false` when a record with the same key was already journaled.
    pub fn append(&self, record: &MemoryRecord) -> Result<bool, MemoryError> {
        let json = serde_json::to_string(record)?;
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO memory_records \
             (id, ticker, date, action, record_json, recorded_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                record.id.to_string(),
                record.key.ticker,
                record.key.date.format("%Y-%m-%d").to_string(),
                record.key.action.as_str(),
                json,
                record.recorded_at.to_rfc3339(),
            ],
        )?;
        Ok(inserted == 1)
    }

    /// Every journaled record in the order it was recorded.
    pub fn load_all(&self) -> Result<Vec<MemoryRecord>, MemoryError> {
        let mut stmt = self
            .conn
            .prepare("SELECT record_json FROM memory_records ORDER BY recorded_at, rowid")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        rows.iter()
            .map(|json| serde_json::from_str(json).map_err(MemoryError::from))
            .collect()
    }
}
