use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info};
use tradegraph_models::{MemoryKey, MemoryRecord, Precedent};

use crate::error::MemoryError;
use crate::index::TermIndex;
use crate::journal::Journal;

#[derive(Default)]
struct Inner {
    records: Vec<MemoryRecord>,
    keys: HashSet<MemoryKey>,
    index: TermIndex,
}

impl Inner {
    fn insert(&mut self, record: MemoryRecord) {
        let id = self.index.add(&indexed_text(&record));
        debug_assert_eq!(id, self.records.len());
        self.keys.insert(record.key.clone());
        self.records.push(record);
    }
}

/// The ticker is always part of the indexed terms.
fn indexed_text(record: &MemoryRecord) -> String {
    format!("{} {}", record.key.ticker, record.situation)
}

/// Append-only store of reflected decisions with similarity retrieval.
///
/// Shared across runs behind an `Arc`; all mutation goes through an interior
/// `RwLock`. When opened on a path, every accepted record is also journaled to
/// SQLite and the journal is replayed into the index at open.
pub struct MemoryStore {
    inner: RwLock<Inner>,
    journal: Option<Mutex<Journal>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Volatile store, lost when dropped.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            journal: None,
        }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, MemoryError> {
        Self::with_journal(Journal::open(path)?)
    }

    pub fn with_journal(journal: Journal) -> Result<Self, MemoryError> {
        let mut inner = Inner::default();
        for record in journal.load_all()? {
            if !inner.keys.contains(&record.key) {
                inner.insert(record);
            }
        }
        info!(records = inner.records.len(), "Memory journal loaded");
        Ok(Self {
            inner: RwLock::new(inner),
            journal: Some(Mutex::new(journal)),
        })
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>, MemoryError> {
        self.inner
            .read()
            .map_err(|e| MemoryError::Unavailable(format!("memory lock poisoned: {e}")))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>, MemoryError> {
        self.inner
            .write()
            .map_err(|e| MemoryError::Unavailable(format!("memory lock poisoned: {e}")))
    }

    /// Append a record. Returns `false`, leaving the store unchanged, when a
    /// record with the same `(ticker, date, action)` already exists.
    pub fn append(&self, record: MemoryRecord) -> Result<bool, MemoryError> {
        let mut inner = self.write()?;
        if inner.keys.contains(&record.key) {
            debug!(ticker = %record.key.ticker, date = %record.key.date, action = %record.key.action, "Duplicate memory record ignored");
            return Ok(false);
        }

        if let Some(journal) = &self.journal {
            let journal = journal
                .lock()
                .map_err(|e| MemoryError::Unavailable(format!("journal mutex poisoned: {e}")))?;
            if !journal.append(&record)? {
                return Ok(false);
            }
        }

        debug!(ticker = %record.key.ticker, date = %record.key.date, reward = record.reward, "Memory record appended");
        inner.insert(record);
        Ok(true)
    }

    /// The `k` records most similar to `situation`, best first.
    pub fn query(&self, situation: &str, k: usize) -> Result<Vec<Precedent>, MemoryError> {
        let inner = self.read()?;
        Ok(inner
            .index
            .query(situation, k)
            .into_iter()
            .map(|(id, similarity)| Precedent::from_record(&inner.records[id], similarity))
            .collect())
    }

    pub fn contains(&self, key: &MemoryKey) -> Result<bool, MemoryError> {
        Ok(self.read()?.keys.contains(key))
    }

    pub fn len(&self) -> Result<usize, MemoryError> {
        Ok(self.read()?.records.len())
    }

    pub fn is_empty(&self) -> Result<bool, MemoryError> {
        Ok(self.read()?.records.is_empty())
    }

    /// Snapshot of every record, oldest first.
    pub fn records(&self) -> Result<Vec<MemoryRecord>, MemoryError> {
        Ok(self.read()?.records.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use tradegraph_models::{Action, DebateState, Decision};
    use uuid::Uuid;

    fn record(ticker: &str, day: u32, action: Action, situation: &str, ret: Decimal) -> MemoryRecord {
        let date = NaiveDate::from_ymd_opt(2024, 5, day).unwrap();
        let decision = Decision {
            id: Uuid::new_v4(),
            ticker: ticker.to_string(),
            date,
            action,
            rationale: "test".to_string(),
            situation: situation.to_string(),
            debate: DebateState::new(1),
            decided_at: Utc::now(),
        };
        MemoryRecord {
            id: Uuid::new_v4(),
            key: MemoryKey::for_decision(&decision),
            situation: situation.to_string(),
            decision,
            realized_return: ret,
            reward: -0.5,
            lesson: "lesson".to_string(),
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn duplicate_keys_are_ignored() {
        let store = MemoryStore::new();
        assert!(store
            .append(record("NVDA", 10, Action::Buy, "earnings beat", dec!(-0.05)))
            .unwrap());
        assert!(!store
            .append(record("NVDA", 10, Action::Buy, "different text", dec!(0.10)))
            .unwrap());
        assert!(store
            .append(record("NVDA", 10, Action::Sell, "earnings beat", dec!(0.10)))
            .unwrap());

        let records = store.records().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].realized_return, dec!(-0.05), "first write wins");
    }

    #[test]
    fn query_matches_on_ticker() {
        let store = MemoryStore::new();
        store
            .append(record("NVDA", 10, Action::Buy, "momentum strong", dec!(-0.05)))
            .unwrap();
        store
            .append(record("AAPL", 10, Action::Hold, "range bound", dec!(0.01)))
            .unwrap();

        let hits = store.query("NVDA", 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].ticker, "NVDA");
        assert_eq!(hits[0].realized_return, dec!(-0.05));
    }

    #[test]
    fn query_respects_k() {
        let store = MemoryStore::new();
        for day in 1..=5 {
            store
                .append(record("NVDA", day, Action::Buy, "momentum", dec!(0.01)))
                .unwrap();
        }
        assert_eq!(store.query("NVDA momentum", 2).unwrap().len(), 2);
    }

    #[test]
    fn journal_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.db");
        {
            let store = MemoryStore::open(&path).unwrap();
            store
                .append(record("NVDA", 10, Action::Buy, "momentum", dec!(-0.05)))
                .unwrap();
        }

        let store = MemoryStore::open(&path).unwrap();
        assert_eq!(store.len().unwrap(), 1);
        assert!(!store
            .append(record("NVDA", 10, Action::Buy, "again", dec!(0.02)))
            .unwrap());
        let hits = store.query("NVDA momentum", 1).unwrap();
        assert_eq!(hits[0].realized_return, dec!(-0.05));
    }

    #[test]
    fn in_memory_journal_dedupes() {
        let store = MemoryStore::with_journal(Journal::open_in_memory().unwrap()).unwrap();
        let first = record("TSLA", 3, Action::Sell, "deliveries miss", dec!(0.03));
        assert!(store.append(first.clone()).unwrap());
        assert!(!store.append(first).unwrap());
        assert_eq!(store.len().unwrap(), 1);
    }
}
