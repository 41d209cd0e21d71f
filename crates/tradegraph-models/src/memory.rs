use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decision::{Action, Decision};

/// Identity of a remembered event. At most one record exists per key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemoryKey {
    pub ticker: String,
    pub date: NaiveDate,
    pub action: Action,
}

impl MemoryKey {
    pub fn for_decision(decision: &Decision) -> Self {
        Self {
            ticker: decision.ticker.clone(),
            date: decision.date,
            action: decision.action,
        }
    }
}

/// A past decision scored against what the market actually did.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryRecord {
    pub id: Uuid,
    pub key: MemoryKey,
    /// Text the similarity index is built from.
    pub situation: String,
    pub decision: Decision,
    /// Fractional return, e.g. -0.05 for -5%.
    pub realized_return: Decimal,
    /// In [-1, 1]; sign is correctness, magnitude is conviction quality.
    pub reward: f64,
    pub lesson: String,
    pub recorded_at: DateTime<Utc>,
}

/// Lightweight view of a memory match handed to debating roles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Precedent {
    pub record_id: Uuid,
    pub ticker: String,
    pub date: NaiveDate,
    pub action: Action,
    pub realized_return: Decimal,
    pub reward: f64,
    pub lesson: String,
    pub similarity: f64,
}

impl Precedent {
    pub fn from_record(record: &MemoryRecord, similarity: f64) -> Self {
        Self {
            record_id: record.id,
            ticker: record.key.ticker.clone(),
            date: record.key.date,
            action: record.key.action,
            realized_return: record.realized_return,
            reward: record.reward,
            lesson: record.lesson.clone(),
            similarity,
        }
    }
}

/// Reflection input: a prior decision and the return it went on to realize.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RealizedOutcome {
    pub decision: Decision,
    pub realized_return: Decimal,
}
