use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::debate::DebateState;
use crate::opinion::{AgentOpinion, Stance};
use crate::snapshot::MarketSnapshot;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Buy => "BUY",
            Action::Sell => "SELL",
            Action::Hold => "HOLD",
        }
    }

    pub fn from_stance(stance: Stance) -> Self {
        match stance {
            Stance::Bullish => Action::Buy,
            Stance::Bearish => Action::Sell,
            Stance::Neutral => Action::Hold,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(Action::Buy),
            "SELL" => Ok(Action::Sell),
            "HOLD" => Ok(Action::Hold),
            other => Err(format!("not an action: {other}")),
        }
    }
}

/// The final, immutable outcome of one `propagate` call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    pub id: Uuid,
    pub ticker: String,
    pub date: NaiveDate,
    pub action: Action,
    pub rationale: String,
    /// Summary of the market situation the decision was taken in.
    #[serde(default)]
    pub situation: String,
    /// The concluded debate this decision was derived from.
    pub debate: DebateState,
    pub decided_at: DateTime<Utc>,
}

/// Full record of one run, for debugging and replay.
///
/// A failed run carries the same type with the steps it reached; only the
/// fields of completed steps are populated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditTrail {
    pub run_id: Uuid,
    pub ticker: String,
    pub date: NaiveDate,
    pub snapshot: Option<MarketSnapshot>,
    pub analyst_reports: Vec<AgentOpinion>,
    pub debate: Option<DebateState>,
    pub trader: Option<AgentOpinion>,
    pub fund_manager: Option<AgentOpinion>,
    pub decision: Option<Decision>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl AuditTrail {
    pub fn new(ticker: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            ticker: ticker.into(),
            date,
            snapshot: None,
            analyst_reports: Vec::new(),
            debate: None,
            trader: None,
            fund_manager: None,
            decision: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Every opinion recorded in the run, in the order produced.
    pub fn opinions(&self) -> Vec<&AgentOpinion> {
        let mut out: Vec<&AgentOpinion> = self.analyst_reports.iter().collect();
        if let Some(debate) = &self.debate {
            out.extend(debate.transcript());
        }
        out.extend(self.trader.iter());
        out.extend(self.fund_manager.iter());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Action::Buy).unwrap(), "\"BUY\"");
        let parsed: Action = serde_json::from_str("\"HOLD\"").unwrap();
        assert_eq!(parsed, Action::Hold);
    }

    #[test]
    fn action_parses_case_insensitive() {
        assert_eq!("sell".parse::<Action>(), Ok(Action::Sell));
        assert_eq!(" Buy ".parse::<Action>(), Ok(Action::Buy));
        assert!("short".parse::<Action>().is_err());
    }

    #[test]
    fn empty_trail_has_no_opinions() {
        let trail = AuditTrail::new("NVDA", NaiveDate::from_ymd_opt(2024, 5, 10).unwrap());
        assert!(trail.opinions().is_empty());
        assert!(trail.finished_at.is_none());
    }
}
