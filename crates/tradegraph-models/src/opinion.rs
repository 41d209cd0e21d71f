use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AnalystKind;
use crate::decision::Action;

/// Which model tier a role runs on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    QuickThink,
    DeepThink,
}

/// The closed set of reasoning roles.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    MarketAnalyst,
    FundamentalsAnalyst,
    NewsAnalyst,
    BullResearcher,
    BearResearcher,
    RiskManager,
    Trader,
    FundManager,
    Reflector,
}

impl AgentRole {
    pub const ALL: [AgentRole; 9] = [
        AgentRole::MarketAnalyst,
        AgentRole::FundamentalsAnalyst,
        AgentRole::NewsAnalyst,
        AgentRole::BullResearcher,
        AgentRole::BearResearcher,
        AgentRole::RiskManager,
        AgentRole::Trader,
        AgentRole::FundManager,
        AgentRole::Reflector,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::MarketAnalyst => "market_analyst",
            AgentRole::FundamentalsAnalyst => "fundamentals_analyst",
            AgentRole::NewsAnalyst => "news_analyst",
            AgentRole::BullResearcher => "bull_researcher",
            AgentRole::BearResearcher => "bear_researcher",
            AgentRole::RiskManager => "risk_manager",
            AgentRole::Trader => "trader",
            AgentRole::FundManager => "fund_manager",
            AgentRole::Reflector => "reflector",
        }
    }

    /// Tier policy: frequent roles think fast, final-say roles think deep.
    pub fn tier(&self) -> ModelTier {
        match self {
            AgentRole::Trader | AgentRole::FundManager | AgentRole::Reflector => {
                ModelTier::DeepThink
            }
            _ => ModelTier::QuickThink,
        }
    }

    /// Tier for one turn of this role. The neutral risk turn is the final
    /// risk judgement and runs deep.
    pub fn tier_for(&self, risk_stance: Option<RiskStance>) -> ModelTier {
        match (self, risk_stance) {
            (AgentRole::RiskManager, Some(RiskStance::Neutral)) => ModelTier::DeepThink,
            _ => self.tier(),
        }
    }

    pub fn analyst(kind: AnalystKind) -> AgentRole {
        match kind {
            AnalystKind::Market => AgentRole::MarketAnalyst,
            AnalystKind::Fundamentals => AgentRole::FundamentalsAnalyst,
            AnalystKind::News => AgentRole::NewsAnalyst,
        }
    }

    pub fn is_analyst(&self) -> bool {
        matches!(
            self,
            AgentRole::MarketAnalyst | AgentRole::FundamentalsAnalyst | AgentRole::NewsAnalyst
        )
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Risk appetite the risk manager argues from during the risk phase.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RiskStance {
    Aggressive,
    Conservative,
    Neutral,
}

impl RiskStance {
    /// Turn order in the risk phase. The last stance synthesizes.
    pub const ORDER: [RiskStance; 3] = [
        RiskStance::Aggressive,
        RiskStance::Conservative,
        RiskStance::Neutral,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskStance::Aggressive => "aggressive",
            RiskStance::Conservative => "conservative",
            RiskStance::Neutral => "neutral",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stance {
    Bullish,
    Bearish,
    Neutral,
}

impl Stance {
    pub fn sign(&self) -> i64 {
        match self {
            Stance::Bullish => 1,
            Stance::Bearish => -1,
            Stance::Neutral => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct StanceAssessment {
    pub stance: Stance,
    /// 0.0 to 1.0.
    pub confidence: Decimal,
}

/// One role invocation's output. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentOpinion {
    pub id: Uuid,
    pub role: AgentRole,
    /// Debate round for bull/bear turns.
    pub round: Option<u32>,
    /// Set for risk-phase turns.
    pub risk_stance: Option<RiskStance>,
    pub reasoning: String,
    pub stance: Option<StanceAssessment>,
    /// Explicit BUY/SELL/HOLD, used by trader and fund manager.
    pub action: Option<Action>,
    /// The speaker concedes the debate to the other side.
    #[serde(default)]
    pub concedes: bool,
    pub model: String,
    pub produced_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl AgentOpinion {
    /// Explicit action if given, else the one implied by the stance.
    pub fn implied_action(&self) -> Option<Action> {
        self.action
            .or_else(|| self.stance.map(|s| Action::from_stance(s.stance)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn opinion(stance: Option<Stance>, action: Option<Action>) -> AgentOpinion {
        AgentOpinion {
            id: Uuid::new_v4(),
            role: AgentRole::Trader,
            round: None,
            risk_stance: None,
            reasoning: "test".to_string(),
            stance: stance.map(|stance| StanceAssessment {
                stance,
                confidence: dec!(0.7),
            }),
            action,
            concedes: false,
            model: "gpt-4o-mini".to_string(),
            produced_at: Utc::now(),
            elapsed_ms: 10,
        }
    }

    #[test]
    fn tier_policy() {
        assert_eq!(AgentRole::MarketAnalyst.tier(), ModelTier::QuickThink);
        assert_eq!(AgentRole::BearResearcher.tier(), ModelTier::QuickThink);
        assert_eq!(AgentRole::RiskManager.tier(), ModelTier::QuickThink);
        assert_eq!(AgentRole::Trader.tier(), ModelTier::DeepThink);
        assert_eq!(AgentRole::FundManager.tier(), ModelTier::DeepThink);
    }

    #[test]
    fn neutral_risk_turn_thinks_deep() {
        let risk = AgentRole::RiskManager;
        assert_eq!(risk.tier_for(Some(RiskStance::Aggressive)), ModelTier::QuickThink);
        assert_eq!(risk.tier_for(Some(RiskStance::Conservative)), ModelTier::QuickThink);
        assert_eq!(risk.tier_for(Some(RiskStance::Neutral)), ModelTier::DeepThink);
        assert_eq!(AgentRole::BullResearcher.tier_for(None), ModelTier::QuickThink);
        assert_eq!(AgentRole::Trader.tier_for(None), ModelTier::DeepThink);
    }

    #[test]
    fn explicit_action_wins_over_stance() {
        let op = opinion(Some(Stance::Bullish), Some(Action::Hold));
        assert_eq!(op.implied_action(), Some(Action::Hold));
        let op = opinion(Some(Stance::Bearish), None);
        assert_eq!(op.implied_action(), Some(Action::Sell));
        let op = opinion(None, None);
        assert_eq!(op.implied_action(), None);
    }

    #[test]
    fn role_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&AgentRole::FundManager).unwrap(),
            "\"fund_manager\""
        );
    }
}
