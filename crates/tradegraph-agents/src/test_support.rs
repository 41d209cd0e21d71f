//! Scripted role agents and vendors for exercising the pipeline without a
//! model backend or network.
//!
//! `StubAgent` answers from a fixed script but still reads its context: the
//! risk manager picks its view by risk stance and a trader built with
//! [`StubAgent::follow_thesis`] proposes whatever the debate thesis implies.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tradegraph_models::{
    Action, AgentOpinion, AgentRole, AnalystKind, ConfigBuilder, Configuration, DataCategory,
    RetryPolicy, RiskStance, Stance, StanceAssessment, VendorId,
};
use tradegraph_vendors::{DataVendor, VendorError};
use uuid::Uuid;

use crate::error::AgentError;
use crate::role_agent::{RoleAgent, RoleContext};
use crate::roster::AgentRoster;

#[derive(Clone)]
pub struct StubAgent {
    role: AgentRole,
    stance: Option<StanceAssessment>,
    risk_views: HashMap<RiskStance, StanceAssessment>,
    action: Option<Action>,
    concede_from: Option<u32>,
    follow_thesis: bool,
    fail_first: usize,
    delay: Option<Duration>,
    reasoning: Option<String>,
    calls: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<RoleContext>>>,
}

impl StubAgent {
    pub fn new(role: AgentRole) -> Self {
        Self {
            role,
            stance: None,
            risk_views: HashMap::new(),
            action: None,
            concede_from: None,
            follow_thesis: false,
            fail_first: 0,
            delay: None,
            reasoning: None,
            calls: Arc::new(AtomicUsize::new(0)),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn stance(mut self, stance: Stance, confidence: Decimal) -> Self {
        self.stance = Some(StanceAssessment { stance, confidence });
        self
    }

    /// Stance given when invoked for one risk perspective.
    pub fn risk_view(mut self, risk: RiskStance, stance: Stance, confidence: Decimal) -> Self {
        self.risk_views
            .insert(risk, StanceAssessment { stance, confidence });
        self
    }

    pub fn action(mut self, action: Action) -> Self {
        self.action = Some(action);
        self
    }

    /// Concede starting at `round`.
    pub fn concedes_from(mut self, round: u32) -> Self {
        self.concede_from = Some(round);
        self
    }

    /// Propose the action implied by the thesis in the context.
    pub fn follow_thesis(mut self) -> Self {
        self.follow_thesis = true;
        self
    }

    pub fn failing_first(mut self, n: usize) -> Self {
        self.fail_first = n;
        self
    }

    pub fn always_failing(self) -> Self {
        self.failing_first(usize::MAX)
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn reasoning(mut self, text: impl Into<String>) -> Self {
        self.reasoning = Some(text.into());
        self
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    /// Every context this agent (and its clones) was invoked with.
    pub fn seen(&self) -> Arc<Mutex<Vec<RoleContext>>> {
        Arc::clone(&self.seen)
    }
}

#[async_trait]
impl RoleAgent for StubAgent {
    fn role(&self) -> AgentRole {
        self.role
    }

    async fn respond(&self, context: &RoleContext) -> Result<AgentOpinion, AgentError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(context.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if call < self.fail_first {
            return Err(AgentError::Backend(format!(
                "scripted failure {} for {}",
                call + 1,
                self.role
            )));
        }

        let stance = context
            .risk_stance
            .and_then(|r| self.risk_views.get(&r).copied())
            .or(self.stance);
        let action = if self.follow_thesis {
            context
                .thesis
                .as_ref()
                .map(|t| Action::from_stance(t.stance))
                .or(self.action)
        } else {
            self.action
        };
        let concedes = match (self.concede_from, context.round) {
            (Some(from), Some(round)) => round >= from,
            _ => false,
        };
        let reasoning = self.reasoning.clone().unwrap_or_else(|| {
            format!("{} view on {} for {}", self.role, context.ticker, context.date)
        });

        Ok(AgentOpinion {
            id: Uuid::new_v4(),
            role: self.role,
            round: context.round,
            risk_stance: context.risk_stance,
            reasoning,
            stance,
            action,
            concedes,
            model: "stub".to_string(),
            produced_at: Utc::now(),
            elapsed_ms: 0,
        })
    }
}

/// A full set of stub roles. Replace individual roles before building.
pub struct StubRoster {
    agents: HashMap<AgentRole, StubAgent>,
}

impl StubRoster {
    /// Bull outweighs bear, two of three risk views lean bullish, the trader
    /// follows the thesis and the fund manager ratifies.
    pub fn bullish() -> Self {
        let half = Decimal::new(5, 1);
        let mut roster = Self {
            agents: HashMap::new(),
        };
        for kind in AnalystKind::ALL {
            roster = roster.with(StubAgent::new(AgentRole::analyst(kind)));
        }
        roster
            .with(StubAgent::new(AgentRole::BullResearcher).stance(Stance::Bullish, Decimal::new(8, 1)))
            .with(StubAgent::new(AgentRole::BearResearcher).stance(Stance::Bearish, Decimal::new(4, 1)))
            .with(
                StubAgent::new(AgentRole::RiskManager)
                    .stance(Stance::Neutral, half)
                    .risk_view(RiskStance::Aggressive, Stance::Bullish, Decimal::new(7, 1))
                    .risk_view(RiskStance::Conservative, Stance::Bearish, half)
                    .risk_view(RiskStance::Neutral, Stance::Bullish, Decimal::new(6, 1)),
            )
            .with(StubAgent::new(AgentRole::Trader).follow_thesis())
            .with(StubAgent::new(AgentRole::FundManager))
            .with(StubAgent::new(AgentRole::Reflector).reasoning("Momentum calls need volume confirmation"))
    }

    /// Every analyst, researcher and risk stance leans bullish.
    pub fn all_bullish() -> Self {
        let strong = Decimal::new(8, 1);
        let mut roster = Self::bullish();
        for kind in AnalystKind::ALL {
            roster = roster.with(StubAgent::new(AgentRole::analyst(kind)).stance(Stance::Bullish, strong));
        }
        roster
            .with(StubAgent::new(AgentRole::BearResearcher).stance(Stance::Bullish, Decimal::new(3, 1)))
            .with(
                StubAgent::new(AgentRole::RiskManager)
                    .stance(Stance::Bullish, strong)
                    .risk_view(RiskStance::Aggressive, Stance::Bullish, Decimal::new(9, 1))
                    .risk_view(RiskStance::Conservative, Stance::Bullish, Decimal::new(4, 1))
                    .risk_view(RiskStance::Neutral, Stance::Bullish, Decimal::new(7, 1)),
            )
    }

    pub fn with(mut self, agent: StubAgent) -> Self {
        self.agents.insert(agent.role, agent);
        self
    }

    pub fn agent(&self, role: AgentRole) -> Option<&StubAgent> {
        self.agents.get(&role)
    }

    pub fn calls(&self, role: AgentRole) -> usize {
        self.agents
            .get(&role)
            .map(|a| a.calls.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.agents
            .values()
            .map(|a| a.calls.load(Ordering::SeqCst))
            .sum()
    }

    /// Build a roster sharing call counters with this one.
    pub fn build(&self, retry: RetryPolicy) -> AgentRoster {
        let agents = self
            .agents
            .values()
            .map(|a| Arc::new(a.clone()) as Arc<dyn RoleAgent>)
            .collect();
        AgentRoster::new(agents, retry)
    }
}

/// Vendor serving fixed raw payloads per category.
pub struct StubVendor {
    id: VendorId,
    payloads: HashMap<DataCategory, Value>,
    unknown_tickers: Vec<String>,
    calls: Arc<AtomicUsize>,
}

impl StubVendor {
    pub fn new(id: VendorId) -> Self {
        Self {
            id,
            payloads: HashMap::new(),
            unknown_tickers: Vec::new(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Local vendor with the [`nvda_payloads`] for every category.
    pub fn nvda() -> Self {
        let mut vendor = Self::new(VendorId::Local).unknown_ticker("ZZZZ");
        vendor.payloads = nvda_payloads();
        vendor
    }

    pub fn payload(mut self, category: DataCategory, raw: Value) -> Self {
        self.payloads.insert(category, raw);
        self
    }

    /// Reject every request for `ticker`.
    pub fn unknown_ticker(mut self, ticker: &str) -> Self {
        self.unknown_tickers.push(ticker.to_string());
        self
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl DataVendor for StubVendor {
    fn id(&self) -> VendorId {
        self.id
    }

    async fn fetch(
        &self,
        ticker: &str,
        _date: NaiveDate,
        category: DataCategory,
    ) -> Result<Value, VendorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unknown_tickers.iter().any(|t| t == ticker) {
            return Err(VendorError::rejected(
                self.id,
                category,
                format!("unknown ticker {ticker}"),
            ));
        }
        self.payloads
            .get(&category)
            .cloned()
            .ok_or_else(|| VendorError::rejected(self.id, category, "no data for category"))
    }
}

/// Raw vendor payloads for NVDA up to 2024-05-10, in mixed vendor shapes.
pub fn nvda_payloads() -> HashMap<DataCategory, Value> {
    HashMap::from([
        (
            DataCategory::CoreStockApis,
            json!([
                {"date": "2024-05-06", "open": 880.0, "high": 895.2, "low": 871.1, "close": 887.9, "volume": 41200000},
                {"date": "2024-05-07", "open": 888.1, "high": 910.0, "low": 884.3, "close": 905.5, "volume": 44800000},
                {"date": "2024-05-08", "open": 904.0, "high": 912.4, "low": 896.7, "close": 904.1, "volume": 38900000},
                {"date": "2024-05-09", "open": 905.0, "high": 925.6, "low": 901.2, "close": 921.4, "volume": 47300000},
                {"date": "2024-05-10", "open": 920.8, "high": 931.0, "low": 915.5, "close": 927.0, "volume": 45100000},
            ]),
        ),
        (
            DataCategory::TechnicalIndicators,
            json!({
                "RSI": {"2024-05-09": {"RSI": "64.2"}, "2024-05-10": {"RSI": "67.8"}},
                "MACD": [{"date": "2024-05-10", "value": 12.4}],
            }),
        ),
        (
            DataCategory::FundamentalData,
            json!({
                "Description": "Designs GPUs and accelerated computing platforms.",
                "PERatio": "72.4",
                "ProfitMargin": "0.488",
            }),
        ),
        (
            DataCategory::NewsData,
            json!({"feed": [
                {"title": "NVDA data center revenue expected to surge", "time_published": "20240509T130000", "overall_sentiment_score": 0.41},
                {"title": "Chipmakers rally on AI demand", "time_published": "20240510T090000", "overall_sentiment_score": 0.33},
            ]}),
        ),
    ])
}

/// Configuration with every category on the local vendor and no backoff.
pub fn stub_config() -> ConfigBuilder {
    DataCategory::ALL
        .into_iter()
        .fold(Configuration::builder(), |builder, category| {
            builder.data_vendor(category, VendorId::Local)
        })
        .retry_backoff_ms(0)
        .vendor_retries(1)
        .model_retries(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn risk_view_depends_on_perspective() {
        let agent = StubRoster::bullish();
        let risk = agent.agent(AgentRole::RiskManager).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        let mut context = RoleContext::new("NVDA", date, AgentRole::RiskManager);

        context.risk_stance = Some(RiskStance::Conservative);
        let opinion = risk.respond(&context).await.unwrap();
        assert_eq!(opinion.stance.unwrap().stance, Stance::Bearish);

        context.risk_stance = Some(RiskStance::Aggressive);
        let opinion = risk.respond(&context).await.unwrap();
        assert_eq!(opinion.stance.unwrap().confidence, dec!(0.7));
        assert_eq!(agent.calls(AgentRole::RiskManager), 2);
    }

    #[tokio::test]
    async fn nvda_vendor_rejects_unknown_ticker() {
        let vendor = StubVendor::nvda();
        let date = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        assert!(vendor
            .fetch("NVDA", date, DataCategory::NewsData)
            .await
            .is_ok());
        assert!(matches!(
            vendor.fetch("ZZZZ", date, DataCategory::NewsData).await,
            Err(VendorError::Rejected { .. })
        ));
    }
}
