use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;
use tradegraph_models::{
    Action, AgentOpinion, AgentRole, DebateState, MarketSnapshot, ModelTier, Precedent,
    ResearchThesis, RiskStance, StanceAssessment,
};
use uuid::Uuid;

use crate::error::AgentError;
use crate::model_cli::ModelBackend;
use crate::parser::parse_opinion_payload;
use crate::prompts::system_prompt;

/// Confidence assumed when a role states a stance without one.
const DEFAULT_CONFIDENCE: Decimal = Decimal::from_parts(5, 0, 0, false, 1);

/// A past decision and what it went on to return, shown to the reflector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutcomeView {
    pub action: Action,
    pub realized_return: Decimal,
    pub reward: f64,
    pub rationale: String,
}

/// Everything one role invocation may see. Serialized as the user prompt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoleContext {
    pub ticker: String,
    pub date: NaiveDate,
    pub role: AgentRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_stance: Option<RiskStance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<MarketSnapshot>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub analyst_reports: Vec<AgentOpinion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debate: Option<DebateState>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub precedents: Vec<Precedent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thesis: Option<ResearchThesis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trader_proposal: Option<AgentOpinion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<OutcomeView>,
}

impl RoleContext {
    pub fn new(ticker: impl Into<String>, date: NaiveDate, role: AgentRole) -> Self {
        Self {
            ticker: ticker.into(),
            date,
            role,
            risk_stance: None,
            round: None,
            snapshot: None,
            analyst_reports: Vec::new(),
            debate: None,
            precedents: Vec::new(),
            thesis: None,
            trader_proposal: None,
            outcome: None,
        }
    }

    /// Same context addressed to another role.
    pub fn for_role(&self, role: AgentRole) -> Self {
        Self {
            role,
            risk_stance: None,
            round: None,
            ..self.clone()
        }
    }

    pub fn with_snapshot(mut self, snapshot: MarketSnapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    pub fn with_reports(mut self, reports: Vec<AgentOpinion>) -> Self {
        self.analyst_reports = reports;
        self
    }
}

/// One reasoning role. Mockable for testing.
#[async_trait]
pub trait RoleAgent: Send + Sync {
    fn role(&self) -> AgentRole;

    async fn respond(&self, context: &RoleContext) -> Result<AgentOpinion, AgentError>;
}

/// A role agent backed by a language model.
pub struct LlmRoleAgent {
    role: AgentRole,
    quick_model: String,
    deep_model: String,
    backend: Arc<dyn ModelBackend>,
}

impl LlmRoleAgent {
    /// Agent that answers every turn with `model`.
    pub fn new(role: AgentRole, model: impl Into<String>, backend: Arc<dyn ModelBackend>) -> Self {
        let model = model.into();
        Self::tiered(role, model.clone(), model, backend)
    }

    /// Agent that picks the model per turn from [`AgentRole::tier_for`].
    pub fn tiered(
        role: AgentRole,
        quick_model: impl Into<String>,
        deep_model: impl Into<String>,
        backend: Arc<dyn ModelBackend>,
    ) -> Self {
        Self {
            role,
            quick_model: quick_model.into(),
            deep_model: deep_model.into(),
            backend,
        }
    }

    pub fn model_for(&self, risk_stance: Option<RiskStance>) -> &str {
        match self.role.tier_for(risk_stance) {
            ModelTier::QuickThink => self.quick_model.as_str(),
            ModelTier::DeepThink => self.deep_model.as_str(),
        }
    }
}

#[async_trait]
impl RoleAgent for LlmRoleAgent {
    fn role(&self) -> AgentRole {
        self.role
    }

    async fn respond(&self, context: &RoleContext) -> Result<AgentOpinion, AgentError> {
        let start = Instant::now();
        let system = system_prompt(self.role, context.risk_stance);
        let user = serde_json::to_string(context)?;
        let model = self.model_for(context.risk_stance);
        debug!(role = %self.role, model, prompt_bytes = user.len(), "Invoking role");

        let raw = self.backend.complete(model, &system, &user).await?;
        let payload = parse_opinion_payload(&raw)?;

        Ok(AgentOpinion {
            id: Uuid::new_v4(),
            role: self.role,
            round: context.round,
            risk_stance: context.risk_stance,
            reasoning: payload.reasoning,
            stance: payload.stance.map(|stance| StanceAssessment {
                stance,
                confidence: payload.confidence.unwrap_or(DEFAULT_CONFIDENCE),
            }),
            action: payload.action,
            concedes: payload.concedes,
            model: model.to_string(),
            produced_at: Utc::now(),
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;
    use tradegraph_models::Stance;

    /// Backend that returns a fixed answer and records the prompts it saw.
    struct CannedBackend {
        answer: String,
        seen: Mutex<Vec<(String, String, String)>>,
    }

    #[async_trait]
    impl ModelBackend for CannedBackend {
        async fn complete(
            &self,
            model: &str,
            system_prompt: &str,
            user_prompt: &str,
        ) -> Result<String, AgentError> {
            self.seen.lock().unwrap().push((
                model.to_string(),
                system_prompt.to_string(),
                user_prompt.to_string(),
            ));
            Ok(self.answer.clone())
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 10).unwrap()
    }

    #[test]
    fn default_confidence_is_one_half() {
        assert_eq!(DEFAULT_CONFIDENCE, dec!(0.5));
    }

    #[tokio::test]
    async fn builds_opinion_from_model_answer() {
        let backend = Arc::new(CannedBackend {
            answer: r#"{"reasoning": "AI demand", "stance": "bullish", "confidence": 0.9}"#
                .to_string(),
            seen: Mutex::new(Vec::new()),
        });
        let agent = LlmRoleAgent::new(AgentRole::BullResearcher, "gpt-4o-mini", backend.clone());

        let mut context = RoleContext::new("NVDA", date(), AgentRole::BullResearcher);
        context.round = Some(1);
        let opinion = agent.respond(&context).await.unwrap();

        assert_eq!(opinion.role, AgentRole::BullResearcher);
        assert_eq!(opinion.round, Some(1));
        assert_eq!(opinion.model, "gpt-4o-mini");
        let stance = opinion.stance.unwrap();
        assert_eq!(stance.stance, Stance::Bullish);
        assert_eq!(stance.confidence, dec!(0.9));

        let seen = backend.seen.lock().unwrap();
        let (model, system, user) = &seen[0];
        assert_eq!(model, "gpt-4o-mini");
        assert!(system.contains("Bull researcher"));
        let sent: serde_json::Value = serde_json::from_str(user).unwrap();
        assert_eq!(sent["ticker"], "NVDA");
        assert_eq!(sent["round"], 1);
        assert!(sent.get("thesis").is_none(), "empty fields are omitted");
    }

    #[tokio::test]
    async fn stance_without_confidence_defaults() {
        let backend = Arc::new(CannedBackend {
            answer: r#"{"reasoning": "balanced", "stance": "neutral"}"#.to_string(),
            seen: Mutex::new(Vec::new()),
        });
        let agent = LlmRoleAgent::new(AgentRole::RiskManager, "gpt-4o-mini", backend);
        let mut context = RoleContext::new("NVDA", date(), AgentRole::RiskManager);
        context.risk_stance = Some(RiskStance::Neutral);

        let opinion = agent.respond(&context).await.unwrap();
        assert_eq!(opinion.risk_stance, Some(RiskStance::Neutral));
        assert_eq!(opinion.stance.unwrap().confidence, dec!(0.5));
    }

    #[tokio::test]
    async fn neutral_risk_turn_uses_deep_model() {
        let backend = Arc::new(CannedBackend {
            answer: r#"{"reasoning": "weighing both", "stance": "bullish"}"#.to_string(),
            seen: Mutex::new(Vec::new()),
        });
        let agent =
            LlmRoleAgent::tiered(AgentRole::RiskManager, "gpt-4o-mini", "o4-mini", backend.clone());

        for stance in RiskStance::ORDER {
            let mut context = RoleContext::new("NVDA", date(), AgentRole::RiskManager);
            context.risk_stance = Some(stance);
            agent.respond(&context).await.unwrap();
        }

        let models: Vec<String> = backend
            .seen
            .lock()
            .unwrap()
            .iter()
            .map(|(model, _, _)| model.clone())
            .collect();
        assert_eq!(models, vec!["gpt-4o-mini", "gpt-4o-mini", "o4-mini"]);
    }

    #[test]
    fn for_role_clears_turn_fields() {
        let mut context = RoleContext::new("NVDA", date(), AgentRole::RiskManager);
        context.risk_stance = Some(RiskStance::Aggressive);
        context.round = Some(2);
        let trader = context.for_role(AgentRole::Trader);
        assert_eq!(trader.role, AgentRole::Trader);
        assert!(trader.risk_stance.is_none());
        assert!(trader.round.is_none());
        assert_eq!(trader.ticker, "NVDA");
    }
}
