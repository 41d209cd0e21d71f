use std::sync::Arc;

use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, info};
use tradegraph_memory::MemoryStore;
use tradegraph_models::{Action, AgentRole, MemoryKey, MemoryRecord, RealizedOutcome};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::role_agent::{OutcomeView, RoleContext};
use crate::roster::AgentRoster;

/// Return magnitude that earns most of the available reward.
pub const REWARD_SCALE: f64 = 0.05;
/// A HOLD is right when the absolute return stays inside this band.
pub const HOLD_BAND: f64 = 0.02;

/// Reward in (-1, 1) for taking `action` and then realizing `realized_return`.
///
/// BUY: `tanh(r/s)`. SELL: `tanh(-r/s)`. HOLD: `tanh((band - |r|)/s)`.
pub fn reward(action: Action, realized_return: Decimal) -> f64 {
    let r = realized_return.to_f64().unwrap_or(0.0);
    let x = match action {
        Action::Buy => r / REWARD_SCALE,
        Action::Sell => -r / REWARD_SCALE,
        Action::Hold => (HOLD_BAND - r.abs()) / REWARD_SCALE,
    };
    x.tanh()
}

#[derive(Debug, Clone, Default)]
pub struct ReflectionReport {
    pub recorded: Vec<MemoryRecord>,
    /// Outcomes whose `(ticker, date, action)` was already remembered.
    pub skipped: usize,
}

/// Scores realized outcomes, asks the reflector role for a lesson and
/// appends the result to memory.
pub struct Reflector {
    roster: Arc<AgentRoster>,
    memory: Arc<MemoryStore>,
}

impl Reflector {
    pub fn new(roster: Arc<AgentRoster>, memory: Arc<MemoryStore>) -> Self {
        Self { roster, memory }
    }

    pub async fn reflect_and_remember(
        &self,
        outcomes: &[RealizedOutcome],
    ) -> Result<ReflectionReport, PipelineError> {
        let mut report = ReflectionReport::default();

        for outcome in outcomes {
            let decision = &outcome.decision;
            let key = MemoryKey::for_decision(decision);
            if self.memory.contains(&key)? {
                debug!(ticker = %key.ticker, date = %key.date, action = %key.action, "Outcome already remembered");
                report.skipped += 1;
                continue;
            }

            let reward = reward(decision.action, outcome.realized_return);
            let mut context = RoleContext::new(&decision.ticker, decision.date, AgentRole::Reflector);
            context.debate = Some(decision.debate.clone());
            context.outcome = Some(OutcomeView {
                action: decision.action,
                realized_return: outcome.realized_return,
                reward,
                rationale: decision.rationale.clone(),
            });
            let lesson = self
                .roster
                .invoke(AgentRole::Reflector, &context)
                .await?
                .reasoning;

            let situation = if decision.situation.trim().is_empty() {
                decision.rationale.clone()
            } else {
                decision.situation.clone()
            };
            let record = MemoryRecord {
                id: Uuid::new_v4(),
                key,
                situation,
                decision: decision.clone(),
                realized_return: outcome.realized_return,
                reward,
                lesson,
                recorded_at: Utc::now(),
            };

            if self.memory.append(record.clone())? {
                info!(
                    ticker = %record.key.ticker,
                    date = %record.key.date,
                    action = %record.key.action,
                    realized_return = %record.realized_return,
                    reward = record.reward,
                    "Reflection remembered"
                );
                report.recorded.push(record);
            } else {
                report.skipped += 1;
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn buy_reward_follows_return_sign() {
        assert!(reward(Action::Buy, dec!(0.05)) > 0.7);
        assert!(reward(Action::Buy, dec!(-0.05)) < -0.7);
        assert_eq!(reward(Action::Buy, dec!(0)), 0.0);
    }

    #[test]
    fn sell_mirrors_buy() {
        let r = dec!(-0.03);
        assert!((reward(Action::Sell, r) + reward(Action::Buy, r)).abs() < 1e-12);
        assert!(reward(Action::Sell, r) > 0.0);
    }

    #[test]
    fn hold_rewards_quiet_markets() {
        assert!(reward(Action::Hold, dec!(0.005)) > 0.0);
        assert!(reward(Action::Hold, dec!(-0.01)) > 0.0);
        assert!(reward(Action::Hold, dec!(0.08)) < 0.0);
        assert!(reward(Action::Hold, dec!(-0.08)) < 0.0);
        assert!(reward(Action::Hold, dec!(0.02)).abs() < 1e-12);
    }

    #[test]
    fn reward_is_bounded() {
        for r in [dec!(-10), dec!(-0.5), dec!(0.5), dec!(10)] {
            for action in [Action::Buy, Action::Sell, Action::Hold] {
                let v = reward(action, r);
                assert!((-1.0..=1.0).contains(&v));
            }
        }
    }
}
