use std::sync::Arc;
use std::time::Instant;

use rust_decimal::Decimal;
use tracing::{debug, info};
use tradegraph_memory::MemoryStore;
use tradegraph_models::{AgentOpinion, DebateState, DebateTurn, Precedent, ResearchThesis, Stance};

use crate::error::PipelineError;
use crate::role_agent::RoleContext;
use crate::roster::AgentRoster;

/// Scores with magnitude at or below this are ties.
pub const TIE_BAND: Decimal = Decimal::from_parts(5, 0, 0, false, 2);

/// Confidence-weighted stance score over every debate opinion.
///
/// `score = Σ sign(stance)·confidence / Σ confidence`. Inside the tie band the
/// synthesis (neutral risk) opinion's stance decides.
pub fn compute_thesis(state: &DebateState) -> ResearchThesis {
    let mut numerator = Decimal::ZERO;
    let mut total = Decimal::ZERO;
    let mut bull_weight = Decimal::ZERO;
    let mut bear_weight = Decimal::ZERO;

    for assessment in state.transcript().iter().filter_map(|o| o.stance) {
        let confidence = assessment.confidence;
        numerator += Decimal::from(assessment.stance.sign()) * confidence;
        total += confidence;
        match assessment.stance {
            Stance::Bullish => bull_weight += confidence,
            Stance::Bearish => bear_weight += confidence,
            Stance::Neutral => {}
        }
    }

    let score = if total.is_zero() {
        Decimal::ZERO
    } else {
        (numerator / total).round_dp(4)
    };

    let tie = score.abs() <= TIE_BAND;
    let stance = if tie {
        state
            .synthesis()
            .and_then(|o| o.stance)
            .map(|s| s.stance)
            .unwrap_or(Stance::Neutral)
    } else if score > Decimal::ZERO {
        Stance::Bullish
    } else {
        Stance::Bearish
    };

    let summary = format!(
        "{:?} thesis after {} round(s): score {score}, bull weight {bull_weight}, bear weight {bear_weight}{}",
        stance,
        state.rounds_completed(),
        if tie { ", tie broken by synthesis" } else { "" },
    );

    ResearchThesis {
        stance,
        score,
        bull_weight,
        bear_weight,
        tie_broken: tie,
        summary,
    }
}

/// Drives a [`DebateState`] to conclusion by invoking the roster for each turn.
///
/// Turns are strictly sequential. Before each turn the memory store is
/// queried for precedents similar to the situation. The first failing turn
/// aborts the debate with [`PipelineError::DebateInterrupted`].
pub struct DebateCoordinator {
    roster: Arc<AgentRoster>,
    memory: Arc<MemoryStore>,
    max_rounds: u32,
    memory_top_k: usize,
}

impl DebateCoordinator {
    pub fn new(
        roster: Arc<AgentRoster>,
        memory: Arc<MemoryStore>,
        max_rounds: u32,
        memory_top_k: usize,
    ) -> Self {
        Self {
            roster,
            memory,
            max_rounds,
            memory_top_k,
        }
    }

    /// Run the debate for `base` (ticker, date, snapshot and analyst reports).
    ///
    /// `progress` sees the state after every completed turn, so a caller that
    /// drops this future still holds the debate up to its last turn.
    pub async fn run<F>(
        &self,
        base: &RoleContext,
        situation: &str,
        mut progress: F,
    ) -> Result<DebateState, PipelineError>
    where
        F: FnMut(&DebateState) + Send,
    {
        let start = Instant::now();
        let mut state = DebateState::new(self.max_rounds);
        state.start()?;

        while let Some(turn) = state.next_turn() {
            match self.take_turn(&state, base, situation, turn).await {
                Ok((precedents, opinion)) => {
                    state.record_precedents(&precedents);
                    if let Err(violation) = state.append(opinion) {
                        return Err(interrupted(state, violation.into()));
                    }
                    progress(&state);
                }
                Err(e) => return Err(interrupted(state, e)),
            }
        }

        let thesis = compute_thesis(&state);
        info!(
            ticker = %base.ticker,
            stance = ?thesis.stance,
            score = %thesis.score,
            rounds = state.rounds_completed(),
            tie_broken = thesis.tie_broken,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Debate concluded"
        );
        if let Err(violation) = state.conclude(thesis) {
            return Err(interrupted(state, violation.into()));
        }
        progress(&state);
        Ok(state)
    }

    async fn take_turn(
        &self,
        state: &DebateState,
        base: &RoleContext,
        situation: &str,
        turn: DebateTurn,
    ) -> Result<(Vec<Precedent>, AgentOpinion), PipelineError> {
        let precedents = self.memory.query(situation, self.memory_top_k)?;
        debug!(?turn, precedents = precedents.len(), "Debate turn");

        let mut context = base.for_role(turn.role());
        context.round = turn.round();
        context.risk_stance = turn.risk_stance();
        context.debate = Some(state.clone());
        context.precedents = precedents.clone();

        let opinion = self.roster.invoke(turn.role(), &context).await?;
        Ok((precedents, opinion))
    }
}

fn interrupted(state: DebateState, source: PipelineError) -> PipelineError {
    PipelineError::DebateInterrupted {
        partial: Box::new(state),
        source: Box::new(source),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use tradegraph_models::{AgentRole, RiskStance, StanceAssessment};
    use uuid::Uuid;

    fn opinion(
        role: AgentRole,
        round: Option<u32>,
        risk: Option<RiskStance>,
        stance: Stance,
        confidence: Decimal,
    ) -> AgentOpinion {
        AgentOpinion {
            id: Uuid::new_v4(),
            role,
            round,
            risk_stance: risk,
            reasoning: "r".to_string(),
            stance: Some(StanceAssessment { stance, confidence }),
            action: None,
            concedes: false,
            model: "m".to_string(),
            produced_at: Utc::now(),
            elapsed_ms: 0,
        }
    }

    fn debate(
        bull: (Stance, Decimal),
        bear: (Stance, Decimal),
        risk: [(Stance, Decimal); 3],
    ) -> DebateState {
        let mut state = DebateState::new(1);
        state.start().unwrap();
        state
            .append(opinion(AgentRole::BullResearcher, Some(1), None, bull.0, bull.1))
            .unwrap();
        state
            .append(opinion(AgentRole::BearResearcher, Some(1), None, bear.0, bear.1))
            .unwrap();
        for (stance, (s, c)) in RiskStance::ORDER.iter().zip(risk) {
            state
                .append(opinion(AgentRole::RiskManager, None, Some(*stance), s, c))
                .unwrap();
        }
        state
    }

    #[test]
    fn tie_band_is_five_hundredths() {
        assert_eq!(TIE_BAND, dec!(0.05));
    }

    #[test]
    fn bullish_weight_wins() {
        let state = debate(
            (Stance::Bullish, dec!(0.9)),
            (Stance::Bearish, dec!(0.4)),
            [
                (Stance::Bullish, dec!(0.8)),
                (Stance::Bearish, dec!(0.5)),
                (Stance::Bullish, dec!(0.6)),
            ],
        );
        let thesis = compute_thesis(&state);
        assert_eq!(thesis.stance, Stance::Bullish);
        assert!(!thesis.tie_broken);
        assert_eq!(thesis.bull_weight, dec!(2.3));
        assert_eq!(thesis.bear_weight, dec!(0.9));
        // (2.3 - 0.9) / 3.2
        assert_eq!(thesis.score, dec!(0.4375));
    }

    #[test]
    fn tie_resolved_by_synthesis_stance() {
        let state = debate(
            (Stance::Bullish, dec!(0.5)),
            (Stance::Bearish, dec!(0.5)),
            [
                (Stance::Bullish, dec!(0.5)),
                (Stance::Bearish, dec!(0.5)),
                (Stance::Bearish, dec!(0)),
            ],
        );
        let thesis = compute_thesis(&state);
        assert_eq!(thesis.score, dec!(0));
        assert!(thesis.tie_broken);
        assert_eq!(thesis.stance, Stance::Bearish);
    }

    #[test]
    fn score_on_band_edge_is_a_tie() {
        // (0.525 - 0.475) / 1.0 = 0.05
        let state = debate(
            (Stance::Bullish, dec!(0.525)),
            (Stance::Bearish, dec!(0.475)),
            [
                (Stance::Neutral, dec!(0)),
                (Stance::Neutral, dec!(0)),
                (Stance::Neutral, dec!(0)),
            ],
        );
        let thesis = compute_thesis(&state);
        assert_eq!(thesis.score, dec!(0.05));
        assert!(thesis.tie_broken);
        assert_eq!(thesis.stance, Stance::Neutral);
    }
}
