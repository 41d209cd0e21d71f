use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::memory::Precedent;
use crate::opinion::{AgentOpinion, AgentRole, RiskStance, Stance};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DebatePhase {
    NotStarted,
    BullTurn,
    BearTurn,
    RiskPhase,
    Concluded,
}

/// The speaker the debate is waiting on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DebateTurn {
    Bull { round: u32 },
    Bear { round: u32 },
    Risk { stance: RiskStance },
}

impl DebateTurn {
    pub fn role(&self) -> AgentRole {
        match self {
            DebateTurn::Bull { .. } => AgentRole::BullResearcher,
            DebateTurn::Bear { .. } => AgentRole::BearResearcher,
            DebateTurn::Risk { .. } => AgentRole::RiskManager,
        }
    }

    pub fn round(&self) -> Option<u32> {
        match self {
            DebateTurn::Bull { round } | DebateTurn::Bear { round } => Some(*round),
            DebateTurn::Risk { .. } => None,
        }
    }

    pub fn risk_stance(&self) -> Option<RiskStance> {
        match self {
            DebateTurn::Risk { stance } => Some(*stance),
            _ => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DebateViolation {
    #[error("Debate has not started")]
    NotStarted,

    #[error("Debate already started")]
    AlreadyStarted,

    #[error("Debate has concluded; no further opinions are accepted")]
    Concluded,

    #[error("Expected {expected:?}, got opinion from {got} (round {round:?})")]
    WrongSpeaker {
        expected: DebateTurn,
        got: AgentRole,
        round: Option<u32>,
    },

    #[error("Risk phase incomplete: {0} of 3 stances heard")]
    RiskPhaseIncomplete(usize),

    #[error("Every risk stance has spoken; awaiting conclusion")]
    RiskPhaseClosed,
}

/// Consolidated research thesis produced when the debate concludes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResearchThesis {
    pub stance: Stance,
    /// Confidence-weighted stance score in [-1, 1].
    pub score: Decimal,
    pub bull_weight: Decimal,
    pub bear_weight: Decimal,
    /// The score fell inside the tie band and the synthesis stance decided.
    pub tie_broken: bool,
    pub summary: String,
}

/// Turn-based bull/bear/risk debate.
///
/// The state enforces turn order and the round cap itself, so a coordinator
/// bug can not append out of turn, exceed `max_rounds`, or write after the
/// debate concluded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DebateState {
    pub phase: DebatePhase,
    /// Current round, 1-based once started. Never exceeds `max_rounds`.
    pub round: u32,
    pub max_rounds: u32,
    pub bull: Vec<AgentOpinion>,
    pub bear: Vec<AgentOpinion>,
    pub risk: Vec<AgentOpinion>,
    /// Memory precedents injected into any turn, deduplicated.
    pub precedents: Vec<Precedent>,
    pub thesis: Option<ResearchThesis>,
}

impl DebateState {
    pub fn new(max_rounds: u32) -> Self {
        Self {
            phase: DebatePhase::NotStarted,
            round: 0,
            max_rounds: max_rounds.max(1),
            bull: Vec::new(),
            bear: Vec::new(),
            risk: Vec::new(),
            precedents: Vec::new(),
            thesis: None,
        }
    }

    pub fn start(&mut self) -> Result<(), DebateViolation> {
        if self.phase != DebatePhase::NotStarted {
            return Err(DebateViolation::AlreadyStarted);
        }
        self.phase = DebatePhase::BullTurn;
        self.round = 1;
        Ok(())
    }

    pub fn is_concluded(&self) -> bool {
        self.phase == DebatePhase::Concluded
    }

    /// Completed bull+bear exchanges.
    pub fn rounds_completed(&self) -> usize {
        self.bear.len()
    }

    /// Who speaks next, or `None` when no opinion is expected.
    pub fn next_turn(&self) -> Option<DebateTurn> {
        match self.phase {
            DebatePhase::BullTurn => Some(DebateTurn::Bull { round: self.round }),
            DebatePhase::BearTurn => Some(DebateTurn::Bear { round: self.round }),
            DebatePhase::RiskPhase => RiskStance::ORDER
                .get(self.risk.len())
                .map(|stance| DebateTurn::Risk { stance: *stance }),
            DebatePhase::NotStarted | DebatePhase::Concluded => None,
        }
    }

    pub fn risk_phase_complete(&self) -> bool {
        self.phase == DebatePhase::RiskPhase && self.risk.len() == RiskStance::ORDER.len()
    }

    /// Append the opinion for the expected turn and advance the state machine.
    pub fn append(&mut self, opinion: AgentOpinion) -> Result<(), DebateViolation> {
        let expected = match self.phase {
            DebatePhase::NotStarted => return Err(DebateViolation::NotStarted),
            DebatePhase::Concluded => return Err(DebateViolation::Concluded),
            _ => self
                .next_turn()
                .ok_or(DebateViolation::RiskPhaseClosed)?,
        };

        let matches = opinion.role == expected.role()
            && opinion.round == expected.round()
            && opinion.risk_stance == expected.risk_stance();
        if !matches {
            return Err(DebateViolation::WrongSpeaker {
                expected,
                got: opinion.role,
                round: opinion.round,
            });
        }

        match expected {
            DebateTurn::Bull { .. } => {
                self.bull.push(opinion);
                self.phase = DebatePhase::BearTurn;
            }
            DebateTurn::Bear { .. } => {
                let both_concede =
                    opinion.concedes && self.bull.last().map(|b| b.concedes).unwrap_or(false);
                self.bear.push(opinion);
                if both_concede || self.round >= self.max_rounds {
                    self.phase = DebatePhase::RiskPhase;
                } else {
                    self.round += 1;
                    self.phase = DebatePhase::BullTurn;
                }
            }
            DebateTurn::Risk { .. } => {
                self.risk.push(opinion);
            }
        }
        Ok(())
    }

    /// Close the debate with its thesis. Requires every risk stance heard.
    pub fn conclude(&mut self, thesis: ResearchThesis) -> Result<(), DebateViolation> {
        match self.phase {
            DebatePhase::Concluded => return Err(DebateViolation::Concluded),
            DebatePhase::NotStarted => return Err(DebateViolation::NotStarted),
            _ if !self.risk_phase_complete() => {
                return Err(DebateViolation::RiskPhaseIncomplete(self.risk.len()))
            }
            _ => {}
        }
        self.thesis = Some(thesis);
        self.phase = DebatePhase::Concluded;
        Ok(())
    }

    pub fn record_precedents(&mut self, precedents: &[Precedent]) {
        for precedent in precedents {
            if !self
                .precedents
                .iter()
                .any(|p| p.record_id == precedent.record_id)
            {
                self.precedents.push(precedent.clone());
            }
        }
    }

    /// All opinions in speaking order: bull/bear alternating by round, then risk.
    pub fn transcript(&self) -> Vec<&AgentOpinion> {
        let mut out = Vec::with_capacity(self.bull.len() + self.bear.len() + self.risk.len());
        for (i, bull) in self.bull.iter().enumerate() {
            out.push(bull);
            if let Some(bear) = self.bear.get(i) {
                out.push(bear);
            }
        }
        out.extend(self.risk.iter());
        out
    }

    /// The risk-phase synthesis opinion (neutral stance), once heard.
    pub fn synthesis(&self) -> Option<&AgentOpinion> {
        self.risk
            .iter()
            .find(|o| o.risk_stance == Some(RiskStance::Neutral))
    }
}
