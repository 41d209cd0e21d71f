use thiserror::Error;
use tradegraph_memory::MemoryError;
use tradegraph_models::{AgentRole, AuditTrail, ConfigError, DebateState, DebateViolation};
use tradegraph_vendors::VendorError;

/// Failure of a single model call.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Model backend error: {0}")]
    Backend(String),

    #[error("Agent response parse error: {0}")]
    Parse(String),

    #[error("Agent timed out after {0} seconds")]
    Timeout(u64),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AgentError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, AgentError::Json(_))
    }
}

/// Failure of a `propagate` or reflection run. No partial decision is ever
/// returned; the variants that abort mid-run carry what was recorded so far.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Vendor error: {0}")]
    Vendor(#[from] VendorError),

    #[error("Model invocation failed for {role} after {attempts} attempt(s): {source}")]
    ModelInvocation {
        role: AgentRole,
        attempts: u32,
        #[source]
        source: AgentError,
    },

    #[error("Debate interrupted after {} round(s): {source}", .partial.rounds_completed())]
    DebateInterrupted {
        partial: Box<DebateState>,
        #[source]
        source: Box<PipelineError>,
    },

    #[error("Debate protocol violation: {0}")]
    Protocol(#[from] DebateViolation),

    #[error("Deadline of {deadline_ms}ms exceeded")]
    Timeout {
        deadline_ms: u64,
        partial: Box<AuditTrail>,
    },

    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("Agent task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn model(role: AgentRole, attempts: u32, source: AgentError) -> Self {
        PipelineError::ModelInvocation {
            role,
            attempts,
            source,
        }
    }

    /// The audit trail recorded before a deadline expired.
    pub fn partial_trail(&self) -> Option<&AuditTrail> {
        match self {
            PipelineError::Timeout { partial, .. } => Some(partial.as_ref()),
            _ => None,
        }
    }
}
