use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};
use tradegraph_models::{AgentOpinion, AgentRole, Configuration, RetryPolicy};

use crate::error::{AgentError, PipelineError};
use crate::model_cli::ModelBackend;
use crate::role_agent::{LlmRoleAgent, RoleAgent, RoleContext};

/// The closed set of role agents plus the retry policy for invoking them.
pub struct AgentRoster {
    agents: HashMap<AgentRole, Arc<dyn RoleAgent>>,
    retry: RetryPolicy,
    debug: bool,
}

impl AgentRoster {
    pub fn new(agents: Vec<Arc<dyn RoleAgent>>, retry: RetryPolicy) -> Self {
        Self {
            agents: agents.into_iter().map(|a| (a.role(), a)).collect(),
            retry,
            debug: false,
        }
    }

    /// One LLM agent per role. Each turn runs on the model its tier maps to.
    pub fn from_config(config: &Configuration, backend: Arc<dyn ModelBackend>) -> Self {
        let agents = AgentRole::ALL
            .iter()
            .map(|role| {
                Arc::new(LlmRoleAgent::tiered(
                    *role,
                    config.quick_think_llm(),
                    config.deep_think_llm(),
                    Arc::clone(&backend),
                )) as Arc<dyn RoleAgent>
            })
            .collect();
        Self::new(agents, config.model_retry_policy())
    }

    /// Log every opinion's full reasoning at `info`.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn has_role(&self, role: AgentRole) -> bool {
        self.agents.contains_key(&role)
    }

    /// Invoke `role` with bounded retries. The returned opinion is stamped
    /// with the role, round and risk stance of `context`.
    pub async fn invoke(
        &self,
        role: AgentRole,
        context: &RoleContext,
    ) -> Result<AgentOpinion, PipelineError> {
        let agent = self.agents.get(&role).ok_or_else(|| {
            let reason = format!("no agent registered for {role}");
            PipelineError::model(role, 0, AgentError::Backend(reason))
        })?;

        let context = if context.role == role {
            Cow::Borrowed(context)
        } else {
            Cow::Owned(RoleContext {
                role,
                ..context.clone()
            })
        };

        let start = Instant::now();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let result = agent
                .respond(&context)
                .await
                .and_then(|opinion| validate(role, opinion));

            match result {
                Ok(mut opinion) => {
                    opinion.role = role;
                    opinion.round = context.round;
                    opinion.risk_stance = context.risk_stance;
                    self.log_opinion(&opinion, attempt, start);
                    return Ok(opinion);
                }
                Err(e) if e.is_retryable() && attempt <= self.retry.max_retries => {
                    let backoff = self.retry.backoff_for(attempt);
                    warn!(
                        %role,
                        attempt,
                        max_retries = self.retry.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Role invocation failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    warn!(%role, attempt, error = %e, "Role invocation failed");
                    return Err(PipelineError::model(role, attempt, e));
                }
            }
        }
    }

    fn log_opinion(&self, opinion: &AgentOpinion, attempts: u32, start: Instant) {
        let stance = opinion
            .stance
            .map(|s| format!("{:?}@{}", s.stance, s.confidence))
            .unwrap_or_else(|| "-".to_string());
        let action = opinion
            .action
            .map(|a| a.to_string())
            .unwrap_or_else(|| "-".to_string());
        if self.debug {
            info!(
                role = %opinion.role,
                round = ?opinion.round,
                risk_stance = ?opinion.risk_stance,
                %stance,
                %action,
                reasoning = %opinion.reasoning,
                "Opinion"
            );
        } else {
            debug!(
                role = %opinion.role,
                %stance,
                %action,
                attempts,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Opinion produced"
            );
        }
    }
}

/// Per-role output requirements.
fn validate(role: AgentRole, opinion: AgentOpinion) -> Result<AgentOpinion, AgentError> {
    let needs_stance = matches!(
        role,
        AgentRole::BullResearcher | AgentRole::BearResearcher | AgentRole::RiskManager
    );
    if needs_stance && opinion.stance.is_none() {
        return Err(AgentError::Parse(format!("{role} answered without a stance")));
    }
    if role == AgentRole::Trader && opinion.implied_action().is_none() {
        return Err(AgentError::Parse("trader proposed no action".to_string()));
    }
    if opinion.reasoning.trim().is_empty() {
        return Err(AgentError::Parse(format!("{role} answered without reasoning")));
    }
    Ok(opinion)
}
