use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use tokio::task::JoinSet;
use tracing::{info, warn};
use tradegraph_memory::MemoryStore;
use tradegraph_models::{
    AgentOpinion, AgentRole, AuditTrail, CategoryPayload, Configuration, DataCategory,
    DebateState, Decision, MarketSnapshot,
};
use tradegraph_vendors::DataVendorRouter;
use uuid::Uuid;

use crate::debate::DebateCoordinator;
use crate::error::{AgentError, PipelineError};
use crate::role_agent::RoleContext;
use crate::roster::AgentRoster;

const HEADLINES_IN_SUMMARY: usize = 5;
const REPORT_CHARS_IN_SUMMARY: usize = 600;

/// Where the audit trail of a run is written under `results_dir`.
pub fn trail_path(results_dir: &Path, ticker: &str, date: NaiveDate) -> PathBuf {
    results_dir
        .join(ticker)
        .join(format!("full_states_log_{}.json", date.format("%Y-%m-%d")))
}

/// Text the memory store is queried with and that a reflected decision is
/// remembered under: ticker, price move, headlines and analyst findings.
pub fn situation_summary(snapshot: &MarketSnapshot, reports: &[AgentOpinion]) -> String {
    let mut parts = vec![format!("{} as of {}", snapshot.ticker, snapshot.as_of)];

    if let Some(bars) = snapshot.prices() {
        if let (Some(first), Some(last)) = (bars.first(), bars.last()) {
            let change = if first.close.is_zero() {
                Decimal::ZERO
            } else {
                ((last.close - first.close) / first.close * Decimal::ONE_HUNDRED).round_dp(2)
            };
            parts.push(format!(
                "close {} change {change}% over {} sessions",
                last.close,
                bars.len()
            ));
        }
    }

    if let Some(CategoryPayload::News(items)) =
        snapshot.get(DataCategory::NewsData).map(|d| &d.payload)
    {
        let headlines: Vec<&str> = items
            .iter()
            .take(HEADLINES_IN_SUMMARY)
            .map(|n| n.headline.as_str())
            .collect();
        if !headlines.is_empty() {
            parts.push(format!("headlines: {}", headlines.join("; ")));
        }
    }

    for report in reports {
        let excerpt: String = report.reasoning.chars().take(REPORT_CHARS_IN_SUMMARY).collect();
        parts.push(format!("{}: {excerpt}", report.role));
    }

    parts.join(". ")
}

/// One `propagate` run: fetch → analysts (concurrent) → debate → trader →
/// fund manager. Either a complete [`Decision`] or a typed error comes back.
pub struct DecisionPipeline {
    config: Arc<Configuration>,
    router: Arc<DataVendorRouter>,
    roster: Arc<AgentRoster>,
    memory: Arc<MemoryStore>,
}

impl DecisionPipeline {
    pub fn new(
        config: Arc<Configuration>,
        router: Arc<DataVendorRouter>,
        roster: Arc<AgentRoster>,
        memory: Arc<MemoryStore>,
    ) -> Self {
        Self {
            config,
            router,
            roster,
            memory,
        }
    }

    /// Run once. The audit trail of the run comes back with the decision.
    pub async fn propagate(
        &self,
        ticker: &str,
        date: NaiveDate,
    ) -> Result<(AuditTrail, Decision), PipelineError> {
        self.run_traced(ticker, date, None).await
    }

    /// Like [`propagate`](Self::propagate), but aborts in-flight work when
    /// `deadline` expires and returns [`PipelineError::Timeout`] carrying the
    /// trail recorded up to the last completed step.
    pub async fn propagate_with_deadline(
        &self,
        ticker: &str,
        date: NaiveDate,
        deadline: Duration,
    ) -> Result<(AuditTrail, Decision), PipelineError> {
        self.run_traced(ticker, date, Some(deadline)).await
    }

    async fn run_traced(
        &self,
        ticker: &str,
        date: NaiveDate,
        deadline: Option<Duration>,
    ) -> Result<(AuditTrail, Decision), PipelineError> {
        let trail = Mutex::new(AuditTrail::new(ticker, date));
        let result = match deadline {
            None => self.run(ticker, date, &trail).await,
            Some(deadline) => {
                match tokio::time::timeout(deadline, self.run(ticker, date, &trail)).await {
                    Ok(result) => result,
                    Err(_) => return Err(self.deadline_exceeded(&trail, deadline).await),
                }
            }
        };

        let trail = close_trail(&trail);
        match result {
            Ok(decision) => {
                self.write_trail(&trail).await?;
                Ok((trail, decision))
            }
            Err(e) => {
                if let Err(write_err) = self.write_trail(&trail).await {
                    warn!(error = %write_err, "Failed to write audit trail of failed run");
                }
                Err(e)
            }
        }
    }

    async fn deadline_exceeded(&self, trail: &Mutex<AuditTrail>, deadline: Duration) -> PipelineError {
        let partial = close_trail(trail);
        let deadline_ms = deadline.as_millis() as u64;
        warn!(
            ticker = %partial.ticker,
            date = %partial.date,
            deadline_ms,
            reports = partial.analyst_reports.len(),
            "Deadline exceeded, run aborted"
        );
        if let Err(e) = self.write_trail(&partial).await {
            warn!(error = %e, "Failed to write partial audit trail");
        }
        PipelineError::Timeout {
            deadline_ms,
            partial: Box::new(partial),
        }
    }

    async fn write_trail(&self, trail: &AuditTrail) -> Result<(), PipelineError> {
        let Some(dir) = self.config.results_dir() else {
            return Ok(());
        };
        let path = trail_path(dir, &trail.ticker, trail.date);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, serde_json::to_vec_pretty(trail)?).await?;
        info!(path = %path.display(), "Audit trail written");
        Ok(())
    }

    async fn run(
        &self,
        ticker: &str,
        date: NaiveDate,
        trail: &Mutex<AuditTrail>,
    ) -> Result<Decision, PipelineError> {
        let start = Instant::now();
        info!(ticker, %date, "Starting propagation");

        // 1. Market data
        let snapshot = self
            .router
            .fetch(ticker, date, &self.config.required_categories())
            .await?;
        record(trail, |t| t.snapshot = Some(snapshot.clone()));

        // 2. Analysts in parallel
        let reports = self.run_analysts(ticker, date, &snapshot).await?;
        record(trail, |t| t.analyst_reports = reports.clone());

        // 3. Bull/bear debate and risk phase
        let situation = situation_summary(&snapshot, &reports);
        let base = RoleContext::new(ticker, date, AgentRole::BullResearcher)
            .with_snapshot(snapshot)
            .with_reports(reports);
        let coordinator = DebateCoordinator::new(
            Arc::clone(&self.roster),
            Arc::clone(&self.memory),
            self.config.max_debate_rounds(),
            self.config.memory_top_k(),
        );
        let progress = |state: &DebateState| record(trail, |t| t.debate = Some(state.clone()));
        let debate = match coordinator.run(&base, &situation, progress).await {
            Ok(debate) => debate,
            Err(e) => {
                if let PipelineError::DebateInterrupted { partial, .. } = &e {
                    record(trail, |t| t.debate = Some(partial.as_ref().clone()));
                }
                return Err(e);
            }
        };

        // 4. Trader
        let mut context = base.for_role(AgentRole::Trader);
        context.debate = Some(debate.clone());
        context.thesis = debate.thesis.clone();
        context.precedents = debate.precedents.clone();
        let trader = self.roster.invoke(AgentRole::Trader, &context).await?;
        record(trail, |t| t.trader = Some(trader.clone()));
        let proposed = trader.implied_action().ok_or_else(|| {
            PipelineError::model(
                AgentRole::Trader,
                1,
                AgentError::Parse("trader proposed no action".to_string()),
            )
        })?;

        // 5. Fund manager ratifies or overrides
        let mut context = context.for_role(AgentRole::FundManager);
        context.trader_proposal = Some(trader.clone());
        let manager = self.roster.invoke(AgentRole::FundManager, &context).await?;
        record(trail, |t| t.fund_manager = Some(manager.clone()));
        let action = manager.implied_action().unwrap_or(proposed);
        if action != proposed {
            info!(ticker, %proposed, %action, "Fund manager overrode trader");
        }

        let rationale = if manager.reasoning.trim().is_empty() {
            trader.reasoning.clone()
        } else {
            manager.reasoning.clone()
        };
        let decision = Decision {
            id: Uuid::new_v4(),
            ticker: ticker.to_string(),
            date,
            action,
            rationale,
            situation,
            debate,
            decided_at: Utc::now(),
        };
        record(trail, |t| t.decision = Some(decision.clone()));

        info!(
            ticker,
            %date,
            %action,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Propagation complete"
        );
        Ok(decision)
    }

    async fn run_analysts(
        &self,
        ticker: &str,
        date: NaiveDate,
        snapshot: &MarketSnapshot,
    ) -> Result<Vec<AgentOpinion>, PipelineError> {
        let analysts = self.config.selected_analysts();
        let mut set = JoinSet::new();
        for (idx, kind) in analysts.iter().enumerate() {
            let role = AgentRole::analyst(*kind);
            let context = RoleContext::new(ticker, date, role)
                .with_snapshot(snapshot.view(kind.categories()));
            let roster = Arc::clone(&self.roster);
            set.spawn(async move { (idx, roster.invoke(role, &context).await) });
        }

        let mut reports: Vec<Option<AgentOpinion>> = vec![None; analysts.len()];
        while let Some(joined) = set.join_next().await {
            let (idx, result) = joined?;
            // Dropping the set on error aborts the remaining analysts.
            reports[idx] = Some(result?);
        }
        Ok(reports.into_iter().flatten().collect())
    }
}

fn record(trail: &Mutex<AuditTrail>, update: impl FnOnce(&mut AuditTrail)) {
    let mut guard = trail.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    update(&mut guard);
}

fn close_trail(trail: &Mutex<AuditTrail>) -> AuditTrail {
    let mut guard = trail.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    guard.finished_at = Some(Utc::now());
    guard.clone()
}
