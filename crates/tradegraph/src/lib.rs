//! tradegraph - multi-agent trading decision engine
//!
//! Analyst, researcher, risk, trader and fund-manager roles debate a
//! `(ticker, date)` snapshot and return one BUY/SELL/HOLD decision. Realized
//! outcomes are reflected on and remembered for later runs.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use tradegraph::models::{Configuration, RealizedOutcome};
//! use tradegraph::TradingEngine;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Configuration::builder().max_debate_rounds(2).build()?;
//! let engine = TradingEngine::new(false, config)?;
//! let date = chrono::NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
//! let (_trail, decision) = engine.propagate("NVDA", date).await?;
//! println!("{}", decision.action);
//! # Ok(())
//! # }
//! ```

pub use tradegraph_agents as agents;
pub use tradegraph_memory as memory;
pub use tradegraph_models as models;
pub use tradegraph_vendors as vendors;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{info, warn};
use tradegraph_agents::{
    AgentRoster, CliModelBackend, DecisionPipeline, ModelCliConfig, PipelineError,
    ReflectionReport, Reflector,
};
use tradegraph_memory::{MemoryError, MemoryStore};
use tradegraph_models::{
    AuditTrail, ConfigError, Configuration, Decision, RealizedOutcome, VendorId,
};
use tradegraph_vendors::{CommandVendor, DataVendor, DataVendorRouter, LocalVendor};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to open local vendor data {}: {reason}", .path.display())]
    LocalData { path: PathBuf, reason: String },

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error("Failed to create directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Create the directory a SQLite file will live in.
fn ensure_parent(path: &Path) -> Result<(), EngineError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent).map_err(|source| EngineError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })
        }
        _ => Ok(()),
    }
}

/// Vendor implementations for `config`: one command vendor per configured
/// command, plus the SQLite-backed local vendor when `local_data_path` is set.
pub fn build_vendors(config: &Configuration) -> Result<Vec<Arc<dyn DataVendor>>, EngineError> {
    let mut vendors: Vec<Arc<dyn DataVendor>> = Vec::new();
    for vendor in VendorId::ALL {
        if let Some(argv) = config.vendor_command(vendor) {
            vendors.push(Arc::new(CommandVendor::new(
                vendor,
                argv.to_vec(),
                config.model_timeout(),
            )));
        }
    }
    if let Some(path) = config.local_data_path() {
        ensure_parent(path)?;
        let local = LocalVendor::open(path).map_err(|e| EngineError::LocalData {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        vendors.push(Arc::new(local));
    }
    Ok(vendors)
}

/// Owns one configuration's router, roster and memory store.
///
/// The memory store lives as long as the engine; every run and reflection
/// made through it shares the same store.
pub struct TradingEngine {
    config: Arc<Configuration>,
    pipeline: DecisionPipeline,
    reflector: Reflector,
    memory: Arc<MemoryStore>,
    last_decision: Mutex<Option<Decision>>,
}

impl TradingEngine {
    /// Build an engine backed by the configured model CLI and vendors.
    pub fn new(debug: bool, config: Configuration) -> Result<Self, EngineError> {
        let vendors = build_vendors(&config)?;
        let backend = Arc::new(CliModelBackend::new(ModelCliConfig::from_config(&config)));
        let roster = AgentRoster::from_config(&config, backend).with_debug(debug);
        let memory = match config.memory_path() {
            Some(path) => {
                ensure_parent(path)?;
                MemoryStore::open(path)?
            }
            None => MemoryStore::new(),
        };
        Self::with_components(config, vendors, roster, Arc::new(memory))
    }

    /// Build an engine from explicit parts.
    pub fn with_components(
        config: Configuration,
        vendors: Vec<Arc<dyn DataVendor>>,
        roster: AgentRoster,
        memory: Arc<MemoryStore>,
    ) -> Result<Self, EngineError> {
        let config = Arc::new(config);
        let router = Arc::new(DataVendorRouter::new(&config, vendors)?);
        let roster = Arc::new(roster);
        let pipeline = DecisionPipeline::new(
            Arc::clone(&config),
            router,
            Arc::clone(&roster),
            Arc::clone(&memory),
        );
        let reflector = Reflector::new(roster, Arc::clone(&memory));
        info!(
            provider = %config.llm_provider(),
            deep = config.deep_think_llm(),
            quick = config.quick_think_llm(),
            max_debate_rounds = config.max_debate_rounds(),
            "Engine ready"
        );
        Ok(Self {
            config,
            pipeline,
            reflector,
            memory,
            last_decision: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    /// Decide for `(ticker, date)`. Returns the run's audit trail and the decision.
    pub async fn propagate(
        &self,
        ticker: &str,
        date: NaiveDate,
    ) -> Result<(AuditTrail, Decision), PipelineError> {
        let run = self.pipeline.propagate(ticker, date).await?;
        Ok(self.remember_last(run))
    }

    pub async fn propagate_with_deadline(
        &self,
        ticker: &str,
        date: NaiveDate,
        deadline: Duration,
    ) -> Result<(AuditTrail, Decision), PipelineError> {
        let run = self
            .pipeline
            .propagate_with_deadline(ticker, date, deadline)
            .await?;
        Ok(self.remember_last(run))
    }

    fn remember_last(&self, run: (AuditTrail, Decision)) -> (AuditTrail, Decision) {
        *self
            .last_decision
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(run.1.clone());
        run
    }

    pub async fn reflect_and_remember(
        &self,
        outcomes: &[RealizedOutcome],
    ) -> Result<ReflectionReport, PipelineError> {
        self.reflector.reflect_and_remember(outcomes).await
    }

    /// Reflect on the most recent decision made through this engine.
    pub async fn reflect_on_last(
        &self,
        realized_return: Decimal,
    ) -> Result<ReflectionReport, PipelineError> {
        let last = self
            .last_decision
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        let Some(decision) = last else {
            warn!("No decision to reflect on yet");
            return Ok(ReflectionReport::default());
        };
        self.reflect_and_remember(&[RealizedOutcome {
            decision,
            realized_return,
        }])
        .await
    }
}
