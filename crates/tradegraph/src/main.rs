use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tradegraph::models::{AuditTrail, ConfigBuilder, Configuration, Decision, FileConfig};
use tradegraph::TradingEngine;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tradegraph", about = "Multi-agent trading decision engine")]
struct Cli {
    /// Path to a TOML configuration file. Built-in defaults when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override one configuration key, e.g. `--set max_debate_rounds=2`
    #[arg(long = "set", value_name = "KEY=VALUE")]
    overrides: Vec<String>,

    /// Log at debug level and log every opinion's full reasoning
    #[arg(long)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decide BUY/SELL/HOLD for one ticker on one date
    Propagate {
        #[arg(long)]
        ticker: String,

        /// Trade date, YYYY-MM-DD
        #[arg(long)]
        date: NaiveDate,

        /// Abort the run after this many seconds
        #[arg(long)]
        deadline_seconds: Option<u64>,

        /// Print the full audit trail instead of the decision
        #[arg(long)]
        trail: bool,

        /// Pretty-print the output JSON
        #[arg(long)]
        pretty: bool,
    },
    /// Score a past decision against its realized return and remember the lesson
    Reflect {
        /// Decision JSON, or an audit trail JSON containing one
        #[arg(long)]
        decision: PathBuf,

        /// Realized fractional return, e.g. -0.05
        #[arg(long = "return", allow_hyphen_values = true)]
        realized_return: Decimal,

        /// Pretty-print the output JSON
        #[arg(long)]
        pretty: bool,
    },
}

fn init_tracing(debug: bool, json: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&Path>, overrides: &[String]) -> Result<Configuration> {
    let mut builder = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            let file: FileConfig =
                toml::from_str(&text).with_context(|| "Failed to parse config")?;
            file.into_builder().context("Invalid config file")?
        }
        None => ConfigBuilder::default(),
    };
    for entry in overrides {
        let (key, value) = entry
            .split_once('=')
            .with_context(|| format!("Override must be KEY=VALUE: {entry}"))?;
        builder = builder
            .set(key.trim(), value.trim())
            .with_context(|| format!("Invalid override: {entry}"))?;
    }
    builder.build().context("Invalid configuration")
}

fn read_decision(path: &Path) -> Result<Decision> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read decision: {}", path.display()))?;
    if let Ok(decision) = serde_json::from_str::<Decision>(&text) {
        return Ok(decision);
    }
    let trail: AuditTrail =
        serde_json::from_str(&text).context("Expected a Decision or AuditTrail JSON")?;
    trail
        .decision
        .context("Audit trail has no decision; the run did not complete")
}

fn to_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<String> {
    Ok(if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug, cli.log_json);

    let config = load_config(cli.config.as_deref(), &cli.overrides)?;
    let engine = TradingEngine::new(cli.debug, config).context("Failed to build engine")?;

    match cli.command {
        Command::Propagate {
            ticker,
            date,
            deadline_seconds,
            trail,
            pretty,
        } => {
            let run = match deadline_seconds {
                Some(seconds) => {
                    engine
                        .propagate_with_deadline(&ticker, date, Duration::from_secs(seconds))
                        .await
                }
                None => engine.propagate(&ticker, date).await,
            };
            let (audit, decision) = run.context("Propagation failed")?;
            let output = if trail {
                to_json(&audit, pretty)?
            } else {
                to_json(&decision, pretty)?
            };
            println!("{output}");
        }
        Command::Reflect {
            decision,
            realized_return,
            pretty,
        } => {
            if engine.config().memory_path().is_none() {
                warn!("memory_path is not set; the lesson will not outlive this process");
            }
            let decision = read_decision(&decision)?;
            let report = engine
                .reflect_and_remember(&[tradegraph::models::RealizedOutcome {
                    decision,
                    realized_return,
                }])
                .await
                .context("Reflection failed")?;
            println!("{}", to_json(&report.recorded, pretty)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradegraph::agents::PipelineError;

    #[test]
    fn overrides_apply_on_top_of_defaults() {
        let config = load_config(None, &["max_debate_rounds = 3".to_string()]).unwrap();
        assert_eq!(config.max_debate_rounds(), 3);
        assert!(load_config(None, &["max_debate_rounds".to_string()]).is_err());
    }

    #[test]
    fn pipeline_failure_keeps_its_cause() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        let run: Result<(), PipelineError> = Err(PipelineError::Timeout {
            deadline_ms: 200,
            partial: Box::new(AuditTrail::new("NVDA", date)),
        });
        let err = run.context("Propagation failed").unwrap_err();
        assert!(err.downcast_ref::<PipelineError>().is_some());
        assert_eq!(
            format!("{err:#}"),
            "Propagation failed: Deadline of 200ms exceeded"
        );
    }
}
