use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::process::Command;
use tracing::{debug, warn};
use tradegraph_models::{DataCategory, VendorId};

use crate::error::VendorError;
use crate::vendor::DataVendor;

/// Exit status a fetch command uses to report a transient failure (`EX_TEMPFAIL`).
pub const EXIT_TEMPFAIL: i32 = 75;

/// Vendor backed by an external fetch program.
///
/// The program is invoked as `argv... <category> <ticker> <YYYY-MM-DD>` and
/// must print the vendor's JSON payload on stdout. Exit 0 is success, exit 75
/// is a transient failure, anything else is a rejection.
pub struct CommandVendor {
    id: VendorId,
    argv: Vec<String>,
    timeout: Duration,
}

impl CommandVendor {
    pub fn new(id: VendorId, argv: Vec<String>, timeout: Duration) -> Self {
        Self { id, argv, timeout }
    }
}

#[async_trait]
impl DataVendor for CommandVendor {
    fn id(&self) -> VendorId {
        self.id
    }

    async fn fetch(
        &self,
        ticker: &str,
        date: NaiveDate,
        category: DataCategory,
    ) -> Result<serde_json::Value, VendorError> {
        let (program, args) = self
            .argv
            .split_first()
            .ok_or_else(|| VendorError::rejected(self.id, category, "empty fetch command"))?;
        let date_arg = date.format("%Y-%m-%d").to_string();

        debug!(vendor = %self.id, %category, ticker, program = %program, "Running vendor fetch command");

        let output = tokio::time::timeout(self.timeout, async {
            Command::new(program)
                .args(args)
                .args([category.as_str(), ticker, date_arg.as_str()])
                .kill_on_drop(true)
                .output()
                .await
        })
        .await
        .map_err(|_| {
            VendorError::unavailable(
                self.id,
                category,
                format!("fetch command timed out after {}s", self.timeout.as_secs()),
            )
        })?
        .map_err(|e| {
            VendorError::rejected(self.id, category, format!("failed to spawn {program}: {e}"))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(vendor = %self.id, %category, status = %output.status, stderr = %stderr, "Vendor fetch command failed");
            let reason = format!("{program} exited {}: {}", output.status, stderr.trim());
            return Err(match output.status.code() {
                Some(EXIT_TEMPFAIL) => VendorError::unavailable(self.id, category, reason),
                _ => VendorError::rejected(self.id, category, reason),
            });
        }

        serde_json::from_slice(&output.stdout).map_err(|e| {
            VendorError::rejected(
                self.id,
                category,
                format!("fetch command did not print JSON: {e}"),
            )
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec![
            "sh".to_string(),
            "-c".to_string(),
            script.to_string(),
            "sh".to_string(),
        ]
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 10).unwrap()
    }

    #[tokio::test]
    async fn passes_category_ticker_and_date() {
        let vendor = CommandVendor::new(
            VendorId::YFinance,
            sh(r#"printf '{"category":"%s","ticker":"%s","date":"%s"}' "$1" "$2" "$3""#),
            Duration::from_secs(5),
        );
        let got = vendor
            .fetch("NVDA", date(), DataCategory::CoreStockApis)
            .await
            .unwrap();
        assert_eq!(got["category"], "core_stock_apis");
        assert_eq!(got["ticker"], "NVDA");
        assert_eq!(got["date"], "2024-05-10");
    }

    #[tokio::test]
    async fn tempfail_exit_is_transient() {
        let vendor = CommandVendor::new(VendorId::YFinance, sh("exit 75"), Duration::from_secs(5));
        let err = vendor
            .fetch("NVDA", date(), DataCategory::CoreStockApis)
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn other_exit_is_rejected() {
        let vendor = CommandVendor::new(
            VendorId::YFinance,
            sh("echo 'unknown symbol' >&2; exit 2"),
            Duration::from_secs(5),
        );
        let err = vendor
            .fetch("ZZZZ", date(), DataCategory::CoreStockApis)
            .await
            .unwrap_err();
        assert!(!err.is_transient());
        assert!(err.to_string().contains("unknown symbol"));
    }

    #[tokio::test]
    async fn non_json_stdout_is_rejected() {
        let vendor = CommandVendor::new(VendorId::Google, sh("echo hello"), Duration::from_secs(5));
        let err = vendor
            .fetch("NVDA", date(), DataCategory::NewsData)
            .await
            .unwrap_err();
        assert!(matches!(err, VendorError::Rejected { .. }));
    }

    #[tokio::test]
    async fn timeout_is_transient() {
        let vendor = CommandVendor::new(VendorId::Google, sh("sleep 5"), Duration::from_millis(100));
        let err = vendor
            .fetch("NVDA", date(), DataCategory::NewsData)
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn missing_program_is_rejected() {
        let vendor = CommandVendor::new(
            VendorId::Google,
            vec!["/nonexistent/fetcher".to_string()],
            Duration::from_secs(5),
        );
        let err = vendor
            .fetch("NVDA", date(), DataCategory::NewsData)
            .await
            .unwrap_err();
        assert!(!err.is_transient());
    }
}
