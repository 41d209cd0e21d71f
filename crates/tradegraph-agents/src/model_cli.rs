use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};
use tradegraph_models::{Configuration, LlmProvider};

use crate::error::AgentError;

/// Environment variables handed to the model program so one wrapper script
/// can route to any provider.
pub const PROVIDER_ENV: &str = "TRADEGRAPH_PROVIDER";
pub const BACKEND_URL_ENV: &str = "TRADEGRAPH_BACKEND_URL";

/// A text-completion backend. Mockable for testing.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn complete(
        &self,
        model: &str,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, AgentError>;
}

/// Configuration for a model CLI invocation.
#[derive(Debug, Clone)]
pub struct ModelCliConfig {
    pub program: String,
    pub provider: LlmProvider,
    pub backend_url: Option<String>,
    pub timeout: Duration,
}

impl Default for ModelCliConfig {
    fn default() -> Self {
        Self {
            program: "claude".to_string(),
            provider: LlmProvider::OpenAi,
            backend_url: None,
            timeout: Duration::from_secs(120),
        }
    }
}

impl ModelCliConfig {
    pub fn from_config(config: &Configuration) -> Self {
        Self {
            program: config.llm_command().to_string(),
            provider: config.llm_provider(),
            backend_url: config.backend_url().map(str::to_string),
            timeout: config.model_timeout(),
        }
    }
}

/// Invoke the model CLI with a system prompt and user prompt.
/// The user prompt is written to stdin; it carries the whole role context
/// and can exceed the per-argument limit of the OS. Returns the raw stdout text.
pub async fn invoke_model(
    model: &str,
    system_prompt: &str,
    user_prompt: &str,
    config: &ModelCliConfig,
) -> Result<String, AgentError> {
    debug!(
        program = %config.program,
        provider = %config.provider,
        model,
        prompt_bytes = user_prompt.len(),
        "Invoking model CLI"
    );

    let mut command = Command::new(&config.program);
    command
        .args([
            "-p",
            "--system-prompt",
            system_prompt,
            "--model",
            model,
            "--output-format",
            "text",
        ])
        .env(PROVIDER_ENV, config.provider.as_str())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(url) = &config.backend_url {
        command.env(BACKEND_URL_ENV, url);
    }

    let mut child = command
        .spawn()
        .map_err(|e| AgentError::Backend(format!("Failed to spawn {}: {e}", config.program)))?;
    let stdin = child.stdin.take();
    let feed = async move {
        let Some(mut stdin) = stdin else {
            return Ok::<(), std::io::Error>(());
        };
        stdin.write_all(user_prompt.as_bytes()).await?;
        stdin.shutdown().await
    };

    let (fed, result) = tokio::time::timeout(config.timeout, async {
        tokio::join!(feed, child.wait_with_output())
    })
    .await
    .map_err(|_| AgentError::Timeout(config.timeout.as_secs()))?;

    let result = result
        .map_err(|e| AgentError::Backend(format!("Failed to run {}: {e}", config.program)))?;
    match fed {
        // A program that exits without reading its prompt is judged by its exit status.
        Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
        Err(e) => {
            return Err(AgentError::Backend(format!(
                "Failed to write prompt to {}: {e}",
                config.program
            )))
        }
        Ok(()) => {}
    }

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        warn!(status = %result.status, stderr = %stderr, "Model CLI failed");
        return Err(AgentError::Backend(format!(
            "{} exited {}: {}",
            config.program, result.status, stderr
        )));
    }

    let stdout = String::from_utf8_lossy(&result.stdout).to_string();
    if stdout.trim().is_empty() {
        return Err(AgentError::Backend("Model returned empty response".to_string()));
    }

    Ok(stdout)
}

/// Check if the model program is available on the system.
pub async fn check_cli_available(program: &str) -> bool {
    match Command::new(program).arg("--version").output().await {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

/// [`ModelBackend`] that shells out to the configured model program.
pub struct CliModelBackend {
    config: ModelCliConfig,
}

impl CliModelBackend {
    pub fn new(config: ModelCliConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ModelCliConfig {
        &self.config
    }
}

#[async_trait]
impl ModelBackend for CliModelBackend {
    async fn complete(
        &self,
        model: &str,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, AgentError> {
        invoke_model(model, system_prompt, user_prompt, &self.config).await
    }
}
