use std::time::Duration;

use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};
use triad_models::TokenUsage;

use crate::error::AgentError;

/// Configuration for a Claude CLI invocation.
#[derive(Debug, Clone)]
pub struct ClaudeCliConfig {
    pub model: String,
    pub timeout: Duration,
}

impl Default for ClaudeCliConfig {
    fn default() -> Self {
        Self {
            model: "claude-3-5-haiku-latest".to_string(),
            timeout: Duration::from_secs(90),
        }
    }
}

/// One model completion with usage accounting.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub model: String,
    pub usage: TokenUsage,
}

/// JSON envelope emitted by `claude --output-format json`.
#[derive(Debug, Deserialize)]
struct CliEnvelope {
    result: String,
    #[serde(default)]
    is_error: bool,
    #[serde(default)]
    usage: CliUsage,
}

#[derive(Debug, Default, Deserialize)]
struct CliUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

/// Invoke the `claude` CLI with a system prompt and user prompt.
///
/// Uses the JSON output format so the envelope carries token usage; the
/// returned `Completion::text` is the model's text, which for our agents is
/// expected to contain a JSON object (see `parser::extract_json`).
pub async fn invoke_claude(
    system_prompt: &str,
    user_prompt: &str,
    config: &ClaudeCliConfig,
) -> Result<Completion, AgentError> {
    debug!(model = %config.model, "Invoking claude CLI");

    let result = tokio::time::timeout(config.timeout, async {
        Command::new("claude")
            .args([
                "-p",
                user_prompt,
                "--system-prompt",
                system_prompt,
                "--model",
                &config.model,
                "--output-format",
                "json",
            ])
            .output()
            .await
    })
    .await
    .map_err(|_| AgentError::Timeout(config.timeout.as_secs()))?
    .map_err(|e| AgentError::Cli(format!("Failed to spawn claude: {e}")))?;

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        warn!(status = %result.status, stderr = %stderr, "Claude CLI failed");
        return Err(AgentError::Cli(format!(
            "claude exited {}: {}",
            result.status, stderr
        )));
    }

    let stdout = String::from_utf8_lossy(&result.stdout).to_string();
    if stdout.trim().is_empty() {
        return Err(AgentError::Cli(
            "Claude returned empty response".to_string(),
        ));
    }

    let envelope: CliEnvelope = serde_json::from_str(stdout.trim())
        .map_err(|e| AgentError::Cli(format!("Unparseable CLI envelope: {e}")))?;

    if envelope.is_error {
        return Err(AgentError::Cli(envelope.result));
    }

    Ok(Completion {
        text: envelope.result,
        model: config.model.clone(),
        usage: TokenUsage::new(envelope.usage.input_tokens, envelope.usage.output_tokens),
    })
}

/// Check if the `claude` CLI is available on the system.
pub async fn check_cli_available() -> bool {
    match Command::new("claude").arg("--version").output().await {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}
