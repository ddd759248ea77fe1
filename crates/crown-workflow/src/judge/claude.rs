//! Judge backed by the Claude Code CLI in one-shot mode.

use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{Judge, RawVerdict};
use crate::error::WorkflowError;

/// Envelope printed by `claude --print --output-format json`.
#[derive(Debug, Deserialize)]
struct CliResult {
    #[serde(default)]
    result: String,
    #[serde(default)]
    is_error: bool,
}

/// Runs `claude --print --output-format json` with the prompt on stdin.
#[derive(Debug, Clone)]
pub struct ClaudeCliJudge {
    /// Path to the Claude CLI executable.
    claude_path: String,

    /// Model to use (optional).
    model: Option<String>,
}

impl ClaudeCliJudge {
    /// Create a judge using the CLI at `claude_path` ("claude" for PATH lookup).
    pub fn new(claude_path: impl Into<String>) -> Self {
        Self {
            claude_path: claude_path.into(),
            model: None,
        }
    }

    /// Set the model to use.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.claude_path);
        cmd.arg("--print").arg("--output-format").arg("json");
        if let Some(model) = &self.model {
            cmd.arg("--model").arg(model);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Run one prompt and return the model's result text.
    async fn complete(&self, prompt: &str) -> Result<String, WorkflowError> {
        debug!(claude_path = %self.claude_path, prompt_len = prompt.len(), "Invoking judge");

        let mut child = self.command().spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(prompt.as_bytes()).await?;
        }
        let output = child.wait_with_output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(WorkflowError::Judge(format!(
                "claude exited with code {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        let envelope: CliResult = serde_json::from_slice(&output.stdout)?;
        if envelope.is_error {
            return Err(WorkflowError::Judge(envelope.result));
        }
        Ok(envelope.result)
    }
}

impl Default for ClaudeCliJudge {
    fn default() -> Self {
        Self::new("claude")
    }
}

/// First JSON object embedded in free text, e.g. inside a fenced block.
fn first_json_object(text: &str) -> Option<Value> {
    text.match_indices('{').find_map(|(start, _)| {
        serde_json::Deserializer::from_str(&text[start..])
            .into_iter::<Value>()
            .next()
            .and_then(Result::ok)
            .filter(Value::is_object)
    })
}

#[async_trait]
impl Judge for ClaudeCliJudge {
    async fn evaluate(&self, prompt: &str) -> Result<RawVerdict, WorkflowError> {
        let response = self.complete(prompt).await?;
        let object = first_json_object(&response).ok_or_else(|| {
            warn!(response_len = response.len(), "Judge response contained no JSON object");
            WorkflowError::Judge("response contained no JSON object".to_string())
        })?;

        let mut verdict: RawVerdict = serde_json::from_value(object)?;
        verdict.raw_response = response;
        info!(winner = %verdict.winner_index, "Judge responded");
        Ok(verdict)
    }

    async fn summarize(&self, prompt: &str) -> Result<String, WorkflowError> {
        let summary = self.complete(prompt).await?.trim().to_string();
        if summary.is_empty() {
            return Err(WorkflowError::Judge("empty summary".to_string()));
        }
        Ok(summary)
    }
}
