//! Post-finalize side effects.
//!
//! Hooks run after the crown is committed. A failing hook is logged and
//! never affects the stored evaluation.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use crown_core::{CrownEvaluation, TaskId};
use tokio::process::Command;
use tracing::debug;

use crate::error::WorkflowError;

/// What a hook learns about a finalized task.
#[derive(Debug, Clone)]
pub struct CrownFinalized {
    pub task_id: TaskId,
    pub evaluation: CrownEvaluation,
    pub winner_agent: String,
    pub winner_branch: Option<String>,
}

/// Side effect triggered by a successful commit.
#[async_trait]
pub trait FinalizeHook: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn on_finalized(&self, event: &CrownFinalized) -> Result<(), WorkflowError>;
}

/// Runs an operator-configured command.
///
/// The command sees `CROWN_TASK_ID`, `CROWN_WINNER_RUN_ID`,
/// `CROWN_WINNER_AGENT` and `CROWN_WINNER_BRANCH` in its environment. A
/// typical use is scheduling the losing containers for shutdown.
#[derive(Debug, Clone)]
pub struct CommandHook {
    program: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
}

impl CommandHook {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
        }
    }

    /// Run through `sh -c`.
    pub fn shell(script: impl Into<String>) -> Self {
        Self::new("sh").with_args(["-c".to_string(), script.into()])
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.args.extend(args);
        self
    }

    pub fn with_current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }
}

#[async_trait]
impl FinalizeHook for CommandHook {
    fn name(&self) -> &str {
        &self.program
    }

    async fn on_finalized(&self, event: &CrownFinalized) -> Result<(), WorkflowError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .env("CROWN_TASK_ID", event.task_id.as_str())
            .env("CROWN_WINNER_RUN_ID", event.evaluation.winner_run_id.as_str())
            .env("CROWN_WINNER_AGENT", &event.winner_agent)
            .env(
                "CROWN_WINNER_BRANCH",
                event.winner_branch.as_deref().unwrap_or_default(),
            )
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }

        let output = cmd.output().await?;
        debug!(program = %self.program, status = %output.status, "Finalize hook exited");
        if !output.status.success() {
            return Err(WorkflowError::Hook {
                name: self.program.clone(),
                message: format!(
                    "exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(())
    }
}
