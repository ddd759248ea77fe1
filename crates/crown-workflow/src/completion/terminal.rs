//! Terminal-idle fallback for agents without a structured artifact.
//!
//! The workspace tees the agent's terminal output into
//! `<working_dir>/.crown/terminal.log`. An agent whose output has not changed
//! for the idle threshold is assumed to be waiting for input.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::Instant;

pub struct TerminalIdle {
    path: PathBuf,
    threshold: Duration,
    last_len: Option<u64>,
    changed_at: Option<Instant>,
}

impl TerminalIdle {
    pub fn new(working_dir: &Path, threshold: Duration) -> Self {
        Self {
            path: working_dir.join(".crown").join("terminal.log"),
            threshold,
            last_len: None,
            changed_at: None,
        }
    }

    pub async fn poll(&mut self, now: Instant) -> std::io::Result<bool> {
        let len = tokio::fs::metadata(&self.path).await?.len();
        if self.last_len != Some(len) {
            self.last_len = Some(len);
            self.changed_at = Some(now);
            return Ok(false);
        }
        let idle = self
            .changed_at
            .map(|at| now.saturating_duration_since(at))
            .unwrap_or_default();
        Ok(len > 0 && idle >= self.threshold)
    }
}
