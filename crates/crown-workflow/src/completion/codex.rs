//! Codex notification strategy.
//!
//! Codex runs a `notify` hook at the end of every agent turn; the workspace
//! configures that hook to append the notification JSON to
//! `<working_dir>/.crown/codex-notify.jsonl`. The notification is explicit,
//! so no quiet period is applied.

use std::path::Path;

use tokio::time::Instant;

use super::artifact::{str_at, JsonTail};

/// Notification type written when a turn completes.
pub const TURN_COMPLETE: &str = "agent-turn-complete";

pub struct CodexNotify {
    tail: JsonTail,
    seen: bool,
}

impl CodexNotify {
    pub fn new(working_dir: &Path) -> Self {
        Self {
            tail: JsonTail::new(working_dir.join(".crown").join("codex-notify.jsonl")),
            seen: false,
        }
    }

    pub async fn poll(&mut self, now: Instant) -> std::io::Result<bool> {
        if self.seen {
            return Ok(true);
        }
        let records = self.tail.read_new(now).await?;
        self.seen = records
            .iter()
            .any(|r| str_at(r, &["type"]) == Some(TURN_COMPLETE));
        Ok(self.seen)
    }
}
