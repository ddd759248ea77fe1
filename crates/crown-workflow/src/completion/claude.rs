//! Claude Code transcript strategy.
//!
//! Claude Code appends every message of a session to
//! `<projects_dir>/<sanitized cwd>/<session>.jsonl`. A turn is over when the
//! last assistant message stopped with `end_turn` (or a `result` record was
//! written) and the transcript has been quiet for a while.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

use super::artifact::{newest_jsonl, str_at, JsonTail};

pub struct ClaudeTranscript {
    project_dir: Option<PathBuf>,
    quiet_period: Duration,
    tail: Option<JsonTail>,
    turn_ended: bool,
}

impl ClaudeTranscript {
    pub fn new(projects_dir: Option<&Path>, working_dir: &Path, quiet_period: Duration) -> Self {
        Self {
            project_dir: projects_dir.map(|dir| dir.join(project_dir_name(working_dir))),
            quiet_period,
            tail: None,
            turn_ended: false,
        }
    }

    pub async fn poll(&mut self, now: Instant) -> std::io::Result<bool> {
        let Some(project_dir) = &self.project_dir else {
            return Ok(false);
        };
        let Some(newest) = newest_jsonl(project_dir).await? else {
            return Ok(false);
        };

        if self.tail.as_ref().map(JsonTail::path) != Some(newest.as_path()) {
            debug!(transcript = %newest.display(), "Following Claude transcript");
            self.tail = Some(JsonTail::new(newest));
            self.turn_ended = false;
        }
        let Some(tail) = self.tail.as_mut() else {
            return Ok(false);
        };

        for record in tail.read_new(now).await? {
            if let Some(ended) = turn_state(&record) {
                self.turn_ended = ended;
            }
        }

        let quiet = tail.quiet_for(now).unwrap_or_default();
        Ok(self.turn_ended && quiet >= self.quiet_period)
    }
}

/// `Some(true)` for a record that ends the turn, `Some(false)` for one that
/// shows the agent is still active, `None` for bookkeeping records.
fn turn_state(record: &Value) -> Option<bool> {
    match str_at(record, &["type"])? {
        "assistant" => Some(str_at(record, &["message", "stop_reason"]) == Some("end_turn")),
        "user" => Some(false),
        "result" => Some(true),
        _ => None,
    }
}

/// Claude Code names project directories after the working directory with
/// every character other than ASCII alphanumerics and `-` replaced by `-`.
pub fn project_dir_name(working_dir: &Path) -> String {
    working_dir
        .to_string_lossy()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect()
}
