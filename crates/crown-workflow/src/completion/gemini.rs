//! Gemini CLI telemetry strategy.
//!
//! Gemini CLI exports telemetry records to
//! `<working_dir>/.crown/gemini-telemetry.jsonl`. After each model response it
//! logs a `gemini_cli.next_speaker_check`; a result of `user` means the model
//! handed control back, i.e. the turn is over.

use std::path::Path;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use super::artifact::{str_at, JsonTail};

const NEXT_SPEAKER_CHECK: &str = "gemini_cli.next_speaker_check";

pub struct GeminiTelemetry {
    tail: JsonTail,
    quiet_period: Duration,
    turn_ended: bool,
}

impl GeminiTelemetry {
    pub fn new(working_dir: &Path, quiet_period: Duration) -> Self {
        Self {
            tail: JsonTail::new(working_dir.join(".crown").join("gemini-telemetry.jsonl")),
            quiet_period,
            turn_ended: false,
        }
    }

    pub async fn poll(&mut self, now: Instant) -> std::io::Result<bool> {
        for record in self.tail.read_new(now).await? {
            if let Some(name) = event_name(&record) {
                self.turn_ended =
                    name == NEXT_SPEAKER_CHECK && attribute(&record, "result") == Some("user");
            }
        }
        let quiet = self.tail.quiet_for(now).unwrap_or_default();
        Ok(self.turn_ended && quiet >= self.quiet_period)
    }
}

/// Telemetry records carry their fields either at the top level or under
/// `attributes`, depending on the exporter.
fn attribute<'a>(record: &'a Value, key: &str) -> Option<&'a str> {
    str_at(record, &["attributes", key]).or_else(|| str_at(record, &[key]))
}

fn event_name(record: &Value) -> Option<&str> {
    attribute(record, "event.name")
}
