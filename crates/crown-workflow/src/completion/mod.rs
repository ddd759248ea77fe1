//! Agent completion detection.
//!
//! Each agent family leaves a different trail on disk when it finishes a
//! turn. [`CompletionStrategy`] picks the right reader for an [`AgentKind`]
//! and [`CompletionDetector`] polls it under a runtime floor and ceiling.

mod artifact;
mod claude;
mod codex;
mod detector;
mod gemini;
mod terminal;

use std::path::Path;

use crown_core::AgentKind;
use tokio::time::Instant;
use tracing::debug;

use crate::config::DetectorConfig;

pub use claude::ClaudeTranscript;
pub use codex::CodexNotify;
pub use detector::{CompletionDetector, DetectorHandle};
pub use gemini::GeminiTelemetry;
pub use terminal::TerminalIdle;

/// The single event a detector emits before stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionEvent {
    TaskComplete { elapsed_ms: u64 },
    TaskTimeout { elapsed_ms: u64 },
}

impl CompletionEvent {
    pub fn elapsed_ms(&self) -> u64 {
        match self {
            Self::TaskComplete { elapsed_ms } | Self::TaskTimeout { elapsed_ms } => *elapsed_ms,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TaskTimeout { .. })
    }
}

/// Result of one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Complete,
    Pending,
}

/// Per-agent completion check.
pub enum CompletionStrategy {
    ClaudeCode(ClaudeTranscript),
    Codex(CodexNotify),
    Gemini(GeminiTelemetry),
    TerminalIdle(TerminalIdle),
    /// Never completes; the detector's timeout decides.
    Unsupported,
}

impl CompletionStrategy {
    /// Pick the strategy for an agent running in `working_dir`.
    ///
    /// The terminal-idle heuristic only applies to agents without a
    /// structured artifact, so a single turn never triggers twice.
    pub fn for_agent(kind: AgentKind, working_dir: &Path, config: &DetectorConfig) -> Self {
        match kind {
            AgentKind::ClaudeCode => Self::ClaudeCode(ClaudeTranscript::new(
                config.claude_projects_dir.as_deref(),
                working_dir,
                config.quiet_period,
            )),
            AgentKind::Codex => Self::Codex(CodexNotify::new(working_dir)),
            AgentKind::Gemini => {
                Self::Gemini(GeminiTelemetry::new(working_dir, config.quiet_period))
            }
            // A structured agent without its own strategy never falls back to
            // terminal idleness.
            AgentKind::Unknown => Self::Unsupported,
            other if other.has_structured_artifact() => Self::Unsupported,
            _ => Self::TerminalIdle(TerminalIdle::new(
                working_dir,
                config.terminal_idle_threshold,
            )),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ClaudeCode(_) => "claude_transcript",
            Self::Codex(_) => "codex_notify",
            Self::Gemini(_) => "gemini_telemetry",
            Self::TerminalIdle(_) => "terminal_idle",
            Self::Unsupported => "unsupported",
        }
    }

    /// Check the artifact. Read failures (missing file, I/O errors) mean
    /// "not yet"; the detector simply polls again on the next tick.
    pub async fn poll(&mut self, now: Instant) -> PollOutcome {
        let result = match self {
            Self::ClaudeCode(s) => s.poll(now).await,
            Self::Codex(s) => s.poll(now).await,
            Self::Gemini(s) => s.poll(now).await,
            Self::TerminalIdle(s) => s.poll(now).await,
            Self::Unsupported => Ok(false),
        };
        match result {
            Ok(true) => PollOutcome::Complete,
            Ok(false) => PollOutcome::Pending,
            Err(e) => {
                debug!(strategy = self.name(), error = %e, "Completion artifact not readable yet");
                PollOutcome::Pending
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_by_kind() {
        let config = DetectorConfig::default();
        let dir = Path::new("/workspace");

        let name = |kind| CompletionStrategy::for_agent(kind, dir, &config).name();
        assert_eq!(name(AgentKind::ClaudeCode), "claude_transcript");
        assert_eq!(name(AgentKind::Codex), "codex_notify");
        assert_eq!(name(AgentKind::Gemini), "gemini_telemetry");
        assert_eq!(name(AgentKind::Opencode), "terminal_idle");
        assert_eq!(name(AgentKind::Unknown), "unsupported");
    }

    #[test]
    fn test_only_unstructured_agents_use_terminal_idle() {
        let config = DetectorConfig::default();
        let dir = Path::new("/workspace");

        for kind in [
            AgentKind::ClaudeCode,
            AgentKind::Codex,
            AgentKind::Gemini,
            AgentKind::Amp,
            AgentKind::Opencode,
            AgentKind::Cursor,
            AgentKind::Qwen,
        ] {
            let idle = CompletionStrategy::for_agent(kind, dir, &config).name() == "terminal_idle";
            assert_eq!(idle, !kind.has_structured_artifact(), "{kind:?}");
        }
    }

    #[tokio::test]
    async fn test_read_errors_are_pending() {
        let config = DetectorConfig::default();
        let mut strategy =
            CompletionStrategy::for_agent(AgentKind::Codex, Path::new("/nonexistent"), &config);
        assert_eq!(strategy.poll(Instant::now()).await, PollOutcome::Pending);
    }
}
