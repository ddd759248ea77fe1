//! Polling loop around a completion strategy.

use std::path::Path;

use crown_core::{AgentKind, TaskId};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{CompletionEvent, CompletionStrategy, PollOutcome};
use crate::config::DetectorConfig;

/// Starts completion detectors.
#[derive(Debug, Clone)]
pub struct CompletionDetector {
    config: DetectorConfig,
}

/// A running detector.
pub struct DetectorHandle {
    events: oneshot::Receiver<CompletionEvent>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl DetectorHandle {
    /// Wait for the detector's outcome. `None` if it was stopped first.
    pub async fn wait(self) -> Option<CompletionEvent> {
        let event = self.events.await.ok();
        let _ = self.task.await;
        event
    }

    /// Stop polling without emitting an event.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl CompletionDetector {
    /// Create a new detector factory.
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    /// Start watching an agent of `kind` working in `working_dir`.
    pub fn start(&self, kind: AgentKind, working_dir: &Path, task_id: &TaskId) -> DetectorHandle {
        let strategy = CompletionStrategy::for_agent(kind, working_dir, &self.config);
        info!(
            task_id = %task_id,
            agent_kind = ?kind,
            strategy = strategy.name(),
            working_dir = %working_dir.display(),
            "Starting completion detector"
        );
        self.start_with(strategy, task_id.clone())
    }

    /// Start watching with an explicit strategy.
    pub fn start_with(&self, strategy: CompletionStrategy, task_id: TaskId) -> DetectorHandle {
        let (tx, rx) = oneshot::channel();
        let cancel = CancellationToken::new();
        let config = self.config.clone();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            if let Some(event) = run(&config, strategy, &task_id, &token).await {
                if tx.send(event).is_err() {
                    debug!(task_id = %task_id, "Completion event dropped, nobody waiting");
                }
            }
        });

        DetectorHandle {
            events: rx,
            cancel,
            task,
        }
    }
}

/// Poll until the strategy reports completion, the maximum runtime elapses,
/// or the token is cancelled.
///
/// Completion is never reported before `min_runtime`; an outcome is always
/// reported by `max_runtime`.
async fn run(
    config: &DetectorConfig,
    mut strategy: CompletionStrategy,
    task_id: &TaskId,
    cancel: &CancellationToken,
) -> Option<CompletionEvent> {
    let started = Instant::now();
    let deadline = started + config.max_runtime;
    let timeout = |at: Instant| CompletionEvent::TaskTimeout {
        elapsed_ms: at.duration_since(started).as_millis() as u64,
    };

    let mut ticker = tokio::time::interval(config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(task_id = %task_id, "Completion detector stopped");
                return None;
            }
            _ = tokio::time::sleep_until(deadline) => {
                warn!(task_id = %task_id, "Agent exceeded maximum runtime");
                return Some(timeout(Instant::now()));
            }
            _ = ticker.tick() => {}
        }

        let now = Instant::now();
        let elapsed = now.duration_since(started);
        if elapsed >= config.max_runtime {
            warn!(task_id = %task_id, "Agent exceeded maximum runtime");
            return Some(timeout(now));
        }
        if elapsed < config.min_runtime {
            continue;
        }

        match tokio::time::timeout_at(deadline, strategy.poll(now)).await {
            Ok(PollOutcome::Complete) => {
                let elapsed_ms = Instant::now().duration_since(started).as_millis() as u64;
                info!(
                    task_id = %task_id,
                    elapsed_ms,
                    strategy = strategy.name(),
                    "Agent turn complete"
                );
                return Some(CompletionEvent::TaskComplete { elapsed_ms });
            }
            Ok(PollOutcome::Pending) => {}
            Err(_) => {
                warn!(task_id = %task_id, "Agent exceeded maximum runtime");
                return Some(timeout(Instant::now()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config() -> DetectorConfig {
        DetectorConfig {
            poll_interval: Duration::from_secs(5),
            min_runtime: Duration::from_secs(30),
            max_runtime: Duration::from_secs(120),
            ..DetectorConfig::default()
        }
    }

    fn finished_codex_workspace() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".crown")).unwrap();
        std::fs::write(
            dir.path().join(".crown/codex-notify.jsonl"),
            "{\"type\":\"agent-turn-complete\"}\n",
        )
        .unwrap();
        dir
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_respects_min_runtime() {
        let dir = finished_codex_workspace();
        let detector = CompletionDetector::new(config());

        let handle = detector.start(AgentKind::Codex, dir.path(), &TaskId::new("t1"));
        let event = handle.wait().await.unwrap();

        assert_eq!(event, CompletionEvent::TaskComplete { elapsed_ms: 30_000 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_agent_times_out_at_max_runtime() {
        let detector = CompletionDetector::new(config());

        let handle = detector.start(AgentKind::Unknown, Path::new("/nowhere"), &TaskId::new("t1"));
        let event = handle.wait().await.unwrap();

        assert_eq!(event, CompletionEvent::TaskTimeout { elapsed_ms: 120_000 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_when_max_is_not_a_tick_multiple() {
        let detector = CompletionDetector::new(DetectorConfig {
            max_runtime: Duration::from_secs(33),
            ..config()
        });

        let handle = detector.start_with(CompletionStrategy::Unsupported, TaskId::new("t1"));
        let event = handle.wait().await.unwrap();

        assert!(event.is_timeout());
        assert_eq!(event.elapsed_ms(), 33_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_emits_nothing() {
        let detector = CompletionDetector::new(config());
        let handle = detector.start_with(CompletionStrategy::Unsupported, TaskId::new("t1"));

        tokio::time::sleep(Duration::from_secs(10)).await;
        handle.stop();

        assert_eq!(handle.wait().await, None);
    }
}
