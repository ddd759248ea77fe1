//! Worker-side glue: from "my agent stopped" to "evaluation attempted".

use std::path::Path;
use std::sync::Arc;

use crown_core::{RunId, TaskRun};
use tracing::{info, instrument, warn};

use crate::completion::CompletionDetector;
use crate::coordinator::{EvaluationCoordinator, EvaluationOutcome};
use crate::error::{with_timeout, WorkflowError};
use crate::git::WorkspaceRepo;
use crate::store::{RunCompletion, TaskStore};

/// Exit code reported for an agent that hit the maximum runtime.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// One worker, responsible for a single agent's run.
#[derive(Clone)]
pub struct CrownWorker {
    store: Arc<dyn TaskStore>,
    workspace: Arc<dyn WorkspaceRepo>,
    coordinator: EvaluationCoordinator,
    detector: CompletionDetector,
}

impl CrownWorker {
    pub fn new(
        store: Arc<dyn TaskStore>,
        workspace: Arc<dyn WorkspaceRepo>,
        coordinator: EvaluationCoordinator,
        detector: CompletionDetector,
    ) -> Self {
        Self {
            store,
            workspace,
            coordinator,
            detector,
        }
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    pub fn coordinator(&self) -> &EvaluationCoordinator {
        &self.coordinator
    }

    /// Wait for the agent in `working_dir` to finish, then hand off to
    /// [`on_agent_finished`](Self::on_agent_finished).
    ///
    /// A timed out agent is reported with [`TIMEOUT_EXIT_CODE`], which fails
    /// its run.
    pub async fn watch(&self, run: &TaskRun, working_dir: &Path) -> EvaluationOutcome {
        let handle = self
            .detector
            .start(run.agent_kind(), working_dir, &run.task_id);
        let exit_code = match handle.wait().await {
            Some(event) if !event.is_timeout() => 0,
            Some(event) => {
                warn!(run_id = %run.id, elapsed_ms = event.elapsed_ms(), "Agent timed out");
                TIMEOUT_EXIT_CODE
            }
            None => TIMEOUT_EXIT_CODE,
        };
        self.on_agent_finished(&run.id, working_dir, exit_code).await
    }

    /// Commit and push the agent's work, report the run, then try to
    /// evaluate its task.
    ///
    /// Commit and report failures are logged; evaluation is attempted
    /// regardless, since the coordinator tolerates missing branches and
    /// unfinished runs.
    #[instrument(skip_all, fields(run_id = %run_id, exit_code))]
    pub async fn on_agent_finished(
        &self,
        run_id: &RunId,
        working_dir: &Path,
        exit_code: i32,
    ) -> EvaluationOutcome {
        let timeout = self.coordinator.context().config.store_timeout;
        let run = match with_timeout("get run", timeout, self.store.get_task_run(run_id)).await {
            Ok(run) => run,
            Err(e) => {
                warn!(error = %e, "Could not load run");
                return EvaluationOutcome::Failed(e.to_string());
            }
        };

        let branch_name = self.resolve_branch(&run, working_dir).await;
        if let Some(branch) = &branch_name {
            if let Err(e) = self.save_work(&run, working_dir, branch).await {
                warn!(branch = %branch, error = %e, "Could not push agent work");
            }
        }

        let completion = RunCompletion {
            run_id: run.id.clone(),
            exit_code,
            branch_name,
        };
        let reported = with_timeout(
            "report completion",
            timeout,
            self.store.report_run_completion(completion),
        )
        .await;
        match reported {
            Ok(updated) => info!(status = ?updated.status, "Run completion reported"),
            Err(e) => warn!(error = %e, "Could not report run completion"),
        }

        self.coordinator.evaluate(&run.task_id).await
    }

    /// The run's branch, or the branch checked out in its workspace.
    ///
    /// Resolved before any commit or push so a failed push still reports it;
    /// an unpushed branch only shows up later as unavailable.
    async fn resolve_branch(&self, run: &TaskRun, working_dir: &Path) -> Option<String> {
        if let Some(branch) = &run.branch_name {
            return Some(branch.clone());
        }
        match self.workspace.current_branch(working_dir).await {
            Ok(branch) => Some(branch),
            Err(e) => {
                warn!(error = %e, "Could not determine workspace branch");
                None
            }
        }
    }

    /// Commit everything in the workspace and push it to `branch`.
    async fn save_work(
        &self,
        run: &TaskRun,
        working_dir: &Path,
        branch: &str,
    ) -> Result<(), WorkflowError> {
        let message = format!("{} work for task {}", run.agent_name, run.task_id);
        let committed = self.workspace.commit_all(working_dir, &message).await?;
        self.workspace.push_branch(working_dir, branch).await?;
        info!(branch = %branch, committed, "Agent work pushed");
        Ok(())
    }
}
