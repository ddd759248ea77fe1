//! Task store: the only shared state between workers.
//!
//! Workers coordinate exclusively through the store's evaluation lock and
//! the eventual [`CrownEvaluation`]. Both adapters honor the same contract:
//! `begin_evaluation` is a compare-and-set, and `commit_crown_evaluation`
//! writes at most one evaluation per task.

mod http;
mod memory;

use async_trait::async_trait;
use crown_core::{CrownCommit, CrownEvaluation, EvaluationStatus, RunId, Task, TaskId, TaskRun};
use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;

pub use http::HttpTaskStore;
pub use memory::InMemoryTaskStore;

/// Result of a finalize commit.
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    /// This call wrote the evaluation.
    Committed(CrownEvaluation),
    /// An evaluation already existed; it is returned unchanged.
    AlreadyEvaluated(CrownEvaluation),
}

impl CommitOutcome {
    pub fn evaluation(&self) -> &CrownEvaluation {
        match self {
            Self::Committed(e) | Self::AlreadyEvaluated(e) => e,
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed(_))
    }
}

/// A worker's report that its agent has exited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCompletion {
    pub run_id: RunId,
    pub exit_code: i32,
    /// Branch the agent's work was pushed to, if known.
    #[serde(default)]
    pub branch_name: Option<String>,
}

/// Persistence for tasks, runs and crown evaluations.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Take the task's evaluation lock if nobody holds it.
    ///
    /// Returns true for exactly one caller per task until the lock is
    /// released.
    async fn begin_evaluation(&self, task_id: &TaskId) -> Result<bool, WorkflowError>;

    /// Give the lock back after a deferred attempt so a later trigger can
    /// retry. Finished or failed attempts keep it.
    async fn release_evaluation(&self, task_id: &TaskId) -> Result<(), WorkflowError>;

    async fn get_task(&self, task_id: &TaskId) -> Result<Task, WorkflowError>;

    /// All runs of a task, in creation order.
    async fn get_task_runs(&self, task_id: &TaskId) -> Result<Vec<TaskRun>, WorkflowError>;

    async fn get_task_run(&self, run_id: &RunId) -> Result<TaskRun, WorkflowError>;

    async fn get_crown_evaluation(
        &self,
        task_id: &TaskId,
    ) -> Result<Option<CrownEvaluation>, WorkflowError>;

    /// Atomically record the evaluation, crown the winner and clear the
    /// task's progress marker.
    async fn commit_crown_evaluation(
        &self,
        commit: CrownCommit,
    ) -> Result<CommitOutcome, WorkflowError>;

    async fn set_task_evaluation_status(
        &self,
        task_id: &TaskId,
        status: EvaluationStatus,
    ) -> Result<(), WorkflowError>;

    /// Mark a run completed or failed from its agent's exit code.
    async fn report_run_completion(
        &self,
        completion: RunCompletion,
    ) -> Result<TaskRun, WorkflowError>;
}
