//! In-process task store.
//!
//! Used by tests and by single-host deployments where every worker shares
//! one process.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use crown_core::{
    CoreError, CrownCommit, CrownEvaluation, EvaluationStatus, RunId, Task, TaskId, TaskRun,
};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{CommitOutcome, RunCompletion, TaskStore};
use crate::error::WorkflowError;

#[derive(Default)]
struct StoreState {
    tasks: HashMap<TaskId, Task>,
    /// Runs in insertion order.
    runs: Vec<TaskRun>,
    locks: HashSet<TaskId>,
    evaluations: HashMap<TaskId, CrownEvaluation>,
}

impl StoreState {
    fn run_mut(&mut self, run_id: &RunId) -> Result<&mut TaskRun, CoreError> {
        self.runs
            .iter_mut()
            .find(|r| &r.id == run_id)
            .ok_or_else(|| CoreError::RunNotFound(run_id.to_string()))
    }

    fn task_mut(&mut self, task_id: &TaskId) -> Result<&mut Task, CoreError> {
        self.tasks
            .get_mut(task_id)
            .ok_or_else(|| CoreError::TaskNotFound(task_id.to_string()))
    }
}

/// Task store kept in memory behind a single lock, so every operation is
/// atomic with respect to the others.
#[derive(Default)]
pub struct InMemoryTaskStore {
    state: RwLock<StoreState>,
}

impl InMemoryTaskStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a task.
    pub async fn insert_task(&self, task: Task) {
        self.state.write().await.tasks.insert(task.id.clone(), task);
    }

    /// Add a run, or replace the run with the same id in place.
    pub async fn insert_run(&self, run: TaskRun) {
        let mut state = self.state.write().await;
        match state.runs.iter_mut().find(|r| r.id == run.id) {
            Some(existing) => *existing = run,
            None => state.runs.push(run),
        }
    }

    /// Whether some worker holds the task's evaluation lock.
    pub async fn is_locked(&self, task_id: &TaskId) -> bool {
        self.state.read().await.locks.contains(task_id)
    }

    /// Number of stored evaluations.
    pub async fn evaluation_count(&self) -> usize {
        self.state.read().await.evaluations.len()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn begin_evaluation(&self, task_id: &TaskId) -> Result<bool, WorkflowError> {
        let granted = self.state.write().await.locks.insert(task_id.clone());
        debug!(task_id = %task_id, granted, "Evaluation lock requested");
        Ok(granted)
    }

    async fn release_evaluation(&self, task_id: &TaskId) -> Result<(), WorkflowError> {
        self.state.write().await.locks.remove(task_id);
        debug!(task_id = %task_id, "Evaluation lock released");
        Ok(())
    }

    async fn get_task(&self, task_id: &TaskId) -> Result<Task, WorkflowError> {
        self.state
            .read()
            .await
            .tasks
            .get(task_id)
            .cloned()
            .ok_or_else(|| CoreError::TaskNotFound(task_id.to_string()).into())
    }

    async fn get_task_runs(&self, task_id: &TaskId) -> Result<Vec<TaskRun>, WorkflowError> {
        let state = self.state.read().await;
        if !state.tasks.contains_key(task_id) {
            return Err(CoreError::TaskNotFound(task_id.to_string()).into());
        }
        Ok(state
            .runs
            .iter()
            .filter(|r| &r.task_id == task_id)
            .cloned()
            .collect())
    }

    async fn get_task_run(&self, run_id: &RunId) -> Result<TaskRun, WorkflowError> {
        self.state
            .read()
            .await
            .runs
            .iter()
            .find(|r| &r.id == run_id)
            .cloned()
            .ok_or_else(|| CoreError::RunNotFound(run_id.to_string()).into())
    }

    async fn get_crown_evaluation(
        &self,
        task_id: &TaskId,
    ) -> Result<Option<CrownEvaluation>, WorkflowError> {
        Ok(self.state.read().await.evaluations.get(task_id).cloned())
    }

    async fn commit_crown_evaluation(
        &self,
        commit: CrownCommit,
    ) -> Result<CommitOutcome, WorkflowError> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.evaluations.get(&commit.task_id) {
            return Ok(CommitOutcome::AlreadyEvaluated(existing.clone()));
        }

        commit.validate()?;
        let task_id = commit.task_id.clone();
        let winner = state.run_mut(&commit.winner_run_id)?;
        if winner.task_id != task_id {
            return Err(CoreError::ForeignRun {
                run: winner.id.to_string(),
                task: task_id.to_string(),
            }
            .into());
        }
        winner.is_crowned = true;
        state.task_mut(&task_id)?.evaluation_status = EvaluationStatus::NotStarted;

        let evaluation = commit.into_evaluation(Utc::now());
        state.evaluations.insert(task_id.clone(), evaluation.clone());
        info!(
            task_id = %task_id,
            winner_run_id = %evaluation.winner_run_id,
            "Crown evaluation stored"
        );
        Ok(CommitOutcome::Committed(evaluation))
    }

    async fn set_task_evaluation_status(
        &self,
        task_id: &TaskId,
        status: EvaluationStatus,
    ) -> Result<(), WorkflowError> {
        self.state.write().await.task_mut(task_id)?.evaluation_status = status;
        Ok(())
    }

    async fn report_run_completion(
        &self,
        completion: RunCompletion,
    ) -> Result<TaskRun, WorkflowError> {
        let mut state = self.state.write().await;
        let run = state.run_mut(&completion.run_id)?;
        run.finish(completion.exit_code)?;
        if let Some(branch) = completion.branch_name {
            run.branch_name = Some(branch);
        }
        Ok(run.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crown_core::{EvaluationAudit, RunStatus};
    use std::sync::Arc;

    async fn seeded() -> (InMemoryTaskStore, TaskId) {
        let store = InMemoryTaskStore::new();
        let task_id = TaskId::new("t1");
        store.insert_task(Task::new("x", "main").with_id(task_id.clone())).await;
        for (id, branch) in [("r1", "a/t1"), ("r2", "b/t1")] {
            store
                .insert_run(
                    TaskRun::new(task_id.clone(), "amp")
                        .with_id(RunId::new(id))
                        .with_branch(branch),
                )
                .await;
        }
        (store, task_id)
    }

    fn commit(winner: &str) -> CrownCommit {
        CrownCommit {
            task_id: TaskId::new("t1"),
            winner_run_id: RunId::new(winner),
            reason: "b has tests".to_string(),
            candidate_run_ids: vec![RunId::new("r1"), RunId::new("r2")],
            audit: EvaluationAudit::default(),
            summary: None,
            pull_request: None,
        }
    }

    #[tokio::test]
    async fn test_begin_evaluation_grants_once() {
        let (store, task_id) = seeded().await;
        let store = Arc::new(store);

        let attempts = (0..8).map(|_| {
            let store = store.clone();
            let task_id = task_id.clone();
            tokio::spawn(async move { store.begin_evaluation(&task_id).await.unwrap() })
        });
        let granted = futures_util::future::join_all(attempts)
            .await
            .into_iter()
            .filter(|r| *r.as_ref().unwrap())
            .count();

        assert_eq!(granted, 1);
        assert!(store.is_locked(&task_id).await);

        store.release_evaluation(&task_id).await.unwrap();
        assert!(store.begin_evaluation(&task_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_commit_crowns_winner_and_clears_marker() {
        let (store, task_id) = seeded().await;
        store
            .set_task_evaluation_status(&task_id, EvaluationStatus::InProgress)
            .await
            .unwrap();

        let outcome = store.commit_crown_evaluation(commit("r2")).await.unwrap();

        assert!(outcome.is_committed());
        assert!(store.get_task_run(&RunId::new("r2")).await.unwrap().is_crowned);
        assert!(!store.get_task_run(&RunId::new("r1")).await.unwrap().is_crowned);
        assert_eq!(
            store.get_task(&task_id).await.unwrap().evaluation_status,
            EvaluationStatus::NotStarted
        );
    }

    #[tokio::test]
    async fn test_second_commit_returns_existing() {
        let (store, _) = seeded().await;
        store.commit_crown_evaluation(commit("r2")).await.unwrap();

        let second = store.commit_crown_evaluation(commit("r1")).await.unwrap();

        assert!(!second.is_committed());
        assert_eq!(second.evaluation().winner_run_id, RunId::new("r2"));
        assert!(!store.get_task_run(&RunId::new("r1")).await.unwrap().is_crowned);
        assert_eq!(store.evaluation_count().await, 1);
    }

    #[tokio::test]
    async fn test_commit_rejects_foreign_winner() {
        let (store, _) = seeded().await;
        store
            .insert_run(TaskRun::new(TaskId::new("t2"), "amp").with_id(RunId::new("r9")))
            .await;
        let mut foreign = commit("r9");
        foreign.candidate_run_ids.push(RunId::new("r9"));

        let err = store.commit_crown_evaluation(foreign).await.unwrap_err();

        assert!(matches!(err, WorkflowError::Core(CoreError::ForeignRun { .. })));
        assert_eq!(store.evaluation_count().await, 0);
    }

    #[tokio::test]
    async fn test_report_run_completion() {
        let (store, task_id) = seeded().await;
        let run = store
            .report_run_completion(RunCompletion {
                run_id: RunId::new("r1"),
                exit_code: 0,
                branch_name: Some("a/t1-final".to_string()),
            })
            .await
            .unwrap();

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.branch_name.as_deref(), Some("a/t1-final"));
        assert_eq!(store.get_task_runs(&task_id).await.unwrap()[0].id, RunId::new("r1"));
    }

    #[tokio::test]
    async fn test_late_report_leaves_terminal_run_untouched() {
        let (store, _) = seeded().await;
        let report = |branch: &str, exit_code| RunCompletion {
            run_id: RunId::new("r1"),
            exit_code,
            branch_name: Some(branch.to_string()),
        };
        store.report_run_completion(report("a/t1", 0)).await.unwrap();

        let err = store
            .report_run_completion(report("a/t1-retry", 1))
            .await
            .unwrap_err();

        assert!(matches!(err, WorkflowError::Core(_)));
        let run = store.get_task_run(&RunId::new("r1")).await.unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.branch_name.as_deref(), Some("a/t1"));
    }
}
