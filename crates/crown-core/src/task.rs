//! Task and TaskRun types.

use crate::{AgentKind, CoreError, EvaluationStatus, RunId, RunStatus, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A Task is a unit of work issued to one or more agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier.
    pub id: TaskId,

    /// Free-text description given to every agent.
    pub description: String,

    /// Branch every run starts from and is diffed against.
    pub base_branch: String,

    /// Whether to open a pull request for the crowned run.
    #[serde(default)]
    pub auto_pr: bool,

    /// `owner/repo` of the project, used when opening pull requests.
    #[serde(default)]
    pub project_full_name: Option<String>,

    /// Coarse evaluation progress marker.
    #[serde(default)]
    pub evaluation_status: EvaluationStatus,

    /// When the task was created.
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Create a new Task.
    pub fn new(description: impl Into<String>, base_branch: impl Into<String>) -> Self {
        Self {
            id: TaskId::generate(),
            description: description.into(),
            base_branch: base_branch.into(),
            auto_pr: false,
            project_full_name: None,
            evaluation_status: EvaluationStatus::NotStarted,
            created_at: Utc::now(),
        }
    }

    /// Builder method to set a specific ID (useful for testing).
    pub fn with_id(mut self, id: TaskId) -> Self {
        self.id = id;
        self
    }

    /// Builder method to enable pull request creation for `owner/repo`.
    pub fn with_auto_pr(mut self, project_full_name: impl Into<String>) -> Self {
        self.auto_pr = true;
        self.project_full_name = Some(project_full_name.into());
        self
    }
}

/// One agent's attempt at a Task, bound to one git branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRun {
    /// Unique run identifier.
    pub id: RunId,

    /// Parent task.
    pub task_id: TaskId,

    /// Agent name, e.g. `claude/sonnet-4`.
    pub agent_name: String,

    /// Lifecycle status.
    pub status: RunStatus,

    /// Branch holding the agent's work. Unset until the agent commits.
    #[serde(default)]
    pub branch_name: Option<String>,

    /// Exit code of the agent process.
    #[serde(default)]
    pub exit_code: Option<i32>,

    /// When the agent started.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,

    /// When the run reached a terminal state.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,

    /// Error message if the run failed.
    #[serde(default)]
    pub error_message: Option<String>,

    /// Whether this run was selected as the canonical result.
    #[serde(default)]
    pub is_crowned: bool,
}

impl TaskRun {
    /// Create a new pending run.
    pub fn new(task_id: TaskId, agent_name: impl Into<String>) -> Self {
        Self {
            id: RunId::generate(),
            task_id,
            agent_name: agent_name.into(),
            status: RunStatus::Pending,
            branch_name: None,
            exit_code: None,
            started_at: None,
            completed_at: None,
            error_message: None,
            is_crowned: false,
        }
    }

    /// Builder method to set a specific ID (useful for testing).
    pub fn with_id(mut self, id: RunId) -> Self {
        self.id = id;
        self
    }

    /// Builder method to set the branch name.
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch_name = Some(branch.into());
        self
    }

    /// The agent family, used to pick a completion strategy.
    pub fn agent_kind(&self) -> AgentKind {
        AgentKind::from_agent_name(&self.agent_name)
    }

    /// Mark the run as started.
    pub fn start(&mut self) -> Result<(), CoreError> {
        if self.status != RunStatus::Pending {
            return Err(self.invalid_transition(RunStatus::Running));
        }
        self.status = RunStatus::Running;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Record the agent's exit. Exit code 0 completes the run, anything else
    /// fails it.
    pub fn finish(&mut self, exit_code: i32) -> Result<(), CoreError> {
        let next = if exit_code == 0 {
            RunStatus::Completed
        } else {
            RunStatus::Failed
        };
        if self.status.is_terminal() {
            return Err(self.invalid_transition(next));
        }
        self.status = next;
        self.exit_code = Some(exit_code);
        self.completed_at = Some(Utc::now());
        if next == RunStatus::Failed {
            self.error_message = Some(format!("Agent exited with code {exit_code}"));
        }
        Ok(())
    }

    /// Returns true if the run completed and is eligible for the crown.
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    fn invalid_transition(&self, to: RunStatus) -> CoreError {
        CoreError::InvalidStateTransition {
            from: format!("{:?}", self.status),
            to: format!("{:?}", to),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_lifecycle() {
        let mut run = TaskRun::new(TaskId::new("t1"), "claude/sonnet-4");
        run.start().unwrap();
        run.finish(0).unwrap();

        assert!(run.is_completed());
        assert_eq!(run.exit_code, Some(0));
        assert!(run.completed_at.is_some());
        assert_eq!(run.agent_kind(), AgentKind::ClaudeCode);
    }

    #[test]
    fn test_nonzero_exit_fails_run() {
        let mut run = TaskRun::new(TaskId::new("t1"), "codex/gpt-5");
        run.finish(2).unwrap();

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.error_message.as_deref(), Some("Agent exited with code 2"));
    }

    #[test]
    fn test_finish_twice_is_rejected() {
        let mut run = TaskRun::new(TaskId::new("t1"), "amp");
        run.finish(0).unwrap();
        assert!(matches!(
            run.finish(0),
            Err(CoreError::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn test_task_defaults() {
        let task = Task::new("Add a health endpoint", "main").with_auto_pr("acme/api");
        assert!(task.auto_pr);
        assert_eq!(task.evaluation_status, EvaluationStatus::NotStarted);
        assert_eq!(task.project_full_name.as_deref(), Some("acme/api"));
    }
}
