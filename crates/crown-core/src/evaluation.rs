//! Crown evaluation records.

use crate::{CoreError, RunId, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pull request opened for the crowned run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestInfo {
    pub url: String,
    pub number: u64,
    pub is_draft: bool,
}

/// Verbatim judge exchange, kept for later inspection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationAudit {
    pub prompt: String,
    pub response: String,
}

/// Everything written by the single finalize commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrownCommit {
    pub task_id: TaskId,
    pub winner_run_id: RunId,
    pub reason: String,
    /// Candidate runs in the order they were shown to the judge.
    pub candidate_run_ids: Vec<RunId>,
    pub audit: EvaluationAudit,
    pub summary: Option<String>,
    pub pull_request: Option<PullRequestInfo>,
}

impl CrownCommit {
    /// Check the commit is internally consistent before it is written.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.candidate_run_ids.is_empty() {
            return Err(CoreError::InvalidInput(
                "crown commit has no candidates".to_string(),
            ));
        }
        if !self.candidate_run_ids.contains(&self.winner_run_id) {
            return Err(CoreError::InvalidInput(format!(
                "winner {} is not among the candidates",
                self.winner_run_id
            )));
        }
        Ok(())
    }

    /// Turn the commit into the stored record.
    pub fn into_evaluation(self, evaluated_at: DateTime<Utc>) -> CrownEvaluation {
        CrownEvaluation {
            task_id: self.task_id,
            winner_run_id: self.winner_run_id,
            reason: self.reason,
            evaluated_at,
            candidate_run_ids: self.candidate_run_ids,
            audit: self.audit,
            summary: self.summary,
            pull_request: self.pull_request,
        }
    }
}

/// The immutable result of a successful evaluation.
///
/// At most one exists per task; its presence is the proof that the task has
/// already been evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrownEvaluation {
    pub task_id: TaskId,
    pub winner_run_id: RunId,
    pub reason: String,
    pub evaluated_at: DateTime<Utc>,
    pub candidate_run_ids: Vec<RunId>,
    #[serde(default)]
    pub audit: EvaluationAudit,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub pull_request: Option<PullRequestInfo>,
}
