//! Workflow errors.

use std::time::Duration;

use crown_core::{CoreError, RunId};
use thiserror::Error;

/// Errors raised by the crown workflow and its adapters.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The task store rejected or failed a request.
    #[error("Task store error: {0}")]
    Store(String),

    /// A git invocation failed.
    #[error("git {command} failed: {stderr}")]
    Git { command: String, stderr: String },

    /// The judge call failed or returned something unusable.
    #[error("Judge error: {0}")]
    Judge(String),

    /// The judge picked a winner that does not exist.
    #[error("Judge returned invalid winner index {value} for {count} candidates")]
    InvalidWinner { value: String, count: usize },

    /// Pull request creation failed.
    #[error("Pull request error: {0}")]
    PullRequest(String),

    /// Evaluation started but no run completed successfully.
    #[error("No completed runs to evaluate")]
    NoCompletedRuns,

    /// A post-finalize hook failed.
    #[error("Hook {name} failed: {message}")]
    Hook { name: String, message: String },

    /// A completed run has no branch to diff.
    #[error("Completed run {0} has no branch name")]
    MissingBranch(RunId),

    /// A remote call did not finish in time.
    #[error("{operation} timed out after {}s", .after.as_secs())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// Domain validation failed.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Local I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl WorkflowError {
    /// Data-integrity faults abort an evaluation without retrying; everything
    /// else is considered transient.
    pub fn is_integrity_fault(&self) -> bool {
        matches!(
            self,
            Self::MissingBranch(_)
                | Self::InvalidWinner { .. }
                | Self::NoCompletedRuns
                | Self::Core(_)
        )
    }
}

/// Run `future` under a timeout, mapping expiry to [`WorkflowError::Timeout`].
pub async fn with_timeout<T, F>(
    operation: &'static str,
    after: Duration,
    future: F,
) -> Result<T, WorkflowError>
where
    F: std::future::Future<Output = Result<T, WorkflowError>>,
{
    match tokio::time::timeout(after, future).await {
        Ok(result) => result,
        Err(_) => Err(WorkflowError::Timeout { operation, after }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_expires() {
        let result: Result<(), _> = with_timeout("store call", Duration::from_secs(2), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;

        let err = result.unwrap_err();
        assert!(matches!(err, WorkflowError::Timeout { operation: "store call", .. }));
        assert_eq!(err.to_string(), "store call timed out after 2s");
    }

    #[test]
    fn test_integrity_classification() {
        assert!(WorkflowError::MissingBranch(RunId::new("r1")).is_integrity_fault());
        assert!(WorkflowError::NoCompletedRuns.is_integrity_fault());
        assert!(!WorkflowError::Store("503".into()).is_integrity_fault());
    }
}
