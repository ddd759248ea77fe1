//! Pull request creation for the crowned run.

mod github;

use async_trait::async_trait;
use crown_core::PullRequestInfo;

use crate::error::WorkflowError;

pub use github::GitHubPullRequests;

/// What to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestRequest {
    /// `owner/repo`.
    pub repository: String,
    /// Branch holding the crowned work.
    pub head: String,
    /// Branch to merge into.
    pub base: String,
    pub title: String,
    pub body: String,
    pub draft: bool,
}

/// Opens pull requests.
#[async_trait]
pub trait PullRequestService: Send + Sync {
    /// Open a pull request, or return the open one that already exists for
    /// the same head branch.
    async fn open(&self, request: PullRequestRequest) -> Result<PullRequestInfo, WorkflowError>;
}

/// Title for a crowned run's pull request.
pub fn pull_request_title(task_description: &str) -> String {
    let first_line = task_description.lines().next().unwrap_or_default().trim();
    let title: String = first_line.chars().take(72).collect();
    if title.is_empty() {
        "Crowned agent changes".to_string()
    } else if title.len() < first_line.len() {
        format!("{}...", title.trim_end())
    } else {
        title
    }
}

/// Body for a crowned run's pull request.
pub fn pull_request_body(
    task_description: &str,
    agent_name: &str,
    reason: &str,
    summary: Option<&str>,
) -> String {
    let mut body = format!("## Task\n\n{}\n\n", task_description.trim());
    if let Some(summary) = summary {
        body.push_str(&format!("## Summary\n\n{}\n\n", summary.trim()));
    }
    body.push_str(&format!("## Selection\n\nCrowned run by `{agent_name}`: {reason}\n"));
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_uses_first_line() {
        assert_eq!(pull_request_title("Add retries\n\nmore detail"), "Add retries");
        assert_eq!(pull_request_title("   "), "Crowned agent changes");

        let long = "a".repeat(100);
        let title = pull_request_title(&long);
        assert_eq!(title, format!("{}...", "a".repeat(72)));
    }

    #[test]
    fn test_body_sections() {
        let body = pull_request_body(
            "Add retries",
            "codex/gpt-5",
            "b has tests",
            Some("- adds retry"),
        );
        assert!(body.starts_with("## Task\n\nAdd retries"));
        assert!(body.contains("## Summary\n\n- adds retry"));
        assert!(body.contains("`codex/gpt-5`: b has tests"));

        let bare = pull_request_body("Add retries", "amp", "only one", None);
        assert!(!bare.contains("## Summary"));
    }
}
