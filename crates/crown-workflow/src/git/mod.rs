//! Git access: branch probing, diff collection and workspace commits.
//!
//! The workflow only touches the shared remote through the narrow
//! [`GitRemote`] trait; the worker commits its agent's work through
//! [`WorkspaceRepo`]. [`GitCli`] implements both over the `git` binary.

mod cli;
mod diff;
mod prober;

use std::path::Path;

use async_trait::async_trait;

use crate::error::WorkflowError;

pub use cli::GitCli;
pub use diff::{DiffCache, DiffCollector, NO_CHANGES};
pub use prober::{BranchProber, BranchReadiness};

/// Limits applied to a single diff.
#[derive(Debug, Clone)]
pub struct DiffRequest<'a> {
    pub base: &'a str,
    pub branch: &'a str,
    pub max_bytes: usize,
    pub excluded_paths: &'a [String],
}

/// Read access to the shared remote.
#[async_trait]
pub trait GitRemote: Send + Sync {
    /// Fetch `branch` from the remote into its remote-tracking ref.
    async fn fetch_branch(&self, branch: &str) -> Result<(), WorkflowError>;

    /// Resolve the remote-tracking ref of `branch` to a commit id.
    async fn resolve_ref(&self, branch: &str) -> Result<Option<String>, WorkflowError>;

    /// Unified diff of `branch` against its merge base with `base`.
    ///
    /// Output beyond `max_bytes` is cut and marked as truncated.
    async fn diff(&self, request: DiffRequest<'_>) -> Result<String, WorkflowError>;
}

/// Write access to an agent's own workspace.
#[async_trait]
pub trait WorkspaceRepo: Send + Sync {
    /// Branch currently checked out in `workdir`.
    async fn current_branch(&self, workdir: &Path) -> Result<String, WorkflowError>;

    /// Stage everything and commit. Returns false if there was nothing to
    /// commit.
    async fn commit_all(&self, workdir: &Path, message: &str) -> Result<bool, WorkflowError>;

    /// Push `branch` to the remote.
    async fn push_branch(&self, workdir: &Path, branch: &str) -> Result<(), WorkflowError>;
}
