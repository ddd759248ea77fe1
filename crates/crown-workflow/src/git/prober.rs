//! Branch availability probing.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::GitRemote;
use crate::config::ProbeConfig;
use crate::error::with_timeout;

/// Fetches branches from the shared remote with a bounded retry budget.
///
/// A `false` result means "not available right now", never "does not exist":
/// the branch may simply not have replicated yet.
#[derive(Clone)]
pub struct BranchProber {
    git: Arc<dyn GitRemote>,
    config: ProbeConfig,
}

/// Outcome of probing a base branch and a set of run branches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchReadiness {
    pub base_ready: bool,
    /// `(branch, fetched)` in the order requested.
    pub branches: Vec<(String, bool)>,
}

impl BranchReadiness {
    /// True only if the base and every branch were fetched.
    pub fn all_ready(&self) -> bool {
        self.base_ready && self.branches.iter().all(|(_, ok)| *ok)
    }

    /// Whether `branch` was fetched.
    pub fn is_ready(&self, branch: &str) -> bool {
        self.branches
            .iter()
            .any(|(name, ok)| name == branch && *ok)
    }
}

impl BranchProber {
    pub fn new(git: Arc<dyn GitRemote>, config: ProbeConfig) -> Self {
        Self { git, config }
    }

    /// Fetch `branch` and verify its remote-tracking ref resolves.
    pub async fn ensure(&self, branch: &str) -> bool {
        let attempts = self.config.retry.attempts;
        let available = self
            .config
            .retry
            .run_until(|attempt| async move {
                let timeout = self.config.git_timeout;
                let fetched =
                    with_timeout("git fetch", timeout, self.git.fetch_branch(branch)).await;
                if let Err(e) = fetched {
                    warn!(branch, attempt, attempts, error = %e, "Branch fetch failed");
                    return false;
                }
                match with_timeout("git rev-parse", timeout, self.git.resolve_ref(branch)).await {
                    Ok(Some(sha)) => {
                        debug!(branch, sha = %sha, "Branch available");
                        true
                    }
                    Ok(None) => {
                        warn!(branch, attempt, attempts, "Fetched branch did not resolve");
                        false
                    }
                    Err(e) => {
                        warn!(branch, attempt, attempts, error = %e, "Branch verification failed");
                        false
                    }
                }
            })
            .await;

        if !available {
            warn!(branch, attempts, "Branch unavailable after retries");
        }
        available
    }

    /// Fetch the base branch and every run branch.
    ///
    /// Branches are probed concurrently; the result keeps the requested
    /// order.
    pub async fn ensure_all(&self, base: &str, branches: &[String]) -> BranchReadiness {
        let base_probe = self.ensure(base);
        let branch_probes = futures_util::future::join_all(branches.iter().map(|b| self.ensure(b)));
        let (base_ready, results) = tokio::join!(base_probe, branch_probes);

        let readiness = BranchReadiness {
            base_ready,
            branches: branches.iter().cloned().zip(results).collect(),
        };
        info!(
            base,
            base_ready,
            branch_count = branches.len(),
            all_ready = readiness.all_ready(),
            "Branch availability probed"
        );
        readiness
    }
}
