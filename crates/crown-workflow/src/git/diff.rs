//! Bounded diff collection with a per-process cache.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use super::{DiffRequest, GitRemote};
use crate::config::DiffConfig;
use crate::error::with_timeout;

/// Diff text used when no diff can be obtained.
pub const NO_CHANGES: &str = "No changes detected";

/// Diffs computed earlier in this process, keyed by branch.
///
/// Only successful results are stored, so a later fetch failure can still
/// fall back to the text computed while the branch was reachable.
#[derive(Debug, Default)]
pub struct DiffCache {
    entries: Mutex<HashMap<String, String>>,
}

impl DiffCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, branch: &str) -> Option<String> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(branch).cloned())
    }

    pub fn insert(&self, branch: &str, diff: String) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(branch.to_string(), diff);
        }
    }
}

/// Computes diffs of run branches against the task's base branch.
#[derive(Clone)]
pub struct DiffCollector {
    git: Arc<dyn GitRemote>,
    cache: Arc<DiffCache>,
    config: DiffConfig,
}

impl DiffCollector {
    pub fn new(git: Arc<dyn GitRemote>, cache: Arc<DiffCache>, config: DiffConfig) -> Self {
        Self { git, cache, config }
    }

    /// Diff previously computed for `branch`, if any.
    pub fn cached(&self, branch: &str) -> Option<String> {
        self.cache.get(branch)
    }

    /// Diff of `branch` against `base`.
    ///
    /// Never fails: a cached result is returned as is, and any error yields
    /// [`NO_CHANGES`]. Both refs must already have been fetched.
    pub async fn collect(&self, base: &str, branch: &str) -> String {
        if let Some(diff) = self.cache.get(branch) {
            debug!(branch, "Using cached diff");
            return diff;
        }

        let request = DiffRequest {
            base,
            branch,
            max_bytes: self.config.max_bytes,
            excluded_paths: &self.config.excluded_paths,
        };
        match with_timeout("git diff", self.config.timeout, self.git.diff(request)).await {
            Ok(text) => {
                let trimmed = text.trim();
                let diff = if trimmed.is_empty() {
                    NO_CHANGES.to_string()
                } else {
                    trimmed.to_string()
                };
                debug!(branch, bytes = diff.len(), "Collected diff");
                self.cache.insert(branch, diff.clone());
                diff
            }
            Err(e) => {
                warn!(base, branch, error = %e, "Diff failed, using placeholder");
                NO_CHANGES.to_string()
            }
        }
    }

    /// Like [`collect`](Self::collect), but a branch that could not be
    /// fetched only uses the cache.
    pub async fn collect_or_fallback(&self, base: &str, branch: &str, available: bool) -> String {
        if available {
            return self.collect(base, branch).await;
        }
        match self.cache.get(branch) {
            Some(diff) => {
                debug!(branch, "Branch unavailable, using cached diff");
                diff
            }
            None => {
                warn!(branch, "Branch unavailable and no cached diff");
                NO_CHANGES.to_string()
            }
        }
    }
}
