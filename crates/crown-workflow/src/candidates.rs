//! Candidate assembly.
//!
//! Turns the completed runs of a task into judge-ready candidates: one per
//! run, in run order, each carrying its diff against the base branch.

use crown_core::{RunId, Task, TaskRun};
use tracing::{error, info};

use crate::error::WorkflowError;
use crate::git::{BranchProber, DiffCollector};

/// A completed run together with its diff. Rebuilt on every attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Position shown to the judge.
    pub index: usize,
    pub run_id: RunId,
    pub agent_name: String,
    pub branch: String,
    pub diff: String,
}

/// Builds candidates from completed runs.
#[derive(Clone)]
pub struct CandidateAggregator {
    prober: BranchProber,
    collector: DiffCollector,
}

impl CandidateAggregator {
    pub fn new(prober: BranchProber, collector: DiffCollector) -> Self {
        Self { prober, collector }
    }

    /// Build one candidate per run, preserving order.
    ///
    /// Every run must have a branch name; this is checked before any remote
    /// work. Unreachable branches do not fail the build, they fall back to a
    /// cached diff or the no-changes placeholder.
    pub async fn build(
        &self,
        task: &Task,
        runs: &[TaskRun],
    ) -> Result<Vec<Candidate>, WorkflowError> {
        let mut branches = Vec::with_capacity(runs.len());
        for run in runs {
            match run.branch_name.as_deref().filter(|b| !b.trim().is_empty()) {
                Some(branch) => branches.push(branch.to_string()),
                None => {
                    error!(task_id = %task.id, run_id = %run.id, "Completed run has no branch");
                    return Err(WorkflowError::MissingBranch(run.id.clone()));
                }
            }
        }

        let uncached: Vec<String> = branches
            .iter()
            .filter(|b| self.collector.cached(b).is_none())
            .cloned()
            .collect();
        let readiness = self.prober.ensure_all(&task.base_branch, &uncached).await;

        let base = task.base_branch.as_str();
        let diffs = futures_util::future::join_all(branches.iter().map(|branch| {
            let available = !uncached.contains(branch) || readiness.is_ready(branch);
            self.collector.collect_or_fallback(base, branch, available)
        }))
        .await;

        let candidates: Vec<Candidate> = runs
            .iter()
            .zip(branches)
            .zip(diffs)
            .enumerate()
            .map(|(index, ((run, branch), diff))| Candidate {
                index,
                run_id: run.id.clone(),
                agent_name: run.agent_name.clone(),
                branch,
                diff,
            })
            .collect();

        info!(
            task_id = %task.id,
            candidate_count = candidates.len(),
            all_fetched = readiness.all_ready(),
            "Candidates assembled"
        );
        Ok(candidates)
    }
}
