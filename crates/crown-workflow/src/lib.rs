//! Crown workflow.
//!
//! Several agents attempt the same task in parallel, each in its own
//! workspace and on its own branch. This crate decides when an agent is done
//! ([`completion`]), and picks exactly one winning branch once all of them
//! are ([`coordinator`]). Workers never talk to each other: all coordination
//! goes through the [`store::TaskStore`] lock and the git remote.

pub mod candidates;
pub mod completion;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod git;
pub mod hooks;
pub mod judge;
pub mod pull_request;
pub mod retry;
pub mod store;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use candidates::{Candidate, CandidateAggregator};
pub use completion::{CompletionDetector, CompletionEvent, CompletionStrategy, DetectorHandle};
pub use config::{CoordinatorConfig, CrownConfig, DetectorConfig, DiffConfig, ProbeConfig};
pub use coordinator::{EvaluationContext, EvaluationCoordinator, EvaluationOutcome, SkipReason};
pub use error::{with_timeout, WorkflowError};
pub use git::{BranchProber, DiffCache, DiffCollector, GitCli, GitRemote, WorkspaceRepo, NO_CHANGES};
pub use hooks::{CommandHook, FinalizeHook};
pub use judge::{ClaudeCliJudge, Judge, RawVerdict};
pub use pull_request::{GitHubPullRequests, PullRequestService};
pub use retry::RetryPolicy;
pub use store::{CommitOutcome, HttpTaskStore, InMemoryTaskStore, RunCompletion, TaskStore};
pub use worker::{CrownWorker, TIMEOUT_EXIT_CODE};
