//! Crown Core Domain Types
//!
//! This crate contains the pure domain types shared by every worker taking
//! part in a crown evaluation. It has no dependencies on:
//! - Git or any remote
//! - The task store transport
//! - Runtime specifics
//!
//! A [`Task`] is attempted by several [`TaskRun`]s, one per agent. Once the
//! runs finish, exactly one of them is crowned and the decision is recorded
//! as a [`CrownEvaluation`].

pub mod agent;
pub mod error;
pub mod evaluation;
pub mod ids;
pub mod status;
pub mod task;

// Re-export commonly used types
pub use agent::AgentKind;
pub use error::CoreError;
pub use evaluation::{CrownCommit, CrownEvaluation, EvaluationAudit, PullRequestInfo};
pub use ids::{RunId, TaskId};
pub use status::{EvaluationStatus, RunStatus};
pub use task::{Task, TaskRun};
