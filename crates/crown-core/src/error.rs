//! Core domain errors.

use thiserror::Error;

/// Core domain errors for the crown workflow.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Task not found.
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// Run not found.
    #[error("Run not found: {0}")]
    RunNotFound(String),

    /// Invalid state transition.
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    /// Run belongs to a different task than the one being evaluated.
    #[error("Run {run} does not belong to task {task}")]
    ForeignRun { run: String, task: String },

    /// Invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
