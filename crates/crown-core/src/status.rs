//! Status enums for runs and task evaluations.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Lifecycle status of a TaskRun.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Run created, agent not started yet.
    #[default]
    Pending,
    /// Agent is working.
    Running,
    /// Agent finished and its work was committed.
    Completed,
    /// Agent exited with an error.
    Failed,
}

impl RunStatus {
    /// Returns true if the run is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns true if the run is still active (not terminal).
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

const IN_PROGRESS: &str = "in_progress";

/// Coarse progress marker stored on a Task.
///
/// On the wire this is `null`, the literal `"in_progress"`, or an error
/// message that operators see unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EvaluationStatus {
    /// Nothing recorded.
    #[default]
    NotStarted,
    /// A worker holds the evaluation lock and is working on it.
    InProgress,
    /// The last evaluation attempt failed with this message.
    Failed(String),
}

impl EvaluationStatus {
    /// The error message, if the last attempt failed.
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed(message) => Some(message),
            _ => None,
        }
    }

    /// Wire representation.
    pub fn as_marker(&self) -> Option<&str> {
        match self {
            Self::NotStarted => None,
            Self::InProgress => Some(IN_PROGRESS),
            Self::Failed(message) => Some(message),
        }
    }

    /// Parse the wire representation.
    pub fn from_marker(marker: Option<String>) -> Self {
        match marker {
            None => Self::NotStarted,
            Some(m) if m.is_empty() => Self::NotStarted,
            Some(m) if m == IN_PROGRESS => Self::InProgress,
            Some(m) => Self::Failed(m),
        }
    }
}

impl Serialize for EvaluationStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.as_marker().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for EvaluationStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<String>::deserialize(deserializer).map(Self::from_marker)
    }
}
