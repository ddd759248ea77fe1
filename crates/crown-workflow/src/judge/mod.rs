//! The judge: an external model that picks the best candidate.

mod claude;
mod prompt;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::error::WorkflowError;

pub use claude::ClaudeCliJudge;
pub use prompt::{evaluation_prompt, summary_prompt, truncate_chars};

/// Unvalidated judge answer.
///
/// `winner_index` is kept as raw JSON; [`validate_winner`] decides whether it
/// is usable.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawVerdict {
    #[serde(alias = "winner", default)]
    pub winner_index: Value,
    #[serde(default)]
    pub reason: Option<String>,
    /// Verbatim model output, stored in the audit trail.
    #[serde(skip)]
    pub raw_response: String,
}

/// Ranks candidates and summarizes diffs.
#[async_trait]
pub trait Judge: Send + Sync {
    /// Pick a winner for an evaluation prompt.
    async fn evaluate(&self, prompt: &str) -> Result<RawVerdict, WorkflowError>;

    /// Summarize the winning change.
    async fn summarize(&self, prompt: &str) -> Result<String, WorkflowError>;
}

/// Check that `value` is an integer index into `count` candidates.
///
/// Integral floats (`1.0`) and numeric strings (`"1"`) are accepted; negative,
/// fractional, out of range or non-numeric values are not.
pub fn validate_winner(value: &Value, count: usize) -> Result<usize, WorkflowError> {
    let invalid = || WorkflowError::InvalidWinner {
        value: value.to_string(),
        count,
    };

    let index = match value {
        Value::Number(n) => match (n.as_u64(), n.as_f64()) {
            (Some(i), _) => i,
            (None, Some(f)) if f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => f as u64,
            _ => return Err(invalid()),
        },
        Value::String(s) => s.trim().parse::<u64>().map_err(|_| invalid())?,
        _ => return Err(invalid()),
    };

    usize::try_from(index)
        .ok()
        .filter(|i| *i < count)
        .ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_winner_in_range() {
        assert_eq!(validate_winner(&json!(0), 2).unwrap(), 0);
        assert_eq!(validate_winner(&json!(1), 2).unwrap(), 1);
        assert_eq!(validate_winner(&json!(1.0), 2).unwrap(), 1);
        assert_eq!(validate_winner(&json!("1"), 2).unwrap(), 1);
    }

    #[test]
    fn test_validate_winner_rejects_garbage() {
        for value in [json!(2), json!(-1), json!(0.5), json!("first"), json!(null), json!([0])] {
            let err = validate_winner(&value, 2).unwrap_err();
            assert!(matches!(err, WorkflowError::InvalidWinner { count: 2, .. }), "{value}");
        }
    }

    #[test]
    fn test_raw_verdict_accepts_winner_alias() {
        let verdict: RawVerdict =
            serde_json::from_value(json!({"winner": 1, "reason": "b has tests"})).unwrap();
        assert_eq!(verdict.winner_index, json!(1));
        assert_eq!(verdict.reason.as_deref(), Some("b has tests"));
        assert!(verdict.raw_response.is_empty());
    }
}
