//! Agent classification.

use serde::{Deserialize, Serialize};

/// The family an agent belongs to, derived from its name.
///
/// Agent names look like `claude/sonnet-4` or `codex/gpt-5-high`; the part
/// before the first `/` selects the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    ClaudeCode,
    Codex,
    Gemini,
    Amp,
    Opencode,
    Cursor,
    Qwen,
    Unknown,
}

impl AgentKind {
    /// Classify an agent by name.
    pub fn from_agent_name(name: &str) -> Self {
        let family = name.split('/').next().unwrap_or_default().trim();
        match family.to_ascii_lowercase().as_str() {
            "claude" | "claude-code" => Self::ClaudeCode,
            "codex" => Self::Codex,
            "gemini" => Self::Gemini,
            "amp" => Self::Amp,
            "opencode" => Self::Opencode,
            "cursor" => Self::Cursor,
            "qwen" => Self::Qwen,
            _ => Self::Unknown,
        }
    }

    /// Whether the agent writes a structured artifact that signals the end of
    /// a turn. Agents without one fall back to terminal idleness.
    pub fn has_structured_artifact(&self) -> bool {
        matches!(self, Self::ClaudeCode | Self::Codex | Self::Gemini)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_agent_name() {
        assert_eq!(AgentKind::from_agent_name("claude/opus-4"), AgentKind::ClaudeCode);
        assert_eq!(AgentKind::from_agent_name("codex/gpt-5"), AgentKind::Codex);
        assert_eq!(AgentKind::from_agent_name("Gemini/2.5-pro"), AgentKind::Gemini);
        assert_eq!(AgentKind::from_agent_name("amp"), AgentKind::Amp);
        assert_eq!(AgentKind::from_agent_name("mystery/model"), AgentKind::Unknown);
        assert_eq!(AgentKind::from_agent_name(""), AgentKind::Unknown);
    }

    #[test]
    fn test_structured_artifacts() {
        assert!(AgentKind::ClaudeCode.has_structured_artifact());
        assert!(!AgentKind::Opencode.has_structured_artifact());
        assert!(!AgentKind::Unknown.has_structured_artifact());
    }
}
