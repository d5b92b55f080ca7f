use serde::{Deserialize, Serialize};

use crate::protocol::WireMode;

const DEFAULT_MAX_ROUNDS: usize = 4;

/// Per-session settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Model name sent with every request; the backend picks its default when unset
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub mode: WireMode,
    /// Upper bound on request rounds per submission, the first request included
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
}

fn default_max_rounds() -> usize {
    DEFAULT_MAX_ROUNDS
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: None,
            mode: WireMode::default(),
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }
}

impl SessionConfig {
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = Some(model.to_string());
        self
    }

    pub fn with_mode(mut self, mode: WireMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config: SessionConfig = serde_json::from_str(r#"{"model": "llama3.2"}"#).unwrap();
        assert_eq!(config.model.as_deref(), Some("llama3.2"));
        assert_eq!(config.mode, WireMode::EventBlocks);
        assert_eq!(config.max_rounds, 4);
    }

    #[test]
    fn test_max_rounds_never_zero() {
        assert_eq!(SessionConfig::default().with_max_rounds(0).max_rounds, 1);
    }

    #[test]
    fn test_mode_names() {
        let config: SessionConfig = serde_json::from_str(r#"{"mode": "lines"}"#).unwrap();
        assert_eq!(config.mode, WireMode::Lines);
    }
}
