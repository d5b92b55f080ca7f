use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of a session's current submission
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    AwaitingFirstByte,
    Streaming,
    DispatchingTool,
    AwaitingFollowup,
    Completed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed)
    }

    /// Whether a new submission may start from this state
    pub fn accepts_submission(&self) -> bool {
        matches!(self, SessionState::Idle) || self.is_terminal()
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::AwaitingFirstByte => "awaiting_first_byte",
            SessionState::Streaming => "streaming",
            SessionState::DispatchingTool => "dispatching_tool",
            SessionState::AwaitingFollowup => "awaiting_followup",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_idle_and_terminal_accept() {
        assert!(SessionState::Idle.accepts_submission());
        assert!(SessionState::Completed.accepts_submission());
        assert!(SessionState::Failed.accepts_submission());
        for busy in [
            SessionState::AwaitingFirstByte,
            SessionState::Streaming,
            SessionState::DispatchingTool,
            SessionState::AwaitingFollowup,
        ] {
            assert!(!busy.accepts_submission(), "{busy} should be busy");
            assert!(!busy.is_terminal());
        }
    }
}
