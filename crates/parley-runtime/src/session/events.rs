use serde::Serialize;

use super::state::SessionState;
use super::transcript::Annotation;

/// Broadcast to subscribers as a submission progresses
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    TextDelta {
        text: String,
    },
    ToolInvoked {
        name: String,
    },
    Annotated {
        annotation: Annotation,
    },
}

/// How a submission ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SessionOutcome {
    Completed { text: String },
    Failed { reason: String },
    Cancelled,
}
