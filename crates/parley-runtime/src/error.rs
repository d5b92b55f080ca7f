//! Typed errors for the registry, tools, transport and session layers

use std::time::Duration;

use thiserror::Error;

use crate::protocol::Role;
use crate::session::SessionState;

/// Tool registration and lookup failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("tool '{0}' is already registered")]
    DuplicateToolName(String),
    #[error("tool '{0}' is not registered")]
    NotFound(String),
}

/// Failure reported by a tool's executor
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ToolError {
    pub message: String,
}

impl ToolError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn missing_argument(name: &str) -> Self {
        Self::new(format!("missing argument '{name}'"))
    }

    pub fn timed_out(after: Duration) -> Self {
        Self::new(format!("tool timed out after {}s", after.as_secs_f32()))
    }
}

impl From<anyhow::Error> for ToolError {
    fn from(err: anyhow::Error) -> Self {
        Self::new(format!("{err:#}"))
    }
}

/// Why a backend-requested tool call could not produce a result
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvokeError {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),
    #[error("tool '{tool}' failed: {source}")]
    Execution {
        tool: String,
        #[source]
        source: ToolError,
    },
}

/// Transport-level failures; all of them end the submission
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("stream read failed: {0}")]
    Read(String),
    #[error("request could not be prepared: {0}")]
    Request(String),
    #[error("no recorded response for round {0}")]
    ReplayExhausted(usize),
}

impl TransportError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Errors returned directly to the caller of a session
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a submission is already in flight (state: {0})")]
    Busy(SessionState),
    #[error("only user messages can be submitted, got {0:?}")]
    NotAUserMessage(Role),
    #[error("submission task ended abnormally: {0}")]
    Join(String),
}
