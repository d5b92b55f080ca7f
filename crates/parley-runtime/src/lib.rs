pub mod config;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod tool;
pub mod transport;

pub use config::SessionConfig;
pub use error::{InvokeError, RegistryError, SessionError, ToolError, TransportError};
pub use protocol::{
    ChatRequest, Content, ContentBlock, FrameDecoder, FrameError, FrameKind, FrameMeta,
    ImageSource, Message, ParameterProperty, Role, StreamFrame, ToolCallRequest, ToolParameters,
    ToolSchema, WireMode,
};
pub use registry::{ToolDefinition, ToolRegistry};
pub use session::{
    Annotation, AnnotationLevel, Conversation, Session, SessionEvent, SessionOutcome,
    SessionState, SubmissionHandle, Transcript,
};
pub use tool::{FnTool, Tool};
pub use transport::{
    ByteStream, Fixture, HttpTransport, HttpTransportConfig, RecordedFailure, RecordingTransport,
    ReplayTransport, RoundRecord, Transport,
};

/// Initialize structured JSON logging
pub fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    fmt()
        .json()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
}
