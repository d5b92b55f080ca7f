pub mod decoder;
pub mod request;
pub mod types;

pub use decoder::{FrameDecoder, WireMode};
pub use request::ChatRequest;
pub use types::{
    Content, ContentBlock, FrameError, FrameKind, FrameMeta, ImageSource, Message,
    ParameterProperty, Role, StreamFrame, ToolCallRequest, ToolParameters, ToolSchema,
};
