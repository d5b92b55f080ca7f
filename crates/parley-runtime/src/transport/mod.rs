//! Transport contract: turn one `ChatRequest` into a stream of raw response bytes

pub mod http;
pub mod replay;

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

pub use crate::error::TransportError;
use crate::protocol::ChatRequest;

pub use http::{HttpTransport, HttpTransportConfig};
pub use replay::{Fixture, RecordedFailure, RecordingTransport, ReplayTransport, RoundRecord};

/// Raw response body, chunked however the network delivered it
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// Opens one streamed exchange per request.
///
/// Dropping the returned stream must release the underlying connection.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, request: &ChatRequest) -> Result<ByteStream, TransportError>;

    fn name(&self) -> &str;
}
