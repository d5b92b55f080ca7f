use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, ClientBuilder};
use tracing::{debug, info};

use super::{ByteStream, Transport, TransportError};
use crate::protocol::{ChatRequest, Content, ContentBlock, ImageSource, WireMode};

const DEFAULT_ENDPOINT: &str = "http://localhost:11434/api/chat";
const DEFAULT_IMAGE_MEDIA_TYPE: &str = "image/jpeg";

/// Settings for the streaming HTTP transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpTransportConfig {
    pub endpoint: String,
    pub mode: WireMode,
    /// Whole-exchange timeout; generations can be slow
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            mode: WireMode::default(),
            timeout: Duration::from_secs(600),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl HttpTransportConfig {
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    pub fn with_mode(mut self, mode: WireMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// POSTs each request as JSON and hands back the body as it streams in
pub struct HttpTransport {
    client: Client,
    config: HttpTransportConfig,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> Result<Self, TransportError> {
        let client = ClientBuilder::new()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| TransportError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &HttpTransportConfig {
        &self.config
    }

    fn map_error(&self, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout(self.config.timeout)
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else {
            TransportError::Request(err.to_string())
        }
    }

    /// Replace URL image sources with fetched bytes so the backend only sees inline data
    async fn resolve_images(&self, request: &ChatRequest) -> Result<ChatRequest, TransportError> {
        let mut resolved = request.clone();
        for message in &mut resolved.messages {
            let Content::Blocks(blocks) = &mut message.content else {
                continue;
            };
            for block in blocks.iter_mut() {
                let ContentBlock::Image { source } = block else {
                    continue;
                };
                if let ImageSource::Url { url } = source {
                    *source = self.fetch_image(url).await?;
                }
            }
        }
        Ok(resolved)
    }

    async fn fetch_image(&self, url: &str) -> Result<ImageSource, TransportError> {
        debug!(url, "Fetching remote image");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let media_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| v.starts_with("image/"))
            .unwrap_or(DEFAULT_IMAGE_MEDIA_TYPE)
            .to_string();
        let data = response.bytes().await.map_err(|e| self.map_error(e))?;

        Ok(ImageSource::Bytes {
            data: data.to_vec(),
            media_type,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self, request: &ChatRequest) -> Result<ByteStream, TransportError> {
        let request = if request.has_remote_images() {
            self.resolve_images(request).await?
        } else {
            request.clone()
        };

        info!(
            endpoint = %self.config.endpoint,
            messages = request.messages.len(),
            tools = request.advertises_tools(),
            "Opening chat stream"
        );

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("Content-Type", "application/json")
            .header("Accept", self.config.mode.accept_header())
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let timeout = self.config.timeout;
        let stream = response.bytes_stream().map(move |chunk| {
            chunk.map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout(timeout)
                } else {
                    TransportError::Read(e.to_string())
                }
            })
        });
        Ok(Box::pin(stream))
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HttpTransportConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(600));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.mode, WireMode::EventBlocks);
    }

    #[test]
    fn test_builder_overrides() {
        let config = HttpTransportConfig::default()
            .with_endpoint("http://127.0.0.1:9/api/chat")
            .with_mode(WireMode::Lines)
            .with_timeout(Duration::from_secs(5));
        let transport = HttpTransport::new(config).unwrap();
        assert_eq!(transport.config().endpoint, "http://127.0.0.1:9/api/chat");
        assert_eq!(transport.config().mode.accept_header(), "application/x-ndjson");
        assert_eq!(transport.name(), "http");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        // Port 9 (discard) is closed on test hosts
        let config = HttpTransportConfig::default()
            .with_endpoint("http://127.0.0.1:9/api/chat")
            .with_timeout(Duration::from_secs(2));
        let transport = HttpTransport::new(config).unwrap();
        let request = ChatRequest::initial(None, vec![crate::protocol::Message::user("hi")], vec![]);

        let err = transport.open(&request).await.err().unwrap();
        assert!(matches!(
            err,
            TransportError::Connect(_) | TransportError::Timeout(_) | TransportError::Request(_)
        ));
    }
}
