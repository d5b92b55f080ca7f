//! Record/replay transports: capture real exchanges to `fixture.json` and serve them back offline

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::{ByteStream, Transport, TransportError};
use crate::protocol::ChatRequest;

const FIXTURE_FILE: &str = "fixture.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fixture {
    pub recorded_at: DateTime<Utc>,
    pub rounds: Vec<RoundRecord>,
}

/// One request/response exchange
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoundRecord {
    /// Wire JSON of the request that opened the round
    #[serde(default)]
    pub request: Value,
    /// Response body chunks in arrival order
    #[serde(default)]
    pub chunks: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<RecordedFailure>,
    /// Keep the stream open after the last chunk instead of ending it
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub hold_open: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedFailure {
    pub status: u16,
    pub body: String,
}

impl RoundRecord {
    pub fn chunks<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            chunks: chunks.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn failure(status: u16, body: &str) -> Self {
        Self {
            failure: Some(RecordedFailure {
                status,
                body: body.to_string(),
            }),
            ..Default::default()
        }
    }

    pub fn held_open(mut self) -> Self {
        self.hold_open = true;
        self
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            recorded_at: Utc::now(),
            rounds: Vec::new(),
        }
    }

    pub fn with_round(mut self, round: RoundRecord) -> Self {
        self.rounds.push(round);
        self
    }

    /// Save fixture to JSON file
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir).context("Failed to create fixture directory")?;
        let path = dir.join(FIXTURE_FILE);
        let content = serde_json::to_string_pretty(self).context("Failed to serialize fixture")?;
        std::fs::write(&path, content).context(format!("Failed to write fixture: {:?}", path))?;
        Ok(())
    }

    /// Load fixture from JSON file
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(FIXTURE_FILE);
        let content = std::fs::read_to_string(&path)
            .context(format!("Failed to read fixture: {:?}", path))?;
        let fixture: Self =
            serde_json::from_str(&content).context("Failed to parse fixture JSON")?;
        Ok(fixture)
    }
}

/// Serves recorded rounds in order, one per `open`
pub struct ReplayTransport {
    fixture: Fixture,
    cursor: Mutex<usize>,
    received: Mutex<Vec<ChatRequest>>,
}

impl ReplayTransport {
    pub fn new(fixture: Fixture) -> Self {
        Self {
            fixture,
            cursor: Mutex::new(0),
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn load(dir: &Path) -> Result<Self> {
        Ok(Self::new(Fixture::load(dir)?))
    }

    /// Every request opened so far, in order
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn rounds_served(&self) -> usize {
        *self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Transport for ReplayTransport {
    async fn open(&self, request: &ChatRequest) -> Result<ByteStream, TransportError> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        let index = {
            let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
            let index = *cursor;
            *cursor += 1;
            index
        };

        let round = self
            .fixture
            .rounds
            .get(index)
            .ok_or(TransportError::ReplayExhausted(index))?;
        debug!(round = index, chunks = round.chunks.len(), "Replaying round");

        if let Some(failure) = &round.failure {
            return Err(TransportError::Status {
                status: failure.status,
                body: failure.body.clone(),
            });
        }

        let chunks: Vec<Result<Bytes, TransportError>> = round
            .chunks
            .iter()
            .map(|c| Ok(Bytes::from(c.clone())))
            .collect();
        let body = stream::iter(chunks);

        if round.hold_open {
            Ok(Box::pin(body.chain(stream::pending())))
        } else {
            Ok(Box::pin(body))
        }
    }

    fn name(&self) -> &str {
        "replay"
    }
}

/// Wraps another transport and captures every exchange into a fixture
pub struct RecordingTransport<T> {
    inner: T,
    fixture: Arc<Mutex<Fixture>>,
}

impl<T: Transport> RecordingTransport<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            fixture: Arc::new(Mutex::new(Fixture::new())),
        }
    }

    /// Snapshot of everything recorded so far
    pub fn fixture(&self) -> Fixture {
        self.fixture
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        let fixture = self.fixture();
        fixture.save(dir)?;
        info!(dir = %dir.display(), rounds = fixture.rounds.len(), "Saved fixture");
        Ok(())
    }
}

#[async_trait]
impl<T: Transport> Transport for RecordingTransport<T> {
    async fn open(&self, request: &ChatRequest) -> Result<ByteStream, TransportError> {
        let result = self.inner.open(request).await;

        let index = {
            let mut fixture = self.fixture.lock().unwrap_or_else(PoisonError::into_inner);
            let mut round = RoundRecord {
                request: request.to_json(),
                ..Default::default()
            };
            if let Err(TransportError::Status { status, body }) = &result {
                round.failure = Some(RecordedFailure {
                    status: *status,
                    body: body.clone(),
                });
            }
            fixture.rounds.push(round);
            fixture.rounds.len() - 1
        };

        let body = result?;
        let fixture = Arc::clone(&self.fixture);
        let mut carry = Utf8Carry::default();
        let recorded = body.inspect(move |chunk| {
            let Ok(bytes) = chunk else { return };
            let Some(text) = carry.push(bytes) else { return };
            let mut fixture = fixture.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(round) = fixture.rounds.get_mut(index) {
                round.chunks.push(text);
            }
        });
        Ok(Box::pin(recorded))
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

/// Holds back the tail of a UTF-8 sequence split across chunks
#[derive(Debug, Default)]
struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    fn push(&mut self, bytes: &[u8]) -> Option<String> {
        self.pending.extend_from_slice(bytes);
        let valid = match std::str::from_utf8(&self.pending) {
            Ok(text) => text.len(),
            Err(e) if e.error_len().is_some() => self.pending.len(),
            Err(e) => e.valid_up_to(),
        };
        if valid == 0 {
            return None;
        }
        let text = String::from_utf8_lossy(&self.pending[..valid]).into_owned();
        self.pending.drain(..valid);
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Message;

    fn request(text: &str) -> ChatRequest {
        ChatRequest::initial(None, vec![Message::user(text)], vec![])
    }

    async fn collect(mut body: ByteStream) -> String {
        let mut out = Vec::new();
        while let Some(chunk) = body.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_fixture_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let fixture = Fixture::new()
            .with_round(RoundRecord::chunks(["a", "b"]))
            .with_round(RoundRecord::failure(503, "busy"));
        fixture.save(dir.path()).unwrap();

        let loaded = Fixture::load(dir.path()).unwrap();
        assert_eq!(loaded.rounds.len(), 2);
        assert_eq!(loaded.rounds[0].chunks, vec!["a", "b"]);
        assert_eq!(loaded.rounds[1].failure.as_ref().unwrap().status, 503);
    }

    #[test]
    fn test_fixture_load_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let err = Fixture::load(&dir.path().join("nope")).unwrap_err();
        assert!(err.to_string().contains("Failed to read fixture"));
    }

    #[tokio::test]
    async fn test_replay_serves_rounds_in_order() {
        let transport = ReplayTransport::new(
            Fixture::new()
                .with_round(RoundRecord::chunks(["first"]))
                .with_round(RoundRecord::failure(500, "boom")),
        );

        let body = transport.open(&request("one")).await.unwrap();
        assert_eq!(collect(body).await, "first");

        let err = transport.open(&request("two")).await.err().unwrap();
        assert_eq!(err.status_code(), Some(500));

        let err = transport.open(&request("three")).await.err().unwrap();
        assert!(matches!(err, TransportError::ReplayExhausted(2)));

        assert_eq!(transport.requests().len(), 3);
        assert_eq!(transport.rounds_served(), 3);
    }

    #[tokio::test]
    async fn test_recording_captures_chunks() {
        let inner = ReplayTransport::new(
            Fixture::new().with_round(RoundRecord::chunks(["hel", "lo"])),
        );
        let recorder = RecordingTransport::new(inner);

        let body = recorder.open(&request("hi")).await.unwrap();
        assert_eq!(collect(body).await, "hello");

        let fixture = recorder.fixture();
        assert_eq!(fixture.rounds.len(), 1);
        assert_eq!(fixture.rounds[0].chunks, vec!["hel", "lo"]);
        assert_eq!(fixture.rounds[0].request["messages"][0]["content"], "hi");
    }

    #[test]
    fn test_utf8_carry_joins_split_character() {
        let degree = "72ºF".as_bytes();
        let mut carry = Utf8Carry::default();
        assert_eq!(carry.push(&degree[..3]).as_deref(), Some("72"));
        assert_eq!(carry.push(&degree[3..4]).as_deref(), Some("º"));
        assert_eq!(carry.push(&degree[4..]).as_deref(), Some("F"));
    }

    #[test]
    fn test_utf8_carry_invalid_bytes_not_held_forever() {
        let mut carry = Utf8Carry::default();
        assert_eq!(carry.push(&[0xff, b'a']).as_deref(), Some("\u{fffd}a"));
    }
}
