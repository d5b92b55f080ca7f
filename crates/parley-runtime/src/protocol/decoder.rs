//! Incremental frame decoding for streamed backend responses.
//!
//! Two wire shapes are understood:
//! - line-delimited JSON, one `{model, createdAt, response}` object per line
//! - blank-line-delimited blocks of `event:` / `data:` lines
//!
//! Bytes are buffered as `Vec<u8>` and only split at `\n`, so a multi-byte
//! UTF-8 character or a JSON object split across reads decodes once complete.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::types::{
    lenient_timestamp, string_arguments, FrameError, FrameMeta, StreamFrame, ToolCallRequest,
};

/// Max bytes held for one unterminated line (1MB) to prevent OOM from malformed streams
const MAX_LINE_SIZE: usize = 1_048_576;

/// Response wire format, chosen per request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireMode {
    /// One JSON object per line
    Lines,
    /// `event:`/`data:` blocks separated by blank lines
    #[default]
    EventBlocks,
}

impl WireMode {
    /// Content type a server is expected to answer with
    pub fn accept_header(&self) -> &'static str {
        match self {
            WireMode::Lines => "application/x-ndjson",
            WireMode::EventBlocks => "text/event-stream",
        }
    }
}

/// Decoder for a single response stream. Create a new one per request.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    grammar: Grammar,
}

#[derive(Debug)]
enum Grammar {
    Lines,
    Blocks(BlockState),
}

impl FrameDecoder {
    pub fn new(mode: WireMode) -> Self {
        let grammar = match mode {
            WireMode::Lines => Grammar::Lines,
            WireMode::EventBlocks => Grammar::Blocks(BlockState::default()),
        };
        Self {
            buffer: Vec::new(),
            grammar,
        }
    }

    pub fn mode(&self) -> WireMode {
        match self.grammar {
            Grammar::Lines => WireMode::Lines,
            Grammar::Blocks(_) => WireMode::EventBlocks,
        }
    }

    /// Feed raw bytes and drain every frame completed by them, in stream order
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<StreamFrame> {
        self.buffer.extend_from_slice(bytes);
        let mut frames = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(strip_line_ending(&raw)).into_owned();
            self.decode_line(&line, &mut frames);
        }

        // Guard against a line that never terminates
        if self.buffer.len() > MAX_LINE_SIZE {
            warn!(size = self.buffer.len(), "Unterminated line exceeded {}B, dropping", MAX_LINE_SIZE);
            let preview = String::from_utf8_lossy(&self.buffer[..64]).into_owned();
            self.buffer.clear();
            frames.push(StreamFrame::Error {
                meta: FrameMeta::default(),
                error: FrameError::Decode {
                    raw: preview,
                    reason: format!("line exceeded {MAX_LINE_SIZE} bytes"),
                },
            });
        }

        frames
    }

    /// End of stream: decode a non-empty trailing partial line and close any open block
    pub fn finish(mut self) -> Vec<StreamFrame> {
        let mut frames = Vec::new();
        let rest = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(strip_line_ending(&rest)).into_owned();
        if !line.trim().is_empty() {
            self.decode_line(&line, &mut frames);
        }
        if let Grammar::Blocks(block) = &mut self.grammar {
            block.close(&mut frames);
        }
        frames
    }

    fn decode_line(&mut self, line: &str, frames: &mut Vec<StreamFrame>) {
        match &mut self.grammar {
            Grammar::Lines => decode_json_line(line, frames),
            Grammar::Blocks(block) => block.accept_line(line, frames),
        }
    }
}

fn strip_line_ending(raw: &[u8]) -> &[u8] {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    raw.strip_suffix(b"\r").unwrap_or(raw)
}

// --- Line-delimited mode ---

#[derive(Debug, Deserialize)]
struct LineEnvelope {
    #[serde(default)]
    model: Option<String>,
    #[serde(
        default,
        rename = "createdAt",
        alias = "created_at",
        deserialize_with = "lenient_timestamp"
    )]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

const GENERIC_BACKEND_ERROR: &str = "backend reported an error";

fn decode_json_line(line: &str, frames: &mut Vec<StreamFrame>) {
    if line.trim().is_empty() {
        return;
    }

    let envelope: LineEnvelope = match serde_json::from_str(line) {
        Ok(env) => env,
        Err(e) => {
            warn!(error = %e, "Undecodable response line");
            frames.push(decode_failure(line, &e));
            return;
        }
    };

    let meta = FrameMeta {
        model: envelope.model,
        created_at: envelope.created_at,
    };

    if let Some(message) = envelope.error {
        let message = if message.trim().is_empty() {
            GENERIC_BACKEND_ERROR.to_string()
        } else {
            message
        };
        frames.push(StreamFrame::Error {
            meta,
            error: FrameError::Backend { message },
        });
    } else if let Some(content) = envelope.response {
        frames.push(StreamFrame::Message { meta, content });
    } else {
        debug!(line, "Response line carried neither fragment nor error");
    }
}

fn decode_failure(raw: &str, err: &serde_json::Error) -> StreamFrame {
    StreamFrame::Error {
        meta: FrameMeta::default(),
        error: FrameError::Decode {
            raw: raw.to_string(),
            reason: err.to_string(),
        },
    }
}

// --- Event-block mode ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum BlockKind {
    #[default]
    Message,
    ToolCalls,
    Error,
}

/// Fields of the block currently being read
#[derive(Debug, Default)]
struct BlockState {
    kind: BlockKind,
    meta: FrameMeta,
    tool_calls: Vec<ToolCallRequest>,
    error_text: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct BlockEnvelope {
    #[serde(default)]
    model: Option<String>,
    #[serde(
        default,
        rename = "createdAt",
        alias = "created_at",
        deserialize_with = "lenient_timestamp"
    )]
    created_at: Option<DateTime<Utc>>,
    message: EnvelopeMessage,
}

#[derive(Debug, Deserialize)]
struct EnvelopeMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default, rename = "toolCalls", alias = "tool_calls")]
    tool_calls: Option<Vec<EnvelopeToolCall>>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeToolCall {
    function: EnvelopeFunction,
}

#[derive(Debug, Deserialize)]
struct EnvelopeFunction {
    name: String,
    #[serde(default, deserialize_with = "string_arguments")]
    arguments: HashMap<String, String>,
}

impl BlockState {
    fn accept_line(&mut self, line: &str, frames: &mut Vec<StreamFrame>) {
        if line.is_empty() {
            self.close(frames);
            return;
        }
        if line.starts_with(':') {
            return; // comment / keep-alive
        }

        let Some((field, value)) = line.split_once(':') else {
            debug!(line, "Ignoring line without field separator");
            return;
        };
        let value = value.strip_prefix(' ').unwrap_or(value);

        match field {
            "event" => self.set_kind(value.trim()),
            "data" => self.accept_data(value, frames),
            other => debug!(field = other, "Ignoring unknown field"),
        }
    }

    fn set_kind(&mut self, value: &str) {
        self.kind = match value {
            "message" => BlockKind::Message,
            "tool_calls" => BlockKind::ToolCalls,
            "error" => BlockKind::Error,
            unknown => {
                warn!(event = unknown, "Unknown event type, keeping {:?}", self.kind);
                self.kind
            }
        };
    }

    fn accept_data(&mut self, payload: &str, frames: &mut Vec<StreamFrame>) {
        let decoded = serde_json::from_str::<BlockEnvelope>(payload);

        if self.kind == BlockKind::Error {
            // Error payloads are often plain text, not envelopes
            let text = match decoded {
                Ok(env) => {
                    self.absorb_meta(&env);
                    match env.message.content {
                        // Nothing to report; close() falls back to a generic message
                        Some(content) if content.trim().is_empty() => return,
                        Some(content) => content,
                        None => payload.to_string(),
                    }
                }
                Err(_) => payload.to_string(),
            };
            self.error_text.push(text);
            return;
        }

        let envelope = match decoded {
            Ok(env) => env,
            Err(e) => {
                warn!(error = %e, "Undecodable data line");
                frames.push(decode_failure(payload, &e));
                return;
            }
        };
        self.absorb_meta(&envelope);

        match self.kind {
            BlockKind::Message => {
                if let Some(content) = envelope.message.content.filter(|c| !c.is_empty()) {
                    frames.push(StreamFrame::Message {
                        meta: self.meta.clone(),
                        content,
                    });
                }
            }
            BlockKind::ToolCalls => {
                for call in envelope.message.tool_calls.unwrap_or_default() {
                    if call.function.name.is_empty() {
                        warn!("Skipping tool call without a function name");
                        continue;
                    }
                    self.tool_calls.push(ToolCallRequest {
                        name: call.function.name,
                        arguments: call.function.arguments,
                    });
                }
            }
            BlockKind::Error => {} // accumulated above
        }
    }

    fn absorb_meta(&mut self, envelope: &BlockEnvelope) {
        if envelope.model.is_some() {
            self.meta.model = envelope.model.clone();
        }
        if envelope.created_at.is_some() {
            self.meta.created_at = envelope.created_at;
        }
    }

    /// Emit block-level frames and reset for the next block
    fn close(&mut self, frames: &mut Vec<StreamFrame>) {
        let block = std::mem::take(self);
        match block.kind {
            BlockKind::Message => {}
            BlockKind::ToolCalls if block.tool_calls.is_empty() => {
                warn!("tool_calls block carried no usable calls, ignoring");
            }
            BlockKind::ToolCalls => frames.push(StreamFrame::ToolCalls {
                meta: block.meta,
                calls: block.tool_calls,
            }),
            BlockKind::Error => {
                let message = if block.error_text.is_empty() {
                    GENERIC_BACKEND_ERROR.to_string()
                } else {
                    block.error_text.join("\n")
                };
                frames.push(StreamFrame::Error {
                    meta: block.meta,
                    error: FrameError::Backend { message },
                });
            }
        }
    }
}
