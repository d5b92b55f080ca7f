use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Message role in conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    /// Carries a tool result back to the backend; never kept in a conversation
    Tool,
}

/// Where an image block's pixels come from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImageSource {
    Url { url: String },
    Bytes { data: Vec<u8>, media_type: String },
}

/// One block of a multi-part message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Image { source: ImageSource },
}

/// Message body - plain text or ordered blocks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl Content {
    /// Text of the message; text blocks are joined with newlines
    pub fn extract_text(&self) -> String {
        match self {
            Content::Text(text) => text.clone(),
            Content::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    ContentBlock::Image { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Image sources in block order
    pub fn images(&self) -> Vec<&ImageSource> {
        match self {
            Content::Text(_) => Vec::new(),
            Content::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Image { source } => Some(source),
                    ContentBlock::Text { .. } => None,
                })
                .collect(),
        }
    }
}

/// Conversation message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: Content,
}

impl Message {
    pub fn user(text: &str) -> Self {
        Self {
            role: Role::User,
            content: Content::Text(text.to_string()),
        }
    }

    pub fn user_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::User,
            content: Content::Blocks(blocks),
        }
    }

    pub fn assistant(text: &str) -> Self {
        Self {
            role: Role::Assistant,
            content: Content::Text(text.to_string()),
        }
    }

    /// Synthetic message carrying a tool's output to the backend
    pub fn tool_result(output: &str) -> Self {
        Self {
            role: Role::Tool,
            content: Content::Text(output.to_string()),
        }
    }
}

// ============================================================================
// Tool schemas
// ============================================================================

/// One named parameter of a tool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParameterProperty {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
}

impl ParameterProperty {
    pub fn string(description: &str) -> Self {
        Self {
            kind: "string".to_string(),
            description: description.to_string(),
            enum_values: None,
        }
    }

    pub fn with_enum(mut self, values: &[&str]) -> Self {
        self.enum_values = Some(values.iter().map(|v| v.to_string()).collect());
        self
    }
}

/// JSON-schema object describing a tool's named parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolParameters {
    #[serde(rename = "type")]
    pub kind: String,
    pub properties: BTreeMap<String, ParameterProperty>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub required: BTreeSet<String>,
}

impl Default for ToolParameters {
    fn default() -> Self {
        Self {
            kind: "object".to_string(),
            properties: BTreeMap::new(),
            required: BTreeSet::new(),
        }
    }
}

/// Tool schema advertised to the backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<ToolParameters>,
}

impl ToolSchema {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters: None,
        }
    }

    /// Add a parameter, creating the parameters object on first use
    pub fn with_parameter(mut self, name: &str, property: ParameterProperty, required: bool) -> Self {
        let params = self.parameters.get_or_insert_with(ToolParameters::default);
        params.properties.insert(name.to_string(), property);
        if required {
            params.required.insert(name.to_string());
        }
        self
    }
}

// ============================================================================
// Stream frames
// ============================================================================

/// Tool invocation requested by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallRequest {
    pub name: String,
    pub arguments: HashMap<String, String>,
}

impl ToolCallRequest {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            arguments: HashMap::new(),
        }
    }

    pub fn with_argument(mut self, name: &str, value: &str) -> Self {
        self.arguments.insert(name.to_string(), value.to_string());
        self
    }

    /// Arguments in `order`; names the backend left out are skipped, not defaulted
    pub fn positional(&self, order: &[String]) -> Vec<String> {
        order
            .iter()
            .filter_map(|name| self.arguments.get(name).cloned())
            .collect()
    }
}

/// Backend metadata attached to every frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameMeta {
    pub model: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Why a frame is an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// A single line or data entry was not valid JSON for its shape
    Decode { raw: String, reason: String },
    /// The backend itself reported a failure
    Backend { message: String },
}

impl FrameError {
    /// Decode failures are local to one line; backend errors end the submission
    pub fn is_terminal(&self) -> bool {
        matches!(self, FrameError::Backend { .. })
    }
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::Decode { raw, reason } => {
                write!(f, "could not decode `{raw}`: {reason}")
            }
            FrameError::Backend { message } => write!(f, "{message}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Message,
    ToolCalls,
    Error,
}

/// One decoded unit of a response stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFrame {
    Message {
        meta: FrameMeta,
        content: String,
    },
    ToolCalls {
        meta: FrameMeta,
        calls: Vec<ToolCallRequest>,
    },
    Error {
        meta: FrameMeta,
        error: FrameError,
    },
}

impl StreamFrame {
    pub fn kind(&self) -> FrameKind {
        match self {
            StreamFrame::Message { .. } => FrameKind::Message,
            StreamFrame::ToolCalls { .. } => FrameKind::ToolCalls,
            StreamFrame::Error { .. } => FrameKind::Error,
        }
    }

    pub fn meta(&self) -> &FrameMeta {
        match self {
            StreamFrame::Message { meta, .. }
            | StreamFrame::ToolCalls { meta, .. }
            | StreamFrame::Error { meta, .. } => meta,
        }
    }

    pub fn content(&self) -> Option<&str> {
        match self {
            StreamFrame::Message { content, .. } => Some(content),
            _ => None,
        }
    }

    pub fn tool_calls(&self) -> Option<&[ToolCallRequest]> {
        match self {
            StreamFrame::ToolCalls { calls, .. } => Some(calls),
            _ => None,
        }
    }
}

// ============================================================================
// Lenient field decoding shared by both wire modes
// ============================================================================

/// Timestamps that fail to parse become `None` instead of failing the line
pub(crate) fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc)))
}

/// Tool arguments as a string map; non-string JSON values keep their JSON text.
/// Some backends send the object JSON-encoded inside a string.
pub(crate) fn string_arguments<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let object = match value {
        Value::Null => return Ok(HashMap::new()),
        Value::Object(map) => map,
        Value::String(encoded) => match serde_json::from_str::<Value>(&encoded) {
            Ok(Value::Object(map)) => map,
            _ => {
                return Err(serde::de::Error::custom(
                    "tool arguments string is not a JSON object",
                ))
            }
        },
        other => {
            return Err(serde::de::Error::custom(format!(
                "tool arguments must be an object, got {other}"
            )))
        }
    };

    Ok(object
        .into_iter()
        .map(|(k, v)| {
            let v = match v {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (k, v)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_skips_missing_arguments() {
        let call = ToolCallRequest::new("get_weather").with_argument("longitude", "2.0");
        let order = vec!["latitude".to_string(), "longitude".to_string()];
        assert_eq!(call.positional(&order), vec!["2.0".to_string()]);
    }

    #[test]
    fn test_positional_follows_declared_order() {
        let call = ToolCallRequest::new("get_weather")
            .with_argument("longitude", "2.0")
            .with_argument("latitude", "1.0")
            .with_argument("unused", "x");
        let order = vec!["latitude".to_string(), "longitude".to_string()];
        assert_eq!(call.positional(&order), vec!["1.0", "2.0"]);
    }

    #[test]
    fn test_blocks_extract_text_and_images() {
        let msg = Message::user_blocks(vec![
            ContentBlock::Image {
                source: ImageSource::Url {
                    url: "https://example.com/img1.jpg".into(),
                },
            },
            ContentBlock::Text {
                text: "How is this outfit?".into(),
            },
        ]);
        assert_eq!(msg.content.extract_text(), "How is this outfit?");
        assert_eq!(msg.content.images().len(), 1);
    }

    #[test]
    fn test_schema_builder_marks_required() {
        let schema = ToolSchema::new("get_weather", "Get current temperature")
            .with_parameter("latitude", ParameterProperty::string("lat"), true)
            .with_parameter(
                "unit",
                ParameterProperty::string("unit").with_enum(&["c", "f"]),
                false,
            );
        let params = schema.parameters.unwrap();
        assert_eq!(params.kind, "object");
        assert!(params.required.contains("latitude"));
        assert!(!params.required.contains("unit"));
        assert_eq!(
            params.properties["unit"].enum_values.as_deref(),
            Some(&["c".to_string(), "f".to_string()][..])
        );
    }

    #[test]
    fn test_decode_error_is_not_terminal() {
        let decode = FrameError::Decode {
            raw: "x".into(),
            reason: "bad".into(),
        };
        let backend = FrameError::Backend {
            message: "model not found".into(),
        };
        assert!(!decode.is_terminal());
        assert!(backend.is_terminal());
    }
}
