use base64::Engine;
use serde::ser::{Serialize, Serializer};
use serde_json::Value;

use super::types::{ImageSource, Message, Role, ToolSchema};

/// Request envelope sent for every round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub model: Option<String>,
    pub messages: Vec<Message>,
    /// Only set on the first request of a submission
    pub tools: Option<Vec<ToolSchema>>,
}

impl ChatRequest {
    /// First request of a submission: full history plus every tool schema
    pub fn initial(model: Option<String>, messages: Vec<Message>, tools: Vec<ToolSchema>) -> Self {
        Self {
            model,
            messages,
            tools: if tools.is_empty() { None } else { Some(tools) },
        }
    }

    /// Tool-result round: only the tool messages, never any schemas
    pub fn follow_up(model: Option<String>, tool_results: Vec<Message>) -> Self {
        Self {
            model,
            messages: tool_results,
            tools: None,
        }
    }

    pub fn advertises_tools(&self) -> bool {
        self.tools.is_some()
    }

    pub fn has_remote_images(&self) -> bool {
        self.messages.iter().any(|m| {
            m.content
                .images()
                .iter()
                .any(|src| matches!(src, ImageSource::Url { .. }))
        })
    }

    /// Wire JSON for logging and fixtures
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[derive(serde::Serialize)]
struct WireRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: Vec<WireMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool<'a>>>,
}

#[derive(serde::Serialize)]
struct WireMessage {
    role: Role,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

#[derive(serde::Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: &'a ToolSchema,
}

impl From<&Message> for WireMessage {
    fn from(msg: &Message) -> Self {
        let images = msg
            .content
            .images()
            .into_iter()
            .map(|src| match src {
                ImageSource::Bytes { data, .. } => {
                    base64::engine::general_purpose::STANDARD.encode(data)
                }
                // Unresolved remote images travel as their URL
                ImageSource::Url { url } => url.clone(),
            })
            .collect();
        Self {
            role: msg.role,
            content: msg.content.extract_text(),
            images,
        }
    }
}

impl Serialize for ChatRequest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        WireRequest {
            model: self.model.as_deref(),
            messages: self.messages.iter().map(WireMessage::from).collect(),
            stream: true,
            tools: self.tools.as_ref().map(|tools| {
                tools
                    .iter()
                    .map(|function| WireTool {
                        kind: "function",
                        function,
                    })
                    .collect()
            }),
        }
        .serialize(serializer)
    }
}
