use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::protocol::{Message, Role};

/// Append-only message history owned by one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Create conversation with specific ID (for resuming a stored one)
    pub fn with_id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    /// Seed history; tool-result messages never belong to a conversation and are dropped
    pub fn from_messages(messages: Vec<Message>) -> Self {
        let mut conversation = Self::new();
        for msg in messages {
            if msg.role == Role::Tool {
                warn!("Dropping tool-result message from seeded history");
                continue;
            }
            conversation.messages.push(msg);
        }
        conversation
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub(crate) fn append(&mut self, msg: Message) {
        self.messages.push(msg);
        self.updated_at = Utc::now();
    }
}
