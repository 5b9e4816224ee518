//! Chat message model shared by the orchestrator and the completion client.

use crate::infrastructure::entities;

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> ChatMessage {
        ChatMessage {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl From<entities::MessageKind> for Role {
    fn from(kind: entities::MessageKind) -> Self {
        match kind {
            entities::MessageKind::System => Role::System,
            entities::MessageKind::User => Role::User,
            entities::MessageKind::Bot => Role::Assistant,
        }
    }
}

impl From<entities::HistoryEntry> for ChatMessage {
    fn from(entry: entities::HistoryEntry) -> Self {
        Self {
            content: entry.text,
            role: entry.kind.into(),
        }
    }
}
