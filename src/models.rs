//! Data models and structures used throughout the application

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(role: &str) -> Option<Role> {
        match role {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// Represents a single chat message in the conversation.
///
/// `content` and `thinking` are independently growable text fields; both
/// start empty and are only mutated through the message store while the
/// message is the most recent one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub thinking: String,
    pub timestamp: String,
}

static MESSAGE_SEQ: AtomicU64 = AtomicU64::new(0);

impl ChatMessage {
    /// Creates a message with a fresh opaque id and an RFC 3339 timestamp.
    pub fn new(role: Role, content: &str) -> Self {
        let seq = MESSAGE_SEQ.fetch_add(1, Ordering::Relaxed);
        Self {
            id: format!("msg_{}_{}", chrono::Utc::now().timestamp_millis(), seq),
            role,
            content: content.to_string(),
            thinking: String::new(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// One decoded event from the backend's SSE stream.
///
/// This is the closed union the rest of the client works with; raw wire
/// JSON never escapes the classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Full reasoning text so far, not a delta
    Thinking(String),
    /// Incremental fragment of the final answer
    ContentDelta(String),
    /// Explicit end of the stream, with the backend's finish reason if any
    Finish { reason: Option<String> },
    /// Error reported by the backend inside the stream
    Error(String),
}
