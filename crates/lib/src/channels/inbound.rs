//! Inbound event from the messaging platform: one entry of the webhook `events` array.

use std::fmt;

/// User id recorded when the event carries no `source.userId`.
pub const UNKNOWN_USER: &str = "unknown";

/// Top-level event type. Only `message` events are acted on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Message,
    Other(String),
}

impl EventKind {
    pub fn parse(s: &str) -> Self {
        match s {
            "message" => EventKind::Message,
            other => EventKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Message => "message",
            EventKind::Other(s) => s,
        }
    }
}

/// Message content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageType {
    Text,
    Image,
    Other(String),
}

impl MessageType {
    pub fn parse(s: &str) -> Self {
        match s {
            "text" => MessageType::Text,
            "image" => MessageType::Image,
            other => MessageType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::Other(s) => s,
        }
    }
}

/// Single-use reply credential. Not `Clone`: sending a reply consumes it.
#[derive(PartialEq, Eq)]
pub struct ReplyToken(String);

impl ReplyToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ReplyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ReplyToken(..)")
    }
}

/// One webhook event. Lives only for the duration of its dispatch.
#[derive(Debug)]
pub struct InboundEvent {
    pub kind: EventKind,
    pub source_user_id: String,
    /// None when a message event has no `message` object.
    pub message_type: Option<MessageType>,
    pub message_id: Option<String>,
    pub reply_token: Option<ReplyToken>,
    /// Text body of text messages (logged only).
    pub text: Option<String>,
}
