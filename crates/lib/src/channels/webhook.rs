//! Webhook envelope routing: `{ "events": [...] }` into a lazy sequence of [`InboundEvent`]s.

use crate::channels::inbound::{
    EventKind, InboundEvent, MessageType, ReplyToken, UNKNOWN_USER,
};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
#[error("malformed webhook payload: {0}")]
pub struct MalformedPayload(#[from] serde_json::Error);

#[derive(Debug, Deserialize)]
struct Envelope {
    events: Vec<serde_json::Value>,
}

/// LINE webhook event (only the fields the pipeline reads).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookEvent {
    #[serde(rename = "type")]
    typ: String,
    #[serde(default)]
    reply_token: Option<String>,
    #[serde(default)]
    source: Option<EventSource>,
    #[serde(default)]
    message: Option<EventMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventSource {
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventMessage {
    #[serde(rename = "type")]
    typ: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

impl From<WebhookEvent> for InboundEvent {
    fn from(e: WebhookEvent) -> Self {
        let source_user_id = e
            .source
            .and_then(|s| s.user_id)
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| UNKNOWN_USER.to_string());
        let (message_type, message_id, text) = match e.message {
            Some(m) => (Some(MessageType::parse(&m.typ)), m.id, m.text),
            None => (None, None, None),
        };
        InboundEvent {
            kind: EventKind::parse(&e.typ),
            source_user_id,
            message_type,
            message_id,
            reply_token: e.reply_token.filter(|t| !t.is_empty()).map(ReplyToken::new),
            text,
        }
    }
}

/// Events of one payload, in order. Entries that are not readable events are skipped with a log line.
#[derive(Debug)]
pub struct Events {
    inner: std::vec::IntoIter<serde_json::Value>,
}

impl Events {
    /// Number of raw entries not yet consumed (including any that will be skipped).
    pub fn remaining(&self) -> usize {
        self.inner.len()
    }
}

impl Iterator for Events {
    type Item = InboundEvent;

    fn next(&mut self) -> Option<InboundEvent> {
        loop {
            let raw = self.inner.next()?;
            match serde_json::from_value::<WebhookEvent>(raw) {
                Ok(e) => return Some(e.into()),
                Err(e) => log::warn!("[ERROR in route] skipping unreadable event: {}", e),
            }
        }
    }
}

/// Parse a webhook body. Fails when the body is not JSON or has no `events` array.
pub fn route(payload: &[u8]) -> Result<Events, MalformedPayload> {
    let envelope: Envelope = serde_json::from_slice(payload)?;
    Ok(Events {
        inner: envelope.events.into_iter(),
    })
}
