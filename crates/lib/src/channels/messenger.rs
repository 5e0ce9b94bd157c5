//! Outbound side of the channel: what the pipeline needs from the messaging platform.

use crate::channels::inbound::ReplyToken;
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("line request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("line api error: {0}")]
    Api(String),
    #[error("line access token not configured")]
    NotConfigured,
}

/// Messaging platform operations. Callers treat reply and push as fire-and-forget: failures are
/// logged, never retried.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Download the binary content of a message (e.g. an image).
    async fn fetch_content(&self, message_id: &str) -> Result<Vec<u8>, ChannelError>;

    /// Answer an event once through its reply token. The token is consumed.
    async fn reply(&self, token: ReplyToken, text: &str) -> Result<(), ChannelError>;

    /// Send a message to a user at any time.
    async fn push(&self, user_id: &str, text: &str) -> Result<(), ChannelError>;
}
