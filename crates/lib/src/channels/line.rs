//! LINE channel: message content download plus reply/push via the Messaging API.

use crate::channels::inbound::ReplyToken;
use crate::channels::messenger::{ChannelError, Messenger};
use crate::config::{LineConfig, Secrets};
use async_trait::async_trait;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct TextMessage<'a> {
    #[serde(rename = "type")]
    typ: &'static str,
    text: &'a str,
}

impl<'a> TextMessage<'a> {
    fn new(text: &'a str) -> Self {
        Self { typ: "text", text }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplyRequest<'a> {
    reply_token: &'a str,
    messages: [TextMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct PushRequest<'a> {
    to: &'a str,
    messages: [TextMessage<'a>; 1],
}

/// LINE Messaging API client.
#[derive(Clone)]
pub struct LineChannel {
    api_base: String,
    data_api_base: String,
    access_token: Option<String>,
    client: reqwest::Client,
}

impl LineChannel {
    pub fn new(config: &LineConfig, secrets: &Secrets) -> Self {
        Self::with_client(config, secrets, reqwest::Client::new())
    }

    pub fn with_client(config: &LineConfig, secrets: &Secrets, client: reqwest::Client) -> Self {
        Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            data_api_base: config.data_api_base.trim_end_matches('/').to_string(),
            access_token: secrets.line_access_token.clone(),
            client,
        }
    }

    fn token(&self) -> Result<&str, ChannelError> {
        self.access_token
            .as_deref()
            .ok_or(ChannelError::NotConfigured)
    }

    /// GET /v2/bot/message/{id}/content on the data API host.
    pub async fn get_content(&self, message_id: &str) -> Result<Vec<u8>, ChannelError> {
        let token = self.token()?;
        let url = format!(
            "{}/v2/bot/message/{}/content",
            self.data_api_base, message_id
        );
        let res = self.client.get(&url).bearer_auth(token).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ChannelError::Api(format!("content {} {}", status, body)));
        }
        Ok(res.bytes().await?.to_vec())
    }

    /// POST /v2/bot/message/reply with a single text message.
    pub async fn send_reply(&self, reply_token: &str, text: &str) -> Result<(), ChannelError> {
        let body = ReplyRequest {
            reply_token,
            messages: [TextMessage::new(text)],
        };
        self.post("/v2/bot/message/reply", &body).await
    }

    /// POST /v2/bot/message/push with a single text message.
    pub async fn send_push(&self, user_id: &str, text: &str) -> Result<(), ChannelError> {
        let body = PushRequest {
            to: user_id,
            messages: [TextMessage::new(text)],
        };
        self.post("/v2/bot/message/push", &body).await
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<(), ChannelError> {
        let token = self.token()?;
        let url = format!("{}{}", self.api_base, path);
        let res = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ChannelError::Api(format!("{} {} {}", path, status, body)));
        }
        Ok(())
    }
}

#[async_trait]
impl Messenger for LineChannel {
    async fn fetch_content(&self, message_id: &str) -> Result<Vec<u8>, ChannelError> {
        self.get_content(message_id).await
    }

    async fn reply(&self, token: ReplyToken, text: &str) -> Result<(), ChannelError> {
        self.send_reply(token.as_str(), text).await
    }

    async fn push(&self, user_id: &str, text: &str) -> Result<(), ChannelError> {
        self.send_push(user_id, text).await
    }
}
