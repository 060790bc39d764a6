//! Outbound side of the bot: the Messenger Send API client.

use async_trait::async_trait;
use gopherbot_core::config::{AppConfig, DEFAULT_API_BASE};
use gopherbot_core::types::{Message, Response, SendResponse, User};
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SendError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Anything that can deliver a message to a Messenger user.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, recipient_id: &str, message: Message) -> Result<SendResponse, SendError>;
}

#[derive(Clone)]
pub struct MessengerClient {
    token: String,
    api_base: String,
    client: Client,
}

impl MessengerClient {
    pub fn new(token: String, api_base: Option<String>, timeout: Duration) -> Result<Self, SendError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SendError::Config(e.to_string()))?;

        Ok(Self {
            token,
            api_base: api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            client,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, SendError> {
        Self::new(
            config.page_access_token.clone(),
            Some(config.api_base.clone()),
            Duration::from_secs(config.send_timeout_secs),
        )
    }

    fn endpoint(&self) -> String {
        format!("{}/me/messages", self.api_base.trim_end_matches('/'))
    }
}

#[async_trait]
impl MessageSender for MessengerClient {
    async fn send(&self, recipient_id: &str, message: Message) -> Result<SendResponse, SendError> {
        let envelope = Response {
            recipient: User::new(recipient_id),
            message,
        };

        // `.json` sets `Content-Type: application/json`.
        let res = self
            .client
            .post(self.endpoint())
            .query(&[("access_token", self.token.as_str())])
            .json(&envelope)
            .send()
            .await
            // The URL carries the access token; keep it out of error messages.
            .map_err(|e| SendError::Network(e.without_url().to_string()))?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| SendError::Network(e.without_url().to_string()))?;

        if !status.is_success() {
            debug!(to = %recipient_id, %status, body = %body, "Send API rejected message");
            return Err(SendError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let response: SendResponse = serde_json::from_str(&body)
            .map_err(|e| SendError::Decode(format!("Failed to parse response: {}", e)))?;

        debug!(
            to = %recipient_id,
            message_id = %response.message_id,
            attachment_id = ?response.attachment_id,
            "Send API accepted message"
        );
        Ok(response)
    }
}
