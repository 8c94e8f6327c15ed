use async_trait::async_trait;
use autodm_core::channel::{truncate_chars, MessageSender, SendError, SendReceipt, MAX_MESSAGE_CHARS};
use autodm_core::config::AppConfig;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const CHANNEL_INSTAGRAM: &str = "instagram";

/// Sends DMs through `POST {api_base}/{version}/{account_id}/messages`.
#[derive(Clone)]
pub struct GraphClient {
    client: Client,
    endpoint: String,
    token: String,
    max_chars: usize,
}

impl GraphClient {
    pub fn new(endpoint: String, token: String, timeout: Duration, max_chars: usize) -> Result<Self, SendError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SendError::NotConfigured(format!("http client: {}", e)))?;
        Ok(Self {
            client,
            endpoint,
            token,
            max_chars: if max_chars == 0 { MAX_MESSAGE_CHARS } else { max_chars },
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, SendError> {
        Self::new(
            config.messages_endpoint(),
            config.access_token.clone(),
            Duration::from_secs(config.send_timeout_secs.max(1)),
            config.max_message_chars,
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Request body for one reply, text already cut to the platform limit.
    pub fn outbound_payload(&self, recipient_id: &str, text: &str) -> Value {
        json!({
            "recipient": { "id": recipient_id },
            "message": { "text": truncate_chars(text, self.max_chars) }
        })
    }
}

/// Pulls `error.code` / `error.message` out of a Graph API error body.
fn api_error(status: StatusCode, body: &str) -> SendError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let error = parsed.as_ref().and_then(|v| v.get("error"));
    let code = match error.and_then(|e| e.get("code")) {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.clone(),
        _ => "unknown".to_string(),
    };
    let message = error
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string());
    SendError::Api {
        status: status.as_u16(),
        code,
        message,
    }
}

#[async_trait]
impl MessageSender for GraphClient {
    fn name(&self) -> &str {
        CHANNEL_INSTAGRAM
    }

    async fn send_text(&self, recipient_id: &str, text: &str) -> Result<SendReceipt, SendError> {
        if self.token.is_empty() {
            return Err(SendError::NotConfigured("missing access token".to_string()));
        }

        let payload = self.outbound_payload(recipient_id, text);
        debug!(to = %recipient_id, endpoint = %self.endpoint, "sending Instagram DM");

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SendError::Timeout
                } else {
                    SendError::Network(e.to_string())
                }
            })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| {
            if e.is_timeout() {
                SendError::Timeout
            } else {
                SendError::InvalidResponse(e.to_string())
            }
        })?;

        if status != StatusCode::OK {
            let err = api_error(status, &body);
            warn!(to = %recipient_id, %status, error = %err, "Instagram outbound failed");
            return Err(err);
        }

        let parsed: Value = serde_json::from_str(&body)
            .map_err(|e| SendError::InvalidResponse(format!("{}: {}", e, body)))?;
        let message_id = parsed
            .get("message_id")
            .and_then(Value::as_str)
            .map(str::to_string);

        info!(
            to = %recipient_id,
            msg_id = message_id.as_deref().unwrap_or("unknown"),
            "Instagram outbound sent"
        );
        Ok(SendReceipt { message_id })
    }
}
