use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

use balcao_core::config::WhatsAppConfig;

/// Reply buttons are limited to three per message, each title to 20 characters.
pub const MAX_REPLY_BUTTONS: usize = 3;
pub const MAX_BUTTON_TITLE_CHARS: usize = 20;
const MAX_BODY_CHARS: usize = 4_096;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundMessage {
    pub to: String,
    pub body: String,
    pub quick_replies: Vec<String>,
}

impl OutboundMessage {
    pub fn text(to: impl Into<String>, body: impl Into<String>) -> Self {
        Self { to: to.into(), body: body.into(), quick_replies: Vec::new() }
    }

    pub fn with_quick_replies(mut self, quick_replies: Vec<String>) -> Self {
        self.quick_replies = quick_replies;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendReceipt {
    pub wa_message_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("recipient `{0}` has no digits")]
    InvalidRecipient(String),
    #[error("whatsapp request failed: {0}")]
    Transport(String),
    #[error("whatsapp api returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("whatsapp response could not be decoded: {0}")]
    Decode(String),
}

impl SendError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Api { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS.as_u16() || *status >= 500
            }
            Self::InvalidRecipient(_) | Self::Decode(_) => false,
        }
    }
}

#[async_trait]
pub trait WhatsAppSender: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<SendReceipt, SendError>;
}

/// Used when `whatsapp.send_enabled = false`: replies are stored but never leave the process.
#[derive(Default)]
pub struct NoopSender;

#[async_trait]
impl WhatsAppSender for NoopSender {
    async fn send(&self, message: &OutboundMessage) -> Result<SendReceipt, SendError> {
        info!(
            event_name = "whatsapp.send.skipped",
            to = %message.to,
            "whatsapp sending disabled; reply kept local"
        );
        Ok(SendReceipt { wa_message_id: None })
    }
}

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 2, base_delay_ms: 300, max_delay_ms: 3_000 }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self { max_retries: 0, base_delay_ms: 0, max_delay_ms: 0 }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let multiplier = 1_u64 << attempt.min(16);
        Duration::from_millis(self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms))
    }
}

/// Sends replies through the Cloud API `/{phone_number_id}/messages` endpoint.
pub struct CloudApiSender {
    client: reqwest::Client,
    endpoint: String,
    access_token: SecretString,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    messages: Vec<SentMessage>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl CloudApiSender {
    pub fn new(config: &WhatsAppConfig) -> Result<Self, SendError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|error| SendError::Transport(error.to_string()))?;
        Ok(Self {
            client,
            endpoint: messages_endpoint(
                &config.api_base_url,
                &config.api_version,
                &config.phone_number_id,
            ),
            access_token: config.access_token.clone(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post_once(&self, body: &Value) -> Result<SendReceipt, SendError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.access_token.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|error| SendError::Transport(error.to_string()))?;

        let status = response.status();
        let raw = response.text().await.map_err(|error| SendError::Transport(error.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&raw)
                .map(|parsed| parsed.error.message)
                .unwrap_or(raw);
            return Err(SendError::Api { status: status.as_u16(), message });
        }

        let parsed: SendResponse =
            serde_json::from_str(&raw).map_err(|error| SendError::Decode(error.to_string()))?;
        Ok(SendReceipt { wa_message_id: parsed.messages.into_iter().next().map(|m| m.id) })
    }
}

#[async_trait]
impl WhatsAppSender for CloudApiSender {
    async fn send(&self, message: &OutboundMessage) -> Result<SendReceipt, SendError> {
        let body = build_request_body(message)?;

        let mut attempt = 0;
        loop {
            match self.post_once(&body).await {
                Ok(receipt) => {
                    info!(
                        event_name = "whatsapp.send.accepted",
                        to = %message.to,
                        wa_message_id = receipt.wa_message_id.as_deref().unwrap_or(""),
                        attempt,
                        "whatsapp message accepted"
                    );
                    return Ok(receipt);
                }
                Err(error) if error.is_retryable() && attempt < self.retry.max_retries => {
                    warn!(
                        event_name = "whatsapp.send.retry",
                        attempt,
                        max_retries = self.retry.max_retries,
                        error = %error,
                        "whatsapp send failed; retrying"
                    );
                    let delay = self.retry.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

pub fn messages_endpoint(base_url: &str, api_version: &str, phone_number_id: &str) -> String {
    format!(
        "{}/{}/{}/messages",
        base_url.trim_end_matches('/'),
        api_version.trim_matches('/'),
        phone_number_id.trim()
    )
}

/// Strips formatting from a phone number, keeping only digits.
pub fn normalize_recipient(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    (!digits.is_empty()).then_some(digits)
}

/// Builds the Cloud API request. Up to three short quick replies become reply
/// buttons; anything else is appended to the text as a numbered list.
pub fn build_request_body(message: &OutboundMessage) -> Result<Value, SendError> {
    let to = normalize_recipient(&message.to)
        .ok_or_else(|| SendError::InvalidRecipient(message.to.clone()))?;
    let body = truncate(&message.body, MAX_BODY_CHARS);

    if fits_reply_buttons(&message.quick_replies) {
        let buttons: Vec<Value> = message
            .quick_replies
            .iter()
            .enumerate()
            .map(|(index, title)| {
                json!({"type": "reply", "reply": {"id": format!("qr_{index}"), "title": title}})
            })
            .collect();
        return Ok(json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": to,
            "type": "interactive",
            "interactive": {
                "type": "button",
                "body": {"text": body},
                "action": {"buttons": buttons}
            }
        }));
    }

    let text = if message.quick_replies.is_empty() {
        body
    } else {
        let options: Vec<String> = message
            .quick_replies
            .iter()
            .enumerate()
            .map(|(index, option)| format!("{}. {option}", index + 1))
            .collect();
        truncate(&format!("{body}\n\n{}", options.join("\n")), MAX_BODY_CHARS)
    };

    Ok(json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": to,
        "type": "text",
        "text": {"preview_url": false, "body": text}
    }))
}

fn fits_reply_buttons(quick_replies: &[String]) -> bool {
    (1..=MAX_REPLY_BUTTONS).contains(&quick_replies.len())
        && quick_replies.iter().all(|title| {
            let chars = title.trim().chars().count();
            chars > 0 && chars <= MAX_BUTTON_TITLE_CHARS
        })
}

fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect()
}
