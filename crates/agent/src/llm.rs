use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use balcao_core::config::{LlmConfig, LlmProvider};

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

/// One chat completion call. `model` overrides the configured default.
#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self { system: system.into(), messages, model: None, temperature: 0.7, max_tokens: 600 }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model.filter(|model| !model.trim().is_empty());
        self
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("llm client is not configured: {0}")]
    NotConfigured(String),
    #[error("llm request failed: {0}")]
    Transport(String),
    #[error("llm api returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("llm response could not be decoded: {0}")]
    Decode(String),
    #[error("llm returned an empty completion")]
    EmptyCompletion,
}

impl LlmError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;
}

/// Chat completions over HTTP. OpenAI, xAI and Ollama share the
/// OpenAI-compatible shape; Anthropic uses its messages API.
pub struct HttpLlmClient {
    client: reqwest::Client,
    provider: LlmProvider,
    endpoint: String,
    default_model: String,
    max_retries: u32,
}

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct OpenAiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    system: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicBlock>,
}

#[derive(Debug, Deserialize)]
struct AnthropicBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let api_key = config
            .api_key
            .as_ref()
            .map(|key| key.expose_secret().trim().to_string())
            .filter(|key| !key.is_empty());

        match (config.provider, api_key) {
            (LlmProvider::Anthropic, Some(key)) => {
                headers.insert("x-api-key", header_value(&key)?);
                headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
            }
            (_, Some(key)) => {
                headers.insert(AUTHORIZATION, header_value(&format!("Bearer {key}"))?);
            }
            (provider, None) if provider.requires_api_key() => {
                return Err(LlmError::NotConfigured(format!(
                    "provider `{}` needs llm.api_key",
                    provider.as_str()
                )));
            }
            (_, None) => {}
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| LlmError::NotConfigured(error.to_string()))?;

        Ok(Self {
            client,
            provider: config.provider,
            endpoint: completion_endpoint(config.provider, config.base_url.as_deref()),
            default_model: config.model.clone(),
            max_retries: config.max_retries,
        })
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn complete_once(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let model = request.model.as_deref().unwrap_or(&self.default_model);
        let body = match self.provider {
            LlmProvider::Anthropic => serde_json::to_value(AnthropicRequest {
                model,
                system: &request.system,
                messages: &request.messages,
                temperature: request.temperature,
                max_tokens: request.max_tokens,
            }),
            _ => serde_json::to_value(openai_request(model, request)),
        }
        .map_err(|error| LlmError::Decode(error.to_string()))?;

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|error| LlmError::Transport(error.to_string()))?;

        let status = response.status();
        let raw = response.text().await.map_err(|error| LlmError::Transport(error.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&raw)
                .map(|parsed| parsed.error.message)
                .unwrap_or(raw);
            return Err(LlmError::Api { status: status.as_u16(), message });
        }

        match self.provider {
            LlmProvider::Anthropic => parse_anthropic_response(&raw),
            _ => parse_openai_response(&raw),
        }
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let mut attempt = 0;
        loop {
            match self.complete_once(request).await {
                Ok(text) => return Ok(text),
                Err(error) if error.is_retryable() && attempt < self.max_retries => {
                    warn!(
                        event_name = "llm.completion.retry",
                        provider = self.provider.as_str(),
                        attempt,
                        error = %error,
                        "llm completion failed; retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(250 * (1 << attempt.min(4)))).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

pub fn completion_endpoint(provider: LlmProvider, base_url: Option<&str>) -> String {
    let base = base_url
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .unwrap_or_else(|| provider.default_base_url())
        .trim_end_matches('/');

    match provider {
        LlmProvider::Anthropic => format!("{base}/messages"),
        LlmProvider::Ollama if !base.ends_with("/v1") => format!("{base}/v1/chat/completions"),
        _ => format!("{base}/chat/completions"),
    }
}

fn openai_request<'a>(model: &'a str, request: &'a CompletionRequest) -> OpenAiRequest<'a> {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if !request.system.is_empty() {
        messages.push(OpenAiMessage { role: "system", content: &request.system });
    }
    messages.extend(request.messages.iter().map(|message| OpenAiMessage {
        role: match message.role {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        },
        content: &message.content,
    }));

    OpenAiRequest {
        model,
        messages,
        temperature: request.temperature,
        max_tokens: request.max_tokens,
    }
}

fn parse_openai_response(raw: &str) -> Result<String, LlmError> {
    let parsed: OpenAiResponse =
        serde_json::from_str(raw).map_err(|error| LlmError::Decode(error.to_string()))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or(LlmError::EmptyCompletion)
}

fn parse_anthropic_response(raw: &str) -> Result<String, LlmError> {
    let parsed: AnthropicResponse =
        serde_json::from_str(raw).map_err(|error| LlmError::Decode(error.to_string()))?;
    let text = parsed
        .content
        .into_iter()
        .filter(|block| block.kind == "text")
        .filter_map(|block| block.text)
        .collect::<Vec<_>>()
        .join("");
    let text = text.trim();
    if text.is_empty() {
        return Err(LlmError::EmptyCompletion);
    }
    Ok(text.to_string())
}

fn header_value(value: &str) -> Result<HeaderValue, LlmError> {
    HeaderValue::from_str(value)
        .map_err(|error| LlmError::NotConfigured(format!("invalid api key header: {error}")))
}
