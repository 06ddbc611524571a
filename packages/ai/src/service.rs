// ABOUTME: Anthropic Messages API client implementing the LanguageModel trait
// ABOUTME: Handles API requests, error classification and token usage logging

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::model::{CompletionRequest, LanguageModel};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Cap the requested max_tokens to what the model family accepts
fn cap_max_tokens_for_model(model: &str, requested: u32) -> u32 {
    let limit = if model.contains("haiku") { 4096 } else { 8192 };
    requested.min(limit)
}

#[derive(Debug, Error)]
pub enum AIServiceError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("API returned {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("No API key configured")]
    NoApiKey,

    #[error("Invalid response format")]
    InvalidResponse,
}

impl AIServiceError {
    /// Whether a second attempt could plausibly succeed
    pub fn is_transient(&self) -> bool {
        match self {
            AIServiceError::RequestFailed(_)
            | AIServiceError::ApiError(_)
            | AIServiceError::Timeout(_) => true,
            AIServiceError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            AIServiceError::ParseError(_)
            | AIServiceError::NoApiKey
            | AIServiceError::InvalidResponse => false,
        }
    }
}

pub type AIServiceResult<T> = Result<T, AIServiceError>;

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

#[derive(Debug)]
pub struct AIResponse<T> {
    pub data: T,
    pub usage: Usage,
}

/// Anthropic client. Constructed explicitly and injected; there is no global instance.
pub struct AIService {
    client: Client,
    api_key: Option<String>,
    model: String,
    api_url: String,
    timeout_secs: u64,
}

impl AIService {
    fn create_client(timeout_secs: u64) -> Client {
        Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|e| {
                error!("Failed to build configured HTTP client, using defaults: {}", e);
                Client::new()
            })
    }

    pub fn new(api_key: Option<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        if api_key.is_none() {
            info!("ANTHROPIC_API_KEY not set - model calls will fail until a key is configured");
        }
        if model != DEFAULT_MODEL {
            info!("Using custom Anthropic model: {}", model);
        }

        Self {
            client: Self::create_client(DEFAULT_TIMEOUT_SECS),
            api_key,
            model,
            api_url: ANTHROPIC_API_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn with_api_key(api_key: String) -> Self {
        Self::new(Some(api_key), DEFAULT_MODEL)
    }

    /// Point the client at a different endpoint (proxies, test servers)
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs().max(1);
        self.client = Self::create_client(self.timeout_secs);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Makes a text generation call to Claude and returns the first content block with usage
    pub async fn generate_text(&self, request: &CompletionRequest) -> AIServiceResult<AIResponse<String>> {
        let api_key = self.api_key.as_ref().ok_or(AIServiceError::NoApiKey)?;

        let body = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: cap_max_tokens_for_model(&self.model, request.max_tokens),
            temperature: request.temperature,
            messages: vec![Message {
                role: "user".to_string(),
                content: request.user_prompt.clone(),
            }],
            system: if request.system_prompt.is_empty() {
                None
            } else {
                Some(request.system_prompt.clone())
            },
        };

        info!(
            "Making Anthropic API request: model={}, max_tokens={}, json_mode={}",
            body.model, body.max_tokens, request.json_mode
        );

        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    error!("Anthropic API request timed out after {} seconds", self.timeout_secs);
                    AIServiceError::Timeout(self.timeout_secs)
                } else if e.is_connect() {
                    error!("Failed to connect to Anthropic API: {}", e);
                    AIServiceError::ApiError(format!("Connection failed: {}", e))
                } else {
                    error!("Anthropic API request failed: {}", e);
                    AIServiceError::RequestFailed(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!("Anthropic API error: {} - {}", status, error_text);
            return Err(AIServiceError::HttpStatus {
                status: status.as_u16(),
                body: error_text,
            });
        }

        let anthropic_response: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| AIServiceError::ParseError(e.to_string()))?;

        let text = anthropic_response
            .content
            .first()
            .ok_or(AIServiceError::InvalidResponse)?
            .text
            .clone();

        debug!(
            "Anthropic usage: input={}, output={}, total={}",
            anthropic_response.usage.input_tokens,
            anthropic_response.usage.output_tokens,
            anthropic_response.usage.total_tokens()
        );

        Ok(AIResponse {
            data: text,
            usage: anthropic_response.usage,
        })
    }
}

#[async_trait]
impl LanguageModel for AIService {
    async fn complete(&self, request: CompletionRequest) -> AIServiceResult<String> {
        let response = self.generate_text(&request).await?;
        Ok(response.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(AIServiceError::Timeout(5).is_transient());
        assert!(AIServiceError::HttpStatus { status: 529, body: String::new() }.is_transient());
        assert!(AIServiceError::HttpStatus { status: 429, body: String::new() }.is_transient());
        assert!(!AIServiceError::HttpStatus { status: 400, body: String::new() }.is_transient());
        assert!(!AIServiceError::NoApiKey.is_transient());
        assert!(!AIServiceError::ParseError("bad".into()).is_transient());
    }

    #[test]
    fn test_max_tokens_cap() {
        assert_eq!(cap_max_tokens_for_model("claude-haiku-4", 10_000), 4096);
        assert_eq!(cap_max_tokens_for_model("claude-sonnet-4", 10_000), 8192);
        assert_eq!(cap_max_tokens_for_model("claude-sonnet-4", 512), 512);
    }
}
