// ABOUTME: Provider-agnostic language model collaborator
// ABOUTME: The pipeline only ever talks to this trait, never to a concrete client

use async_trait::async_trait;

use crate::service::AIServiceResult;

/// One completion call. Provider identity never appears here.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub json_mode: bool,
}

impl CompletionRequest {
    pub fn new(system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            temperature: 0.3,
            max_tokens: 4096,
            json_mode: false,
        }
    }

    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Returns the raw completion text. In JSON mode callers still parse it themselves.
    async fn complete(&self, request: CompletionRequest) -> AIServiceResult<String>;
}

/// Strip markdown code fences if present (```json ... ```)
pub fn strip_code_fences(text: &str) -> &str {
    let cleaned = text.trim();
    if !cleaned.starts_with("```") {
        return cleaned;
    }

    let start = cleaned.find('\n').map(|i| i + 1).unwrap_or(cleaned.len());
    let end = cleaned[start..]
        .rfind("```")
        .map(|i| i + start)
        .unwrap_or(cleaned.len());
    cleaned[start..end].trim()
}
