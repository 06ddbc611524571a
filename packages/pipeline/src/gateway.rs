// ABOUTME: Single choke point for language-model calls made by the pipeline engines
// ABOUTME: Applies the caller timeout, retries once on transient or parse failures, and parses JSON

use docforge_ai::{strip_code_fences, CompletionRequest, LanguageModel};
use docforge_prompts::PromptManager;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::error::{PipelineError, Result};

const SYSTEM_PROMPT_ID: &str = "prd";
const STRICT_JSON_PROMPT_ID: &str = "strict_json";

pub struct ModelGateway {
    model: Arc<dyn LanguageModel>,
    prompts: Arc<PromptManager>,
    timeout: Duration,
}

impl ModelGateway {
    pub fn new(model: Arc<dyn LanguageModel>, prompts: Arc<PromptManager>, timeout: Duration) -> Self {
        Self {
            model,
            prompts,
            timeout,
        }
    }

    pub fn prompts(&self) -> &PromptManager {
        &self.prompts
    }

    /// Build a request with the shared analyst persona as system prompt
    pub fn request(&self, user_prompt: String) -> Result<CompletionRequest> {
        let system = self.prompts.get_system_prompt(SYSTEM_PROMPT_ID)?;
        Ok(CompletionRequest::new(system, user_prompt))
    }

    async fn call_once(&self, request: CompletionRequest) -> Result<String> {
        match tokio::time::timeout(self.timeout, self.model.complete(request)).await {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(PipelineError::Timeout(self.timeout.as_secs())),
        }
    }

    /// Free-text completion with one retry on transient failure
    pub async fn complete(&self, operation: &str, request: CompletionRequest) -> Result<String> {
        self.call_with_retry(operation, request, |text| Ok(text.trim().to_string()))
            .await
    }

    /// JSON completion parsed into `T` and checked by `validate`.
    /// A structural failure is retried once at temperature 0 with a strict JSON instruction.
    pub async fn complete_json<T, V>(
        &self,
        operation: &str,
        request: CompletionRequest,
        validate: V,
    ) -> Result<T>
    where
        T: DeserializeOwned,
        V: Fn(&T) -> std::result::Result<(), String>,
    {
        self.call_with_retry(operation, request.json(), |text| {
            let parsed: T = serde_json::from_str(strip_code_fences(text))
                .map_err(|e| PipelineError::Parse(e.to_string()))?;
            validate(&parsed).map_err(PipelineError::Parse)?;
            Ok(parsed)
        })
        .await
    }

    async fn call_with_retry<T, P>(&self, operation: &str, request: CompletionRequest, parse: P) -> Result<T>
    where
        P: Fn(&str) -> Result<T>,
    {
        info!("Model call: {}", operation);
        let first = self
            .call_once(request.clone())
            .await
            .and_then(|text| parse(&text));

        let err = match first {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        let retry_request = match &err {
            PipelineError::Parse(reason) => {
                error!(
                    "Model output for {} did not match the expected structure: {}",
                    operation, reason
                );
                self.strict(request)?
            }
            PipelineError::ExternalCall(_) | PipelineError::Timeout(_) => {
                warn!("Model call for {} failed, retrying once: {}", operation, err);
                request
            }
            _ => {
                error!("Model call for {} failed: {}", operation, err);
                return Err(err);
            }
        };

        match self.call_once(retry_request).await.and_then(|text| parse(&text)) {
            Ok(value) => Ok(value),
            Err(e) => {
                if matches!(e, PipelineError::Parse(_)) {
                    error!("Model output for {} unparseable after retry: {}", operation, e);
                } else {
                    error!("Model call for {} failed after retry: {}", operation, e);
                }
                Err(e)
            }
        }
    }

    fn strict(&self, request: CompletionRequest) -> Result<CompletionRequest> {
        let instruction = self.prompts.get_system_prompt(STRICT_JSON_PROMPT_ID)?;
        let system_prompt = if request.system_prompt.is_empty() {
            instruction
        } else {
            format!("{}\n\n{}", request.system_prompt, instruction)
        };
        Ok(CompletionRequest {
            system_prompt,
            temperature: 0.0,
            ..request
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docforge_ai::{AIServiceError, AIServiceResult};
    use serde::Deserialize;
    use std::sync::Mutex;

    struct Scripted {
        replies: Mutex<Vec<AIServiceResult<String>>>,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl Scripted {
        fn new(replies: Vec<AIServiceResult<String>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LanguageModel for Scripted {
        async fn complete(&self, request: CompletionRequest) -> AIServiceResult<String> {
            self.seen.lock().unwrap().push(request);
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                Err(AIServiceError::InvalidResponse)
            } else {
                replies.remove(0)
            }
        }
    }

    struct Slow;

    #[async_trait]
    impl LanguageModel for Slow {
        async fn complete(&self, _request: CompletionRequest) -> AIServiceResult<String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("late".to_string())
        }
    }

    #[derive(Debug, Deserialize)]
    struct Reply {
        value: u32,
    }

    fn gateway(model: Arc<dyn LanguageModel>, timeout: Duration) -> ModelGateway {
        ModelGateway::new(model, Arc::new(PromptManager::builtin().unwrap()), timeout)
    }

    #[tokio::test]
    async fn test_parse_failure_retries_strict_once() {
        let model = Scripted::new(vec![Ok("not json".into()), Ok("```json\n{\"value\": 7}\n```".into())]);
        let gw = gateway(model.clone(), Duration::from_secs(5));
        let request = gw.request("give me json".into()).unwrap();

        let reply: Reply = gw.complete_json("test", request, |_| Ok(())).await.unwrap();
        assert_eq!(reply.value, 7);
        assert_eq!(model.calls(), 2);

        let seen = model.seen.lock().unwrap();
        assert!(seen[0].json_mode);
        assert_eq!(seen[1].temperature, 0.0);
        assert!(seen[1].system_prompt.contains("exactly one JSON object"));
    }

    #[tokio::test]
    async fn test_second_parse_failure_surfaces_parse_error() {
        let model = Scripted::new(vec![Ok("{}".into()), Ok("{\"value\": \"x\"}".into())]);
        let gw = gateway(model.clone(), Duration::from_secs(5));
        let request = gw.request("json".into()).unwrap();

        let err = gw
            .complete_json::<Reply, _>("test", request, |_| Ok(()))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Parse(_)));
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn test_validation_failure_counts_as_parse_failure() {
        let model = Scripted::new(vec![Ok("{\"value\": 0}".into()), Ok("{\"value\": 3}".into())]);
        let gw = gateway(model.clone(), Duration::from_secs(5));
        let request = gw.request("json".into()).unwrap();

        let reply: Reply = gw
            .complete_json("test", request, |r: &Reply| {
                if r.value == 0 {
                    Err("value must be positive".to_string())
                } else {
                    Ok(())
                }
            })
            .await
            .unwrap();
        assert_eq!(reply.value, 3);
    }

    #[tokio::test]
    async fn test_transient_error_retried_once() {
        let model = Scripted::new(vec![
            Err(AIServiceError::HttpStatus { status: 529, body: "overloaded".into() }),
            Ok("hello".into()),
        ]);
        let gw = gateway(model.clone(), Duration::from_secs(5));
        let text = gw
            .complete("test", CompletionRequest::new("", "hi"))
            .await
            .unwrap();
        assert_eq!(text, "hello");
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn test_non_transient_error_not_retried() {
        let model = Scripted::new(vec![Err(AIServiceError::NoApiKey), Ok("never".into())]);
        let gw = gateway(model.clone(), Duration::from_secs(5));
        let err = gw
            .complete("test", CompletionRequest::new("", "hi"))
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_retryable_external_error() {
        let gw = gateway(Arc::new(Slow), Duration::from_secs(1));
        let err = gw
            .complete("test", CompletionRequest::new("", "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Timeout(1)));
        assert!(err.is_retryable());
    }
}
