// ABOUTME: Language-model integration for the document pipeline
// ABOUTME: Collaborator trait plus the Anthropic Messages API client that implements it

pub mod model;
pub mod service;

pub use model::{strip_code_fences, CompletionRequest, LanguageModel};
pub use service::{AIResponse, AIService, AIServiceError, AIServiceResult, Usage};
