// ABOUTME: Error types for the pipeline package
// ABOUTME: Every error maps to a caller-visible kind that drives retry and reporting decisions

use docforge_ai::AIServiceError;
use docforge_prompts::PromptError;
use docforge_storage::StorageError;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Unknown section key: {0}")]
    UnknownSection(String),

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Workspace not found: {0}")]
    WorkspaceNotFound(String),

    #[error("Version {version} not found for document {document_id}")]
    VersionNotFound { document_id: String, version: u32 },

    #[error("External call failed: {0}")]
    ExternalCall(String),

    #[error("Model call timed out after {0} seconds")]
    Timeout(u64),

    #[error("Failed to parse model output: {0}")]
    Parse(String),

    #[error("Merge conflict: {0}")]
    MergeConflict(String),

    #[error("Corrupt {kind} record '{id}': {reason}")]
    CorruptRecord {
        kind: String,
        id: String,
        reason: String,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Caller-facing taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    ExternalCall,
    Parse,
    MergeConflict,
    NotFound,
    Storage,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Validation(_)
            | PipelineError::InvalidState(_)
            | PipelineError::UnknownSection(_)
            | PipelineError::CorruptRecord { .. }
            | PipelineError::Prompt(_) => ErrorKind::Validation,
            PipelineError::DocumentNotFound(_)
            | PipelineError::WorkspaceNotFound(_)
            | PipelineError::VersionNotFound { .. } => ErrorKind::NotFound,
            PipelineError::ExternalCall(_) | PipelineError::Timeout(_) => ErrorKind::ExternalCall,
            PipelineError::Parse(_) => ErrorKind::Parse,
            PipelineError::MergeConflict(_) => ErrorKind::MergeConflict,
            PipelineError::Storage(_) | PipelineError::Serialization(_) | PipelineError::Io(_) => {
                ErrorKind::Storage
            }
        }
    }

    /// Transient and parse failures get one more attempt; nothing else does
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::ExternalCall(_) | PipelineError::Timeout(_) | PipelineError::Parse(_)
        )
    }
}

impl From<AIServiceError> for PipelineError {
    fn from(err: AIServiceError) -> Self {
        match err {
            AIServiceError::Timeout(secs) => PipelineError::Timeout(secs),
            AIServiceError::ParseError(msg) => PipelineError::Parse(msg),
            AIServiceError::InvalidResponse => PipelineError::Parse("empty model response".to_string()),
            AIServiceError::NoApiKey => {
                PipelineError::Validation("No API key configured for the language model".to_string())
            }
            AIServiceError::HttpStatus { status, body } if status != 429 && status < 500 => {
                PipelineError::Validation(format!("Model request rejected ({}): {}", status, body))
            }
            other => PipelineError::ExternalCall(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(PipelineError::InvalidState("done".into()).kind(), ErrorKind::Validation);
        assert_eq!(PipelineError::UnknownSection("x".into()).kind(), ErrorKind::Validation);
        assert_eq!(PipelineError::Timeout(3).kind(), ErrorKind::ExternalCall);
        assert_eq!(PipelineError::Parse("bad".into()).kind(), ErrorKind::Parse);
        assert_eq!(PipelineError::DocumentNotFound("d".into()).kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_retryable() {
        assert!(PipelineError::Timeout(3).is_retryable());
        assert!(PipelineError::Parse("bad".into()).is_retryable());
        assert!(!PipelineError::Validation("nope".into()).is_retryable());
        assert!(!PipelineError::MergeConflict("bug".into()).is_retryable());
    }

    #[test]
    fn test_ai_error_mapping() {
        let err: PipelineError = AIServiceError::HttpStatus { status: 503, body: "busy".into() }.into();
        assert!(err.is_retryable());

        let err: PipelineError = AIServiceError::HttpStatus { status: 401, body: "bad key".into() }.into();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err: PipelineError = AIServiceError::NoApiKey.into();
        assert!(!err.is_retryable());
    }
}
