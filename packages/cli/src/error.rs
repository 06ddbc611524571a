// ABOUTME: Error types for the Docforge CLI
// ABOUTME: Wraps configuration, storage, prompt and pipeline failures for command handlers

use docforge_config::ConfigError;
use docforge_pipeline::PipelineError;
use docforge_prompts::PromptError;
use docforge_storage::StorageError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Invalid answers file: {0}")]
    Answers(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CliResult<T> = Result<T, CliError>;
