// ABOUTME: Application wiring for the CLI
// ABOUTME: Connects the SQLite record store, Anthropic client and prompt catalog into the pipeline managers

use std::sync::Arc;

use docforge_ai::{AIService, LanguageModel};
use docforge_config::PipelineConfig;
use docforge_pipeline::{DocumentManager, WorkspaceManager};
use docforge_prompts::PromptManager;
use docforge_storage::{SqliteStore, Store};
use tracing::{debug, warn};

use crate::error::CliResult;

pub struct AppContext {
    pub config: PipelineConfig,
    pub documents: Arc<DocumentManager>,
    pub workspaces: WorkspaceManager,
}

impl AppContext {
    /// Wire the production collaborators described by `config`
    pub async fn open(config: PipelineConfig) -> CliResult<Self> {
        if config.database_url.is_none() {
            tokio::fs::create_dir_all(&config.data_dir).await?;
        }
        let store = SqliteStore::connect(&config.database_url()).await?;

        if config.api_key.is_none() {
            warn!("No API key configured; commands that call the model will fail");
        }
        let model = AIService::new(config.api_key.clone(), config.model.clone()).with_timeout(config.model_timeout);

        Self::with_parts(config, Arc::new(store), Arc::new(model))
    }

    /// Wire arbitrary collaborators, e.g. an in-memory store
    pub fn with_parts(
        config: PipelineConfig,
        store: Arc<dyn Store>,
        model: Arc<dyn LanguageModel>,
    ) -> CliResult<Self> {
        let prompts = PromptManager::new(config.prompts_dir.as_deref())?;
        debug!("Loaded prompt catalog (overrides: {:?})", config.prompts_dir);

        let documents = Arc::new(DocumentManager::new(store, model, prompts, &config));
        let workspaces = WorkspaceManager::new(documents.clone());

        Ok(Self {
            config,
            documents,
            workspaces,
        })
    }
}
