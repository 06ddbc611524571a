// ABOUTME: Document pipeline orchestration over the record store
// ABOUTME: Each stage is a locked read-modify-write; flags are set only after the stage succeeds

use chrono::Utc;
use docforge_ai::LanguageModel;
use docforge_config::PipelineConfig;
use docforge_core::generate_id;
use docforge_prompts::PromptManager;
use docforge_storage::Store;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::assembly::AssemblyEngine;
use crate::backlog::{Backlog, BacklogEngine};
use crate::diff::{Diff, DiffEngine};
use crate::error::{PipelineError, Result};
use crate::extraction::ExtractionEngine;
use crate::gateway::ModelGateway;
use crate::ingest::{DefaultTextExtractor, Ingestor, SourceFile, TextExtractor};
use crate::language::{Language, LanguageDetector};
use crate::locks::LockRegistry;
use crate::merge::merge_extractions;
use crate::questions::{QuestionBatch, QuestionEngine};
use crate::records::{DocumentRecord, Records};
use crate::template::Template;
use crate::types::{
    Document, ExtractionResult, PipelineStage, QuestionCache, SessionStatus, StageFlags, VersionRecord,
};
use crate::versioning::{compare_gaps, find_version, GapComparison};
use crate::workspace::render_propagated;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSummary {
    pub files_processed: usize,
    pub context_length: usize,
    pub language: Language,
}

/// Snapshot of where a document stands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentStatus {
    pub id: String,
    pub name: String,
    pub stage: PipelineStage,
    pub flags: StageFlags,
    pub current_version: u32,
    pub language: Language,
    pub session: SessionStatus,
    pub gaps: usize,
    /// `None` until questions have been cached
    pub question_cache_fresh: Option<bool>,
    pub workspace_id: Option<String>,
}

pub struct DocumentManager {
    pub(crate) records: Records,
    pub(crate) locks: Arc<LockRegistry>,
    pub(crate) template: Arc<Template>,
    pub(crate) gateway: Arc<ModelGateway>,
    ingestor: Ingestor,
    extraction: ExtractionEngine,
    pub(crate) questions: QuestionEngine,
    assembly: AssemblyEngine,
    diff: DiffEngine,
    backlog: BacklogEngine,
    pub(crate) detector: LanguageDetector,
    pub(crate) max_questions: usize,
    question_cache_max_age: Duration,
}

impl DocumentManager {
    pub fn new(
        store: Arc<dyn Store>,
        model: Arc<dyn LanguageModel>,
        prompts: PromptManager,
        config: &PipelineConfig,
    ) -> Self {
        let template = Arc::new(Template::enterprise_prd());
        let gateway = Arc::new(ModelGateway::new(model, Arc::new(prompts), config.model_timeout));

        Self {
            records: Records::new(store),
            locks: Arc::new(LockRegistry::new()),
            ingestor: Ingestor::new(Arc::new(DefaultTextExtractor::new())),
            extraction: ExtractionEngine::new(gateway.clone(), template.clone(), config.min_confidence),
            questions: QuestionEngine::new(
                gateway.clone(),
                template.clone(),
                config.include_optional_questions,
            ),
            assembly: AssemblyEngine::new(gateway.clone(), template.clone()),
            diff: DiffEngine::new(gateway.clone()),
            backlog: BacklogEngine::new(gateway.clone()),
            detector: LanguageDetector::new(gateway.clone()),
            max_questions: config.max_questions,
            question_cache_max_age: config.question_cache_max_age,
            template,
            gateway,
        }
    }

    /// Replace the PDF/audio/text reader
    pub fn with_text_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.ingestor = Ingestor::new(extractor);
        self
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub(crate) fn gateway(&self) -> Arc<ModelGateway> {
        self.gateway.clone()
    }

    pub(crate) fn ingestor(&self) -> &Ingestor {
        &self.ingestor
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    pub async fn create_document(&self, name: &str) -> Result<DocumentRecord> {
        self.create_document_in(name, None).await
    }

    pub(crate) async fn create_document_in(
        &self,
        name: &str,
        workspace_id: Option<String>,
    ) -> Result<DocumentRecord> {
        if name.trim().is_empty() {
            return Err(PipelineError::Validation("Document name cannot be empty".to_string()));
        }
        let record = DocumentRecord::new(generate_id(), name.trim().to_string(), workspace_id, Utc::now());
        self.records.save_document(&record).await?;
        info!("Created document {} ({})", record.id, record.name);
        Ok(record)
    }

    pub async fn get_record(&self, id: &str) -> Result<DocumentRecord> {
        self.records.load_document(id).await
    }

    pub async fn list_documents(&self) -> Result<Vec<DocumentRecord>> {
        self.records.list_documents().await
    }

    pub async fn status(&self, id: &str) -> Result<DocumentStatus> {
        let record = self.records.load_document(id).await?;
        let now = Utc::now();
        Ok(DocumentStatus {
            stage: record.flags.stage(),
            flags: record.flags,
            current_version: record.current_version,
            language: record.language,
            session: SessionStatus::of(record.session.as_ref()),
            gaps: record.extraction.as_ref().map(|e| e.gaps.len()).unwrap_or(0),
            question_cache_fresh: record
                .question_cache
                .as_ref()
                .map(|c| c.is_fresh(self.question_cache_max_age, now)),
            workspace_id: record.workspace_id,
            id: record.id,
            name: record.name,
        })
    }

    /// Delete a document, its assembled versions and its workspace membership
    pub async fn delete_document(&self, id: &str) -> Result<bool> {
        let record = match self.remove_document(id).await? {
            Some(record) => record,
            None => return Ok(false),
        };

        if let Some(workspace_id) = record.workspace_id {
            let _guard = self.locks.lock_workspace(&workspace_id).await;
            match self.records.load_workspace(&workspace_id).await {
                Ok(mut workspace) => {
                    workspace.children.retain(|child| child != id);
                    workspace.updated_at = Utc::now();
                    self.records.save_workspace(&workspace).await?;
                }
                Err(PipelineError::WorkspaceNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        info!("Deleted document {}", id);
        Ok(true)
    }

    /// Delete one document record and its lock entry. `None` when it was already gone.
    pub(crate) async fn remove_document(&self, id: &str) -> Result<Option<DocumentRecord>> {
        let removed = {
            let _guard = self.locks.lock_document(id).await;
            match self.records.load_document(id).await {
                Ok(record) => {
                    self.records.delete_document(id).await?;
                    Some(record)
                }
                Err(PipelineError::DocumentNotFound(_)) => None,
                Err(e) => return Err(e),
            }
        };
        self.locks.forget_document(id);
        Ok(removed)
    }

    // ========================================================================
    // Stages
    // ========================================================================

    /// First ingestion of source files into the unified context
    pub async fn process_inputs(&self, id: &str, files: &[SourceFile]) -> Result<InputSummary> {
        let _guard = self.locks.lock_document(id).await;
        let mut record = self.records.load_document(id).await?;
        if record.flags.inputs_processed {
            return Err(PipelineError::Validation(format!(
                "document {} already has sources; use add_sources for new material",
                id
            )));
        }

        let context = self.ingestor.build_context(files).await?;
        let language = self.detector.detect(&context).await;
        let now = Utc::now();

        record.sources = files.iter().map(|f| f.name.clone()).collect();
        record.context = context;
        record.language = language;
        record.version_history.push(VersionRecord::new(
            record.current_version,
            now,
            record.sources.clone(),
            "Initial sources",
            None,
        ));
        record.flags.mark(PipelineStage::InputsProcessed)?;
        record.flags.mark(PipelineStage::ContextGenerated)?;
        record.updated_at = now;
        self.records.save_document(&record).await?;

        info!(
            "Document {}: processed {} file(s), {} chars, language {}",
            id,
            files.len(),
            record.context.len(),
            language
        );
        Ok(InputSummary {
            files_processed: files.len(),
            context_length: record.context.len(),
            language,
        })
    }

    fn analysis_material(record: &DocumentRecord) -> String {
        match render_propagated(&record.propagated) {
            Some(block) => format!("{}\n\n{}", record.context, block),
            None => record.context.clone(),
        }
    }

    /// Extract section content and gaps from the unified context.
    /// Re-analysis replaces the extraction and drops cached questions and the backlog.
    pub async fn analyze_gaps(&self, id: &str) -> Result<ExtractionResult> {
        let _guard = self.locks.lock_document(id).await;
        let mut record = self.records.load_document(id).await?;
        record.flags.require(PipelineStage::ContextGenerated)?;

        let result = self
            .extraction
            .extract(&Self::analysis_material(&record), record.language)
            .await?;

        let version = record.current_version;
        if let Some(entry) = record.version_history.iter_mut().find(|v| v.version == version) {
            entry.gap_keys = result.gap_keys().into_iter().collect();
            entry.gaps_detected = result.gaps.len();
        }
        record.extraction = Some(result.clone());
        record.question_cache = None;
        record.backlog = None;
        record.flags.mark(PipelineStage::GapsAnalyzed)?;
        record.updated_at = Utc::now();
        self.records.save_document(&record).await?;

        info!("Document {}: {} gap(s) after analysis", id, result.gaps.len());
        Ok(result)
    }

    /// Generate questions for the current gaps, always calling the model
    pub async fn generate_questions(&self, id: &str, max_questions: Option<usize>) -> Result<QuestionBatch> {
        let _guard = self.locks.lock_document(id).await;
        let mut record = self.records.load_document(id).await?;
        let batch = self.refresh_questions(&mut record, max_questions).await?;
        self.records.save_document(&record).await?;
        Ok(batch)
    }

    /// Regenerate the question cache on `record` in memory; the caller persists it
    pub(crate) async fn refresh_questions(
        &self,
        record: &mut DocumentRecord,
        max_questions: Option<usize>,
    ) -> Result<QuestionBatch> {
        record.flags.require(PipelineStage::GapsAnalyzed)?;
        let max_questions = max_questions.unwrap_or(self.max_questions);
        let known = record
            .session
            .as_ref()
            .map(|s| s.known_answers())
            .unwrap_or_default();

        let batch = self
            .questions
            .generate_questions(record.extraction()?, max_questions, &known, record.language)
            .await?;

        let now = Utc::now();
        record.question_cache = Some(QuestionCache {
            questions: batch.questions.clone(),
            max_questions,
            generated_at: now,
            soft_cap_exceeded: batch.soft_cap_exceeded,
        });
        let version = record.current_version;
        if let Some(entry) = record.version_history.iter_mut().find(|v| v.version == version) {
            entry.questions_generated = batch.questions.len();
        }
        record.flags.mark(PipelineStage::QuestionsGenerated)?;
        record.updated_at = now;
        Ok(batch)
    }

    /// Assemble the document for the current version from extraction and session answers
    pub async fn build_document(&self, id: &str) -> Result<Document> {
        let _guard = self.locks.lock_document(id).await;
        let mut record = self.records.load_document(id).await?;
        record.flags.require(PipelineStage::QuestionsGenerated)?;

        let answers = record
            .session
            .as_ref()
            .map(|s| s.known_answers())
            .unwrap_or_default();
        let document = self
            .assembly
            .assemble(record.extraction()?, &answers, record.language, record.current_version)
            .await?;

        self.records.save_assembled(id, &document).await?;
        if !record.built_versions.contains(&document.version) {
            record.built_versions.push(document.version);
            record.built_versions.sort_unstable();
        }
        record.flags.mark(PipelineStage::DocumentBuilt)?;
        record.updated_at = Utc::now();
        self.records.save_document(&record).await?;

        info!(
            "Document {}: built version {} ({} section(s))",
            id,
            document.version,
            document.sections.len()
        );
        Ok(document)
    }

    pub async fn get_document(&self, id: &str, version: u32) -> Result<Document> {
        self.records.load_assembled(id, version).await
    }

    pub async fn latest_document(&self, id: &str) -> Result<Document> {
        let record = self.records.load_document(id).await?;
        let version = record.built_versions.last().copied().ok_or_else(|| {
            PipelineError::Validation(format!("document {} has not been built", id))
        })?;
        self.records.load_assembled(id, version).await
    }

    pub async fn generate_backlog(&self, id: &str) -> Result<Backlog> {
        let _guard = self.locks.lock_document(id).await;
        let mut record = self.records.load_document(id).await?;
        record.flags.require(PipelineStage::DocumentBuilt)?;

        let version = record.current_version;
        if record.built_versions.last() != Some(&version) {
            return Err(PipelineError::Validation(format!(
                "document {} has no build for version {}; build it before generating a backlog",
                id, version
            )));
        }
        let document = self.records.load_assembled(id, version).await?;
        let backlog = self.backlog.generate(&document, record.language).await?;

        record.backlog = Some(backlog.clone());
        record.flags.mark(PipelineStage::BacklogGenerated)?;
        record.updated_at = Utc::now();
        self.records.save_document(&record).await?;
        Ok(backlog)
    }

    // ========================================================================
    // Section Edits
    // ========================================================================

    /// Replace one section of an assembled version; every other section is kept as is
    pub async fn edit_section(&self, id: &str, version: u32, section_key: &str, content: &str) -> Result<Document> {
        let key = self.template.parse_key(section_key)?;
        let section = self
            .template
            .get(key)
            .ok_or_else(|| PipelineError::UnknownSection(section_key.to_string()))?;
        if content.trim().is_empty() {
            return Err(PipelineError::Validation(format!(
                "content for {} cannot be empty; use delete_section to remove it",
                key
            )));
        }

        let _guard = self.locks.lock_document(id).await;
        let mut record = self.records.load_document(id).await?;
        let mut document = self.records.load_assembled(id, version).await?;
        document.set_section(section, content);
        self.save_edited(&mut record, &document).await?;

        info!("Document {}: edited {} in version {}", id, key, version);
        Ok(document)
    }

    pub async fn delete_section(&self, id: &str, version: u32, section_key: &str) -> Result<Document> {
        let key = self.template.parse_key(section_key)?;
        let _guard = self.locks.lock_document(id).await;
        let mut record = self.records.load_document(id).await?;
        let mut document = self.records.load_assembled(id, version).await?;
        if document.remove_section(key).is_none() {
            return Err(PipelineError::Validation(format!(
                "section {} is not part of version {} of document {}",
                key, version, id
            )));
        }
        self.save_edited(&mut record, &document).await?;

        info!("Document {}: removed {} from version {}", id, key, version);
        Ok(document)
    }

    async fn save_edited(&self, record: &mut DocumentRecord, document: &Document) -> Result<()> {
        self.records.save_assembled(&record.id, document).await?;
        if record.backlog.as_ref().map(|b| b.source_version) == Some(document.version) {
            record.backlog = None;
        }
        record.updated_at = Utc::now();
        self.records.save_document(record).await
    }

    // ========================================================================
    // Versions
    // ========================================================================

    /// Ingest new material, merge it into the extraction and open a new version
    pub async fn add_sources(&self, id: &str, files: &[SourceFile], notes: &str) -> Result<VersionRecord> {
        let _guard = self.locks.lock_document(id).await;
        let mut record = self.records.load_document(id).await?;
        record.flags.require(PipelineStage::InputsProcessed)?;

        let material = self.ingestor.build_context(files).await?;

        if let Some(previous) = &record.extraction {
            let new = self.extraction.extract(&material, record.language).await?;
            let merged = merge_extractions(previous, &new, &self.template)?;
            info!(
                "Document {}: merged new sources, gaps {} -> {}",
                id,
                previous.gaps.len(),
                merged.gaps.len()
            );
            record.extraction = Some(merged);
        }

        let now = Utc::now();
        let names: Vec<String> = files.iter().map(|f| f.name.clone()).collect();
        record.context = format!("{}\n\n{}", record.context, material);
        record.sources.extend(names.iter().cloned());
        record.question_cache = None;
        record.backlog = None;
        record.current_version += 1;
        let entry = VersionRecord::new(
            record.current_version,
            now,
            names,
            notes,
            record.extraction.as_ref(),
        );
        record.version_history.push(entry.clone());
        record.updated_at = now;
        self.records.save_document(&record).await?;

        info!("Document {}: now at version {}", id, record.current_version);
        Ok(entry)
    }

    pub async fn compare_versions(&self, id: &str, from: u32, to: u32) -> Result<Diff> {
        let old = self.records.load_assembled(id, from).await?;
        let new = self.records.load_assembled(id, to).await?;
        Ok(self.diff.compare(&old, &new).await)
    }

    pub async fn compare_markdown(&self, old: &str, new: &str) -> Diff {
        self.diff.compare_markdown(old, new).await
    }

    pub async fn compare_gaps(&self, id: &str, from: u32, to: u32) -> Result<GapComparison> {
        let record = self.records.load_document(id).await?;
        let before = find_version(&record.version_history, id, from)?;
        let after = find_version(&record.version_history, id, to)?;
        Ok(compare_gaps(before, after))
    }
}
