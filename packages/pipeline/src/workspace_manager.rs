// ABOUTME: Workspace lifecycle: context files, child documents and the merged workspace analysis
// ABOUTME: Each analysis run merges into the previous one and is pushed into every child document

use chrono::Utc;
use docforge_core::generate_id;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::ingest::SourceFile;
use crate::manager::DocumentManager;
use crate::merge::merge_analyses;
use crate::records::DocumentRecord;
use crate::workspace::{
    apply_propagation, propagation_entries, ContextDocument, PropagatedEntry, Workspace, WorkspaceAnalysis,
    WorkspaceAnalyzer,
};

pub struct WorkspaceManager {
    documents: Arc<DocumentManager>,
    analyzer: WorkspaceAnalyzer,
}

impl WorkspaceManager {
    pub fn new(documents: Arc<DocumentManager>) -> Self {
        let analyzer = WorkspaceAnalyzer::new(documents.gateway());
        Self { documents, analyzer }
    }

    pub fn documents(&self) -> &DocumentManager {
        &self.documents
    }

    pub async fn create_workspace(&self, name: &str, description: &str) -> Result<Workspace> {
        if name.trim().is_empty() {
            return Err(PipelineError::Validation("Workspace name cannot be empty".to_string()));
        }
        let now = Utc::now();
        let workspace = Workspace {
            id: generate_id(),
            name: name.trim().to_string(),
            description: description.trim().to_string(),
            children: Vec::new(),
            context_documents: Vec::new(),
            analysis: None,
            analysis_version: 0,
            last_analysis_at: None,
            language: Default::default(),
            created_at: now,
            updated_at: now,
        };
        self.documents.records.save_workspace(&workspace).await?;
        info!("Created workspace {} ({})", workspace.id, workspace.name);
        Ok(workspace)
    }

    pub async fn get_workspace(&self, id: &str) -> Result<Workspace> {
        self.documents.records.load_workspace(id).await
    }

    pub async fn list_workspaces(&self) -> Result<Vec<Workspace>> {
        self.documents.records.list_workspaces().await
    }

    /// Attach shared reference material (briefs, contracts, call notes)
    pub async fn add_context_files(&self, id: &str, files: &[SourceFile]) -> Result<Workspace> {
        let _guard = self.documents.locks.lock_workspace(id).await;
        let mut workspace = self.documents.records.load_workspace(id).await?;
        if files.is_empty() {
            return Err(PipelineError::Validation("No context files provided".to_string()));
        }

        let now = Utc::now();
        for file in files {
            let content = self.documents.ingestor().build_context(std::slice::from_ref(file)).await?;
            workspace.context_documents.push(ContextDocument {
                name: file.name.clone(),
                content,
                added_at: now,
            });
        }
        if workspace.analysis.is_none() {
            let sample: String = workspace
                .context_documents
                .iter()
                .map(|d| d.content.as_str())
                .collect::<Vec<_>>()
                .join("\n\n");
            workspace.language = self.documents.detector.detect(&sample).await;
        }
        workspace.updated_at = now;
        self.documents.records.save_workspace(&workspace).await?;
        Ok(workspace)
    }

    pub async fn create_child_document(&self, workspace_id: &str, name: &str) -> Result<DocumentRecord> {
        let _guard = self.documents.locks.lock_workspace(workspace_id).await;
        let mut workspace = self.documents.records.load_workspace(workspace_id).await?;

        let mut record = self
            .documents
            .create_document_in(name, Some(workspace_id.to_string()))
            .await?;
        if let Some(entries) = Self::current_entries(&workspace) {
            record.propagated = entries;
            self.documents.records.save_document(&record).await?;
        }

        workspace.children.push(record.id.clone());
        workspace.updated_at = Utc::now();
        self.documents.records.save_workspace(&workspace).await?;
        Ok(record)
    }

    /// Move an existing standalone document into the workspace
    pub async fn add_child(&self, workspace_id: &str, document_id: &str) -> Result<Workspace> {
        let _workspace_guard = self.documents.locks.lock_workspace(workspace_id).await;
        let mut workspace = self.documents.records.load_workspace(workspace_id).await?;
        let _document_guard = self.documents.locks.lock_document(document_id).await;
        let mut record = self.documents.records.load_document(document_id).await?;

        match record.workspace_id.as_deref() {
            Some(existing) if existing == workspace_id => return Ok(workspace),
            Some(existing) => {
                return Err(PipelineError::Validation(format!(
                    "document {} already belongs to workspace {}",
                    document_id, existing
                )))
            }
            None => {}
        }

        let now = Utc::now();
        record.workspace_id = Some(workspace_id.to_string());
        if let Some(entries) = Self::current_entries(&workspace) {
            record.propagated = apply_propagation(&record.propagated, entries, workspace.analysis_version);
        }
        record.updated_at = now;
        self.documents.records.save_document(&record).await?;

        workspace.children.push(document_id.to_string());
        workspace.updated_at = now;
        self.documents.records.save_workspace(&workspace).await?;
        Ok(workspace)
    }

    fn current_entries(workspace: &Workspace) -> Option<Vec<PropagatedEntry>> {
        workspace
            .analysis
            .as_ref()
            .map(|analysis| propagation_entries(analysis, workspace.analysis_version))
    }

    async fn analysis_material(&self, workspace: &Workspace) -> Result<String> {
        let mut parts: Vec<String> = workspace
            .context_documents
            .iter()
            .map(|d| d.content.clone())
            .collect();

        for child in &workspace.children {
            match self.documents.records.load_document(child).await {
                Ok(record) if !record.context.trim().is_empty() => {
                    parts.push(format!("##### Document: {} #####\n{}", record.name, record.context));
                }
                Ok(_) => {}
                Err(PipelineError::DocumentNotFound(_)) => {
                    warn!("Workspace {} lists missing document {}", workspace.id, child);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(parts.join("\n\n"))
    }

    /// Analyze all workspace material, merge with the previous analysis,
    /// bump the analysis version and propagate into every child
    pub async fn analyze_workspace(&self, id: &str) -> Result<WorkspaceAnalysis> {
        let _guard = self.documents.locks.lock_workspace(id).await;
        let mut workspace = self.documents.records.load_workspace(id).await?;

        let material = self.analysis_material(&workspace).await?;
        let fresh = self
            .analyzer
            .analyze(&workspace.name, &material, workspace.language)
            .await?;

        let merged = match &workspace.analysis {
            Some(previous) => merge_analyses(previous, &fresh),
            None => fresh,
        };

        // Children first, workspace last: a failed child save leaves the
        // workspace at its old version and a retry re-propagates the same one.
        let now = Utc::now();
        let version = workspace.analysis_version + 1;
        let entries = propagation_entries(&merged, version);
        let mut propagated = 0;
        for child in &workspace.children {
            let _child_guard = self.documents.locks.lock_document(child).await;
            let mut record = match self.documents.records.load_document(child).await {
                Ok(record) => record,
                Err(PipelineError::DocumentNotFound(_)) => {
                    warn!("Skipping propagation to missing document {}", child);
                    continue;
                }
                Err(e) => return Err(e),
            };
            record.propagated = apply_propagation(&record.propagated, entries.clone(), version);
            record.updated_at = now;
            self.documents.records.save_document(&record).await?;
            propagated += 1;
        }

        workspace.analysis_version = version;
        workspace.analysis = Some(merged.clone());
        workspace.last_analysis_at = Some(now);
        workspace.updated_at = now;
        self.documents.records.save_workspace(&workspace).await?;

        info!(
            "Workspace {}: analysis v{} propagated to {} document(s)",
            id, version, propagated
        );
        Ok(merged)
    }

    /// Delete the workspace and every child document
    pub async fn delete_workspace(&self, id: &str) -> Result<bool> {
        let (deleted, children) = {
            let _guard = self.documents.locks.lock_workspace(id).await;
            let workspace = match self.documents.records.load_workspace(id).await {
                Ok(workspace) => workspace,
                Err(PipelineError::WorkspaceNotFound(_)) => return Ok(false),
                Err(e) => return Err(e),
            };

            for child in &workspace.children {
                self.documents.remove_document(child).await?;
            }
            let deleted = self.documents.records.delete_workspace(id).await?;
            (deleted, workspace.children.len())
        };
        self.documents.locks.forget_workspace(id);

        info!("Deleted workspace {} and {} document(s)", id, children);
        Ok(deleted)
    }
}
