// ABOUTME: Typed document and workspace records and their mapping onto the record store
// ABOUTME: Records are validated on load; a record that fails to decode is reported as corrupt

use chrono::{DateTime, Utc};
use docforge_storage::{RecordKind, Store};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::backlog::Backlog;
use crate::error::{PipelineError, Result};
use crate::language::Language;
use crate::types::{Document, ExtractionResult, InteractiveSession, QuestionCache, StageFlags, VersionRecord};
use crate::workspace::{PropagatedEntry, Workspace};

/// Everything the pipeline knows about one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub flags: StageFlags,
    pub current_version: u32,
    #[serde(default)]
    pub version_history: Vec<VersionRecord>,
    #[serde(default)]
    pub language: Language,
    /// File names ingested so far, in arrival order
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub extraction: Option<ExtractionResult>,
    #[serde(default)]
    pub question_cache: Option<QuestionCache>,
    #[serde(default)]
    pub session: Option<InteractiveSession>,
    /// Versions with a stored assembled document, ascending
    #[serde(default)]
    pub built_versions: Vec<u32>,
    #[serde(default)]
    pub backlog: Option<Backlog>,
    #[serde(default)]
    pub workspace_id: Option<String>,
    #[serde(default)]
    pub propagated: Vec<PropagatedEntry>,
}

impl DocumentRecord {
    pub fn new(id: String, name: String, workspace_id: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name,
            created_at: now,
            updated_at: now,
            flags: StageFlags::default(),
            current_version: 1,
            version_history: Vec::new(),
            language: Language::default(),
            sources: Vec::new(),
            context: String::new(),
            extraction: None,
            question_cache: None,
            session: None,
            built_versions: Vec::new(),
            backlog: None,
            workspace_id,
            propagated: Vec::new(),
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.current_version == 0 {
            return Err("current_version must be at least 1".to_string());
        }
        if !self.flags.is_consistent() {
            return Err("stage flags skip a stage".to_string());
        }
        if let Some(extraction) = &self.extraction {
            extraction.verify_exclusive().map_err(|e| e.to_string())?;
        }
        Ok(())
    }

    pub fn extraction(&self) -> Result<&ExtractionResult> {
        self.extraction.as_ref().ok_or_else(|| {
            PipelineError::Validation(format!("document {} has not been analyzed", self.id))
        })
    }
}

fn assembled_id(document_id: &str, version: u32) -> String {
    format!("{}/v{}", document_id, version)
}

fn decode<T: DeserializeOwned>(kind: RecordKind, id: &str, value: serde_json::Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| PipelineError::CorruptRecord {
        kind: kind.to_string(),
        id: id.to_string(),
        reason: e.to_string(),
    })
}

fn decode_document(id: &str, value: serde_json::Value) -> Result<DocumentRecord> {
    let record: DocumentRecord = decode(RecordKind::Document, id, value)?;
    record.validate().map_err(|reason| PipelineError::CorruptRecord {
        kind: RecordKind::Document.to_string(),
        id: id.to_string(),
        reason,
    })?;
    Ok(record)
}

/// Typed access to the untyped record store
#[derive(Clone)]
pub struct Records {
    store: Arc<dyn Store>,
}

impl Records {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn load_document(&self, id: &str) -> Result<DocumentRecord> {
        let value = self
            .store
            .load(RecordKind::Document, id)
            .await?
            .ok_or_else(|| PipelineError::DocumentNotFound(id.to_string()))?;
        decode_document(id, value)
    }

    pub async fn save_document(&self, record: &DocumentRecord) -> Result<()> {
        let value = serde_json::to_value(record)?;
        self.store.save(RecordKind::Document, &record.id, &value).await?;
        Ok(())
    }

    /// Deletes the record and every assembled version of it
    pub async fn delete_document(&self, id: &str) -> Result<bool> {
        let prefix = format!("{}/v", id);
        for (assembled, _) in self.store.list(RecordKind::Assembled).await? {
            if assembled.starts_with(&prefix) {
                self.store.delete(RecordKind::Assembled, &assembled).await?;
            }
        }
        Ok(self.store.delete(RecordKind::Document, id).await?)
    }

    pub async fn list_documents(&self) -> Result<Vec<DocumentRecord>> {
        self.store
            .list(RecordKind::Document)
            .await?
            .into_iter()
            .map(|(id, value)| decode_document(&id, value))
            .collect()
    }

    pub async fn load_workspace(&self, id: &str) -> Result<Workspace> {
        let value = self
            .store
            .load(RecordKind::Workspace, id)
            .await?
            .ok_or_else(|| PipelineError::WorkspaceNotFound(id.to_string()))?;
        decode(RecordKind::Workspace, id, value)
    }

    pub async fn save_workspace(&self, workspace: &Workspace) -> Result<()> {
        let value = serde_json::to_value(workspace)?;
        self.store.save(RecordKind::Workspace, &workspace.id, &value).await?;
        Ok(())
    }

    pub async fn delete_workspace(&self, id: &str) -> Result<bool> {
        Ok(self.store.delete(RecordKind::Workspace, id).await?)
    }

    pub async fn list_workspaces(&self) -> Result<Vec<Workspace>> {
        self.store
            .list(RecordKind::Workspace)
            .await?
            .into_iter()
            .map(|(id, value)| decode(RecordKind::Workspace, &id, value))
            .collect()
    }

    pub async fn load_assembled(&self, document_id: &str, version: u32) -> Result<Document> {
        let id = assembled_id(document_id, version);
        let value = self
            .store
            .load(RecordKind::Assembled, &id)
            .await?
            .ok_or_else(|| PipelineError::VersionNotFound {
                document_id: document_id.to_string(),
                version,
            })?;
        decode(RecordKind::Assembled, &id, value)
    }

    pub async fn save_assembled(&self, document_id: &str, document: &Document) -> Result<()> {
        let value = serde_json::to_value(document)?;
        self.store
            .save(RecordKind::Assembled, &assembled_id(document_id, document.version), &value)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docforge_storage::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_document_round_trip() {
        let records = Records::new(Arc::new(MemoryStore::new()));
        let record = DocumentRecord::new("doc1".into(), "Ledger".into(), None, Utc::now());
        records.save_document(&record).await.unwrap();
        assert_eq!(records.load_document("doc1").await.unwrap(), record);
    }

    #[tokio::test]
    async fn test_missing_document_is_not_found() {
        let records = Records::new(Arc::new(MemoryStore::new()));
        assert!(matches!(
            records.load_document("nope").await,
            Err(PipelineError::DocumentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_corrupt_document_fails_fast() {
        let store = Arc::new(MemoryStore::new());
        store
            .save(RecordKind::Document, "bad", &json!({"id": "bad", "flags": "yes"}))
            .await
            .unwrap();
        let records = Records::new(store);
        assert!(matches!(
            records.load_document("bad").await,
            Err(PipelineError::CorruptRecord { .. })
        ));
    }

    #[tokio::test]
    async fn test_inconsistent_flags_are_corrupt() {
        let store = Arc::new(MemoryStore::new());
        let mut record = DocumentRecord::new("doc1".into(), "Ledger".into(), None, Utc::now());
        record.flags.document_built = true;
        store
            .save(RecordKind::Document, "doc1", &serde_json::to_value(&record).unwrap())
            .await
            .unwrap();

        let err = Records::new(store).load_document("doc1").await.unwrap_err();
        assert!(err.to_string().contains("skip a stage"));
    }
}
