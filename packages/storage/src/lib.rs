// ABOUTME: Persistence collaborator for pipeline records
// ABOUTME: Opaque JSON records addressed by (kind, id) with in-memory and SQLite backends

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// The families of records the pipeline persists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Document,
    Workspace,
    Assembled,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Document => "document",
            RecordKind::Workspace => "workspace",
            RecordKind::Assembled => "assembled",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "document" => Ok(RecordKind::Document),
            "workspace" => Ok(RecordKind::Workspace),
            "assembled" => Ok(RecordKind::Assembled),
            other => Err(StorageError::InvalidInput(format!("Unknown record kind: {}", other))),
        }
    }
}

/// Whole-record load/save. Each record is read and written atomically as one snapshot.
#[async_trait]
pub trait Store: Send + Sync {
    async fn load(&self, kind: RecordKind, id: &str) -> StorageResult<Option<serde_json::Value>>;

    async fn save(&self, kind: RecordKind, id: &str, record: &serde_json::Value) -> StorageResult<()>;

    /// Returns whether a record was removed
    async fn delete(&self, kind: RecordKind, id: &str) -> StorageResult<bool>;

    /// All records of a kind, ordered by id
    async fn list(&self, kind: RecordKind) -> StorageResult<Vec<(String, serde_json::Value)>>;
}

fn validate_id(id: &str) -> StorageResult<()> {
    if id.trim().is_empty() {
        return Err(StorageError::InvalidInput("Record id cannot be empty".to_string()));
    }
    Ok(())
}
