// ABOUTME: Docforge pipeline library - gap-driven assembly of requirements documents
// ABOUTME: Extraction, questions, sessions, assembly, merge, diff and workspace analysis over a pluggable model

pub mod assembly;
pub mod backlog;
pub mod diff;
pub mod error;
pub mod extraction;
pub mod gateway;
pub mod grounding;
pub mod ingest;
pub mod language;
pub mod locks;
pub mod manager;
pub mod merge;
pub mod questions;
pub mod records;
pub mod session_manager;
pub mod template;
pub mod types;
pub mod versioning;
pub mod workspace;
pub mod workspace_manager;

pub use diff::{Diff, SummarySource};
pub use error::{ErrorKind, PipelineError, Result};
pub use ingest::{DefaultTextExtractor, SourceFile, SourceKind, TextExtractor, Transcriber};
pub use language::Language;
pub use manager::{DocumentManager, DocumentStatus, InputSummary};
pub use session_manager::SessionView;
pub use template::{SectionKey, Template, TemplateSection};
pub use types::*;
pub use workspace::{Workspace, WorkspaceAnalysis};
pub use workspace_manager::WorkspaceManager;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::backlog::{Backlog, BacklogItem};
    pub use crate::diff::Diff;
    pub use crate::error::{PipelineError, Result};
    pub use crate::ingest::SourceFile;
    pub use crate::manager::DocumentManager;
    pub use crate::template::{SectionKey, Template};
    pub use crate::types::{Document, ExtractionResult, Gap, SessionStatus};
    pub use crate::workspace_manager::WorkspaceManager;
}
