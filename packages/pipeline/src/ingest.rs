// ABOUTME: Source ingestion: reads PDFs, audio and text files into one unified context
// ABOUTME: A file that cannot be read becomes an [ERROR ...] marker instead of failing the batch

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{PipelineError, Result};

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "m4a", "ogg", "flac"];
const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "text"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Pdf,
    Audio,
    PlainText,
}

impl SourceKind {
    /// Kind by file extension, `None` for unsupported files
    pub fn from_name(name: &str) -> Option<Self> {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())?;
        if ext == "pdf" {
            Some(SourceKind::Pdf)
        } else if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
            Some(SourceKind::Audio)
        } else if TEXT_EXTENSIONS.contains(&ext.as_str()) {
            Some(SourceKind::PlainText)
        } else {
            None
        }
    }

    fn header(&self) -> &'static str {
        match self {
            SourceKind::Pdf => "PDF Document",
            SourceKind::Audio => "Audio Transcription",
            SourceKind::PlainText => "Text Document",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub kind: SourceKind,
    pub bytes: Vec<u8>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Result<Self> {
        let name = name.into();
        let kind = SourceKind::from_name(&name).ok_or_else(|| {
            PipelineError::Validation(format!(
                "Unsupported file '{}'. Supported: PDF, audio (mp3/wav/m4a/ogg/flac), text (txt/md)",
                name
            ))
        })?;
        Ok(Self { name, kind, bytes })
    }

    pub fn text(name: impl Into<String>, content: &str) -> Result<Self> {
        Self::new(name, content.as_bytes().to_vec())
    }

    pub async fn read(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let bytes = tokio::fs::read(path).await?;
        Self::new(name, bytes)
    }
}

/// Read every supported file in `dir`, sorted by name. Unsupported files are skipped.
pub async fn read_dir_sources(dir: &Path) -> Result<Vec<SourceFile>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            paths.push(entry.path());
        }
    }
    paths.sort();

    let mut files = Vec::new();
    for path in paths {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if SourceKind::from_name(name).is_none() {
            warn!("Skipping unsupported file: {}", name);
            continue;
        }
        files.push(SourceFile::read(&path).await?);
    }
    Ok(files)
}

/// Speech-to-text collaborator
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, file: &SourceFile) -> Result<String>;
}

#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Plain text of `file`, or an `[ERROR ...]` marker when it cannot be read
    async fn extract_text(&self, file: &SourceFile) -> String;
}

#[derive(Clone, Default)]
pub struct DefaultTextExtractor {
    transcriber: Option<Arc<dyn Transcriber>>,
}

impl DefaultTextExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    async fn read_pdf(file: &SourceFile) -> String {
        let bytes = file.bytes.clone();
        let extracted = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes)).await;
        match extracted {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => format!("[ERROR reading PDF {}: {}]", file.name, e),
            Err(e) => format!("[ERROR reading PDF {}: {}]", file.name, e),
        }
    }

    fn read_text(file: &SourceFile) -> String {
        match std::str::from_utf8(&file.bytes) {
            Ok(text) => text.to_string(),
            // Latin-1 maps every byte to the code point of the same value
            Err(_) => file.bytes.iter().map(|&b| b as char).collect(),
        }
    }
}

#[async_trait]
impl TextExtractor for DefaultTextExtractor {
    async fn extract_text(&self, file: &SourceFile) -> String {
        match file.kind {
            SourceKind::Pdf => Self::read_pdf(file).await,
            SourceKind::PlainText => Self::read_text(file),
            SourceKind::Audio => match &self.transcriber {
                Some(transcriber) => match transcriber.transcribe(file).await {
                    Ok(text) => text,
                    Err(e) => format!("[ERROR transcribing audio {}: {}]", file.name, e),
                },
                None => format!(
                    "[ERROR transcribing audio {}: no transcriber configured]",
                    file.name
                ),
            },
        }
    }
}

pub struct Ingestor {
    extractor: Arc<dyn TextExtractor>,
}

impl Ingestor {
    pub fn new(extractor: Arc<dyn TextExtractor>) -> Self {
        Self { extractor }
    }

    /// Unified context: one `=== <Kind>: <name> ===` block per file
    pub async fn build_context(&self, files: &[SourceFile]) -> Result<String> {
        if files.is_empty() {
            return Err(PipelineError::Validation(
                "No supported files provided. Supported: PDF, audio, text".to_string(),
            ));
        }

        let mut parts = Vec::with_capacity(files.len());
        for file in files {
            info!("Processing: {}", file.name);
            let content = self.extractor.extract_text(file).await;
            if content.starts_with("[ERROR") {
                warn!("Could not read {}: {}", file.name, content);
            }
            parts.push(format!("=== {}: {} ===\n{}", file.kind.header(), file.name, content.trim()));
        }

        info!("Processed {} file(s)", files.len());
        Ok(parts.join("\n\n"))
    }
}
