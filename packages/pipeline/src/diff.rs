// ABOUTME: Section-level comparison of two document versions
// ABOUTME: Structured diff is computed locally; only the prose summary comes from the model

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use similar::{ChangeTag, TextDiff};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::Result;
use crate::gateway::ModelGateway;
use crate::types::Document;

pub const MAX_LINE_CHANGES: usize = 50;
const PREVIEW_CHARS: usize = 200;
pub const NO_CHANGES_SUMMARY: &str = "No changes between these versions.";

lazy_static! {
    static ref NUMBERING: Regex = Regex::new(r"^\d+(?:\.\d+)*\.?\s+").unwrap();
}

/// Match key for a section title: leading "1." / "2.3" numbering is dropped,
/// then lowercase with spaces and slashes as underscores
pub fn normalize_title(title: &str) -> String {
    let stripped = NUMBERING.replace(title.trim(), "");
    stripped.trim().to_lowercase().replace([' ', '/'], "_")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSection {
    pub key: String,
    pub title: String,
    pub content: String,
}

/// Split markdown on `## ` headings. Text before the first heading is ignored.
pub fn parse_markdown_sections(markdown: &str) -> Vec<ParsedSection> {
    let mut sections: Vec<ParsedSection> = Vec::new();
    let mut current: Option<(String, Vec<&str>)> = None;

    for line in markdown.lines() {
        if let Some(title) = line.strip_prefix("## ") {
            if let Some((title, lines)) = current.take() {
                push_section(&mut sections, &title, lines.join("\n").trim().to_string());
            }
            current = Some((title.trim().to_string(), Vec::new()));
        } else if let Some((_, lines)) = current.as_mut() {
            lines.push(line);
        }
    }
    if let Some((title, lines)) = current {
        push_section(&mut sections, &title, lines.join("\n").trim().to_string());
    }
    sections
}

fn push_section(sections: &mut Vec<ParsedSection>, title: &str, content: String) {
    let key = normalize_title(title);
    match sections.iter_mut().find(|s| s.key == key) {
        Some(existing) => existing.content = content,
        None => sections.push(ParsedSection {
            key,
            title: title.to_string(),
            content,
        }),
    }
}

fn document_sections(document: &Document) -> Vec<ParsedSection> {
    let mut sections = Vec::new();
    for (title, content) in document.titled_sections() {
        push_section(&mut sections, &title, content.trim().to_string());
    }
    sections
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineChangeKind {
    Added,
    Removed,
    Context,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineChange {
    pub kind: LineChangeKind,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddedSection {
    pub section: String,
    pub title: String,
    pub preview: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovedSection {
    pub section: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifiedSection {
    pub section: String,
    pub title: String,
    pub similarity: f64,
    pub changes: Vec<LineChange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummarySource {
    Model,
    Template,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diff {
    pub sections_added: usize,
    pub sections_removed: usize,
    pub sections_modified: usize,
    pub sections_unchanged: usize,
    pub added: Vec<AddedSection>,
    pub removed: Vec<RemovedSection>,
    pub modified: Vec<ModifiedSection>,
    pub unchanged: Vec<String>,
    pub summary: String,
    pub summary_source: SummarySource,
}

impl Diff {
    pub fn has_changes(&self) -> bool {
        self.sections_added + self.sections_removed + self.sections_modified > 0
    }

    /// Bullet list used when no model summary is available
    pub fn templated_summary(&self) -> String {
        if !self.has_changes() {
            return NO_CHANGES_SUMMARY.to_string();
        }
        let mut lines = Vec::new();
        if !self.added.is_empty() {
            let titles: Vec<&str> = self.added.iter().map(|s| s.title.as_str()).collect();
            lines.push(format!("- Added sections: {}", titles.join(", ")));
        }
        if !self.removed.is_empty() {
            let titles: Vec<&str> = self.removed.iter().map(|s| s.title.as_str()).collect();
            lines.push(format!("- Removed sections: {}", titles.join(", ")));
        }
        if !self.modified.is_empty() {
            let titles: Vec<&str> = self.modified.iter().map(|s| s.title.as_str()).collect();
            lines.push(format!("- Modified sections: {}", titles.join(", ")));
        }
        lines.join("\n")
    }
}

fn similarity(old: &str, new: &str) -> f64 {
    f64::from(TextDiff::from_chars(old, new).ratio())
}

fn line_changes(old: &str, new: &str) -> Vec<LineChange> {
    let diff = TextDiff::from_lines(old, new);
    let mut changes = Vec::new();
    for group in diff.grouped_ops(1) {
        for op in group {
            for change in diff.iter_changes(&op) {
                let content = change.value().trim_end_matches(['\n', '\r']).to_string();
                let kind = match change.tag() {
                    ChangeTag::Insert => LineChangeKind::Added,
                    ChangeTag::Delete => LineChangeKind::Removed,
                    ChangeTag::Equal if content.trim().is_empty() => continue,
                    ChangeTag::Equal => LineChangeKind::Context,
                };
                changes.push(LineChange { kind, content });
            }
        }
    }
    changes.truncate(MAX_LINE_CHANGES);
    changes
}

fn preview(content: &str) -> String {
    let cut = docforge_core::truncate(content, PREVIEW_CHARS);
    if cut.len() < content.len() {
        format!("{}...", cut)
    } else {
        cut.to_string()
    }
}

/// Structured diff with the templated summary filled in
pub fn compute_diff(old: &[ParsedSection], new: &[ParsedSection]) -> Diff {
    let mut added = Vec::new();
    let mut removed = Vec::new();
    let mut modified = Vec::new();
    let mut unchanged = Vec::new();

    for before in old {
        match new.iter().find(|s| s.key == before.key) {
            None => removed.push(RemovedSection {
                section: before.key.clone(),
                title: before.title.clone(),
            }),
            Some(after) if after.content == before.content => unchanged.push(after.title.clone()),
            Some(after) => modified.push(ModifiedSection {
                section: after.key.clone(),
                title: after.title.clone(),
                similarity: similarity(&before.content, &after.content),
                changes: line_changes(&before.content, &after.content),
            }),
        }
    }

    for after in new.iter().filter(|s| !old.iter().any(|o| o.key == s.key)) {
        added.push(AddedSection {
            section: after.key.clone(),
            title: after.title.clone(),
            preview: preview(&after.content),
        });
    }

    let mut diff = Diff {
        sections_added: added.len(),
        sections_removed: removed.len(),
        sections_modified: modified.len(),
        sections_unchanged: unchanged.len(),
        added,
        removed,
        modified,
        unchanged,
        summary: String::new(),
        summary_source: SummarySource::Template,
    };
    diff.summary = diff.templated_summary();
    diff
}

pub struct DiffEngine {
    gateway: Arc<ModelGateway>,
}

impl DiffEngine {
    pub fn new(gateway: Arc<ModelGateway>) -> Self {
        Self { gateway }
    }

    pub async fn compare(&self, old: &Document, new: &Document) -> Diff {
        self.summarize(compute_diff(&document_sections(old), &document_sections(new)))
            .await
    }

    pub async fn compare_markdown(&self, old: &str, new: &str) -> Diff {
        self.summarize(compute_diff(
            &parse_markdown_sections(old),
            &parse_markdown_sections(new),
        ))
        .await
    }

    async fn summarize(&self, mut diff: Diff) -> Diff {
        info!(
            "Diff: {} added, {} removed, {} modified, {} unchanged",
            diff.sections_added, diff.sections_removed, diff.sections_modified, diff.sections_unchanged
        );
        if !diff.has_changes() {
            return diff;
        }

        match self.model_summary(&diff).await {
            Ok(summary) if !summary.is_empty() => {
                diff.summary = summary;
                diff.summary_source = SummarySource::Model;
            }
            Ok(_) => warn!("Change summary came back empty, using templated summary"),
            Err(e) => warn!("Change summary unavailable, using templated summary: {}", e),
        }
        diff
    }

    async fn model_summary(&self, diff: &Diff) -> Result<String> {
        let titles = |items: Vec<&str>| {
            if items.is_empty() {
                "none".to_string()
            } else {
                items.join(", ")
            }
        };
        let changes = diff
            .modified
            .iter()
            .flat_map(|m| {
                m.changes
                    .iter()
                    .filter(|c| c.kind != LineChangeKind::Context)
                    .take(10)
                    .map(move |c| {
                        let sign = if c.kind == LineChangeKind::Added { '+' } else { '-' };
                        format!("[{}] {} {}", m.title, sign, c.content)
                    })
            })
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = self.gateway.prompts().get_prompt(
            "change_summary",
            &[
                ("added", &titles(diff.added.iter().map(|s| s.title.as_str()).collect())),
                ("removed", &titles(diff.removed.iter().map(|s| s.title.as_str()).collect())),
                ("modified", &titles(diff.modified.iter().map(|s| s.title.as_str()).collect())),
                ("changes", &changes),
            ],
        )?;
        let request = self.gateway.request(prompt)?.with_max_tokens(300);
        self.gateway.complete("change_summary", request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const V1: &str = "# Ledger\n\n---\n\n## 1. Business Context\n\nSMB bookkeeping.\n\n## Scope/Limits\n\nNo payroll.\n";

    #[test]
    fn test_normalize_title() {
        assert_eq!(normalize_title("1. Business Context"), "business_context");
        assert_eq!(normalize_title("Scope/Limits"), "scope_limits");
        assert_eq!(normalize_title("  UX Flows "), "ux_flows");
    }

    #[test]
    fn test_numbered_headings_match_unnumbered() {
        let renumbered = V1.replace("## 1. Business Context", "## Business Context");
        let diff = compute_diff(&parse_markdown_sections(V1), &parse_markdown_sections(&renumbered));
        assert!(!diff.has_changes());
        assert_eq!(diff.sections_unchanged, 2);

        let nested = V1.replace("## 1. Business Context", "## 2.1 Business Context");
        let diff = compute_diff(&parse_markdown_sections(V1), &parse_markdown_sections(&nested));
        assert_eq!(diff.sections_added + diff.sections_removed, 0);
    }

    #[test]
    fn test_parse_ignores_preamble() {
        let sections = parse_markdown_sections(V1);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].key, "business_context");
        assert_eq!(sections[0].content, "SMB bookkeeping.");
    }

    #[test]
    fn test_added_section_only() {
        let v2 = format!("{}\n## Risks\n\nVendor lock-in.\n", V1);
        let diff = compute_diff(&parse_markdown_sections(V1), &parse_markdown_sections(&v2));

        assert_eq!(diff.sections_added, 1);
        assert_eq!(diff.sections_modified, 0);
        assert_eq!(diff.sections_unchanged, 2);
        assert_eq!(diff.added[0].title, "Risks");
    }

    #[test]
    fn test_modified_section_carries_line_changes() {
        let v2 = V1.replace("No payroll.", "No payroll.\nNo invoicing.");
        let diff = compute_diff(&parse_markdown_sections(V1), &parse_markdown_sections(&v2));

        assert_eq!(diff.sections_modified, 1);
        let modified = &diff.modified[0];
        assert!(modified.similarity > 0.0 && modified.similarity < 1.0);
        assert!(modified
            .changes
            .iter()
            .any(|c| c.kind == LineChangeKind::Added && c.content == "No invoicing."));
    }

    #[test]
    fn test_line_changes_are_capped() {
        let old: String = (0..80).map(|i| format!("old {}\n", i)).collect();
        let new: String = (0..80).map(|i| format!("new {}\n", i)).collect();
        assert_eq!(line_changes(&old, &new).len(), MAX_LINE_CHANGES);
    }

    #[test]
    fn test_identical_documents_have_fixed_summary() {
        let sections = parse_markdown_sections(V1);
        let diff = compute_diff(&sections, &sections);
        assert!(!diff.has_changes());
        assert_eq!(diff.summary, NO_CHANGES_SUMMARY);
        assert_eq!(diff.summary_source, SummarySource::Template);
    }
}
