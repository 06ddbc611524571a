// ABOUTME: Backlog engine deriving engineering work items from an assembled document
// ABOUTME: Model output is checked structurally: known issue types, priorities and Fibonacci points

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::gateway::ModelGateway;
use crate::language::Language;
use crate::types::Document;

pub const STORY_POINTS: [u8; 6] = [1, 2, 3, 5, 8, 13];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IssueType {
    Epic,
    Story,
    Task,
    Bug,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BacklogPriority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacklogItem {
    pub issue_type: IssueType,
    pub summary: String,
    #[serde(default)]
    pub description: String,
    pub priority: BacklogPriority,
    pub story_points: u8,
}

impl BacklogItem {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.summary.trim().is_empty() {
            return Err("backlog item has an empty summary".to_string());
        }
        if !STORY_POINTS.contains(&self.story_points) {
            return Err(format!(
                "story points must be one of {:?}, got {}",
                STORY_POINTS, self.story_points
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backlog {
    pub items: Vec<BacklogItem>,
    pub source_version: u32,
}

impl Backlog {
    pub fn total_story_points(&self) -> u32 {
        self.items.iter().map(|i| u32::from(i.story_points)).sum()
    }

    pub fn count_by_type(&self) -> BTreeMap<IssueType, usize> {
        let mut counts = BTreeMap::new();
        for item in &self.items {
            *counts.entry(item.issue_type).or_insert(0) += 1;
        }
        counts
    }
}

#[derive(Debug, Deserialize)]
struct RawBacklog {
    items: Vec<BacklogItem>,
}

fn validate_items(raw: &RawBacklog) -> std::result::Result<(), String> {
    if raw.items.is_empty() {
        return Err("backlog has no items".to_string());
    }
    raw.items.iter().try_for_each(BacklogItem::validate)
}

pub struct BacklogEngine {
    gateway: Arc<ModelGateway>,
}

impl BacklogEngine {
    pub fn new(gateway: Arc<ModelGateway>) -> Self {
        Self { gateway }
    }

    pub async fn generate(&self, document: &Document, language: Language) -> Result<Backlog> {
        if document.sections.is_empty() {
            return Err(PipelineError::Validation(
                "cannot derive a backlog from an empty document".to_string(),
            ));
        }

        let markdown = document.to_markdown();
        let prompt = self.gateway.prompts().get_prompt(
            "backlog",
            &[
                ("language_instruction", language.instruction()),
                ("document", &markdown),
            ],
        )?;
        let request = self.gateway.request(prompt)?.with_max_tokens(8192);
        let raw: RawBacklog = self
            .gateway
            .complete_json("backlog", request, validate_items)
            .await?;

        let backlog = Backlog {
            items: raw.items,
            source_version: document.version,
        };
        info!(
            "Backlog generated: {} item(s), {} story point(s)",
            backlog.items.len(),
            backlog.total_story_points()
        );
        Ok(backlog)
    }
}
