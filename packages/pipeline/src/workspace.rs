// ABOUTME: Multi-document workspace types, the workspace analyzer and context propagation
// ABOUTME: Analyses merge across runs; merged fields are pushed into child documents tagged by version

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::gateway::ModelGateway;
use crate::language::Language;

fn lenient_u32<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => vec![s],
        Some(serde_json::Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                serde_json::Value::String(s) => Some(s),
                serde_json::Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect(),
        _ => Vec::new(),
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentifiedFeature {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleSuggestion {
    pub name: String,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub priority: String,
    #[serde(default)]
    pub estimated_effort: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TechStackRecommendation {
    #[serde(default, deserialize_with = "lenient_list")]
    pub frontend: Vec<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub backend: Vec<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub database: Vec<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub infrastructure: Vec<String>,
    #[serde(default)]
    pub rationale: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceEstimation {
    #[serde(default, deserialize_with = "lenient_u32")]
    pub team_size: Option<u32>,
    #[serde(default)]
    pub estimated_timeline: Option<String>,
    #[serde(default)]
    pub deadline: Option<String>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub required_team_size: Option<u32>,
    #[serde(default)]
    pub assumptions: Vec<String>,
    #[serde(default)]
    pub confidence_level: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceAnalysis {
    #[serde(default)]
    pub executive_summary: String,
    #[serde(default)]
    pub architecture_overview: String,
    #[serde(default)]
    pub project_scope: BTreeMap<String, String>,
    #[serde(default)]
    pub business_objectives: Vec<String>,
    #[serde(default)]
    pub identified_features: Vec<IdentifiedFeature>,
    #[serde(default)]
    pub suggested_modules: Vec<ModuleSuggestion>,
    #[serde(default)]
    pub tech_stack_recommendation: Option<TechStackRecommendation>,
    #[serde(default)]
    pub resource_estimation: Option<ResourceEstimation>,
    #[serde(default)]
    pub technical_risks: Vec<String>,
    #[serde(default)]
    pub business_risks: Vec<String>,
}

impl WorkspaceAnalysis {
    pub fn is_empty(&self) -> bool {
        self == &WorkspaceAnalysis::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextDocument {
    pub name: String,
    pub content: String,
    pub added_at: DateTime<Utc>,
}

/// Container of documents. Children are referenced by id, never embedded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub children: Vec<String>,
    #[serde(default)]
    pub context_documents: Vec<ContextDocument>,
    #[serde(default)]
    pub analysis: Option<WorkspaceAnalysis>,
    /// Starts at 0; every analysis run increments it
    #[serde(default)]
    pub analysis_version: u32,
    #[serde(default)]
    pub last_analysis_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub language: Language,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Workspace-level knowledge copied into a child document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropagatedEntry {
    pub field: String,
    pub content: String,
    pub source_version: u32,
}

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .filter(|i| !i.trim().is_empty())
        .map(|i| format!("- {}", i.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Fields of a merged analysis that child documents receive
pub fn propagation_entries(analysis: &WorkspaceAnalysis, version: u32) -> Vec<PropagatedEntry> {
    let mut fields: Vec<(&str, String)> = vec![
        ("executive_summary", analysis.executive_summary.trim().to_string()),
        ("architecture_overview", analysis.architecture_overview.trim().to_string()),
        ("business_objectives", bullet_list(&analysis.business_objectives)),
        (
            "identified_features",
            analysis
                .identified_features
                .iter()
                .map(|f| {
                    if f.description.trim().is_empty() {
                        format!("- {}", f.name.trim())
                    } else {
                        format!("- {}: {}", f.name.trim(), f.description.trim())
                    }
                })
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        ("technical_risks", bullet_list(&analysis.technical_risks)),
        ("business_risks", bullet_list(&analysis.business_risks)),
    ];

    if let Some(stack) = &analysis.tech_stack_recommendation {
        let lines: Vec<String> = [
            ("Frontend", &stack.frontend),
            ("Backend", &stack.backend),
            ("Database", &stack.database),
            ("Infrastructure", &stack.infrastructure),
        ]
        .iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(label, values)| format!("- {}: {}", label, values.join(", ")))
        .collect();
        fields.push(("tech_stack", lines.join("\n")));
    }

    fields
        .into_iter()
        .filter(|(_, content)| !content.is_empty())
        .map(|(field, content)| PropagatedEntry {
            field: field.to_string(),
            content,
            source_version: version,
        })
        .collect()
}

/// Replace everything propagated at or before `version` with `incoming`
pub fn apply_propagation(
    existing: &[PropagatedEntry],
    incoming: Vec<PropagatedEntry>,
    version: u32,
) -> Vec<PropagatedEntry> {
    let mut kept: Vec<PropagatedEntry> = existing
        .iter()
        .filter(|e| e.source_version > version)
        .cloned()
        .collect();
    kept.extend(incoming);
    kept
}

/// Text block appended to a child's context before gap analysis
pub fn render_propagated(entries: &[PropagatedEntry]) -> Option<String> {
    let version = entries.iter().map(|e| e.source_version).max()?;
    let body = entries
        .iter()
        .map(|e| format!("[{}]\n{}", e.field, e.content))
        .collect::<Vec<_>>()
        .join("\n\n");
    Some(format!(
        "=== Workspace Context (analysis v{}) ===\n{}",
        version, body
    ))
}

pub struct WorkspaceAnalyzer {
    gateway: Arc<ModelGateway>,
}

impl WorkspaceAnalyzer {
    pub fn new(gateway: Arc<ModelGateway>) -> Self {
        Self { gateway }
    }

    pub async fn analyze(
        &self,
        workspace_name: &str,
        material: &str,
        language: Language,
    ) -> Result<WorkspaceAnalysis> {
        if material.trim().is_empty() {
            return Err(PipelineError::Validation(
                "workspace has no documents to analyze".to_string(),
            ));
        }

        let prompt = self.gateway.prompts().get_prompt(
            "workspace_analysis",
            &[
                ("language_instruction", language.instruction()),
                ("workspace_name", workspace_name),
                ("content", material),
            ],
        )?;
        let request = self.gateway.request(prompt)?.with_max_tokens(8192);

        let analysis: WorkspaceAnalysis = self
            .gateway
            .complete_json("workspace_analysis", request, |a: &WorkspaceAnalysis| {
                if a.is_empty() {
                    Err("analysis has no content".to_string())
                } else {
                    Ok(())
                }
            })
            .await?;

        info!(
            "Workspace analysis: {} feature(s), {} module(s), {} technical risk(s)",
            analysis.identified_features.len(),
            analysis.suggested_modules.len(),
            analysis.technical_risks.len()
        );
        Ok(analysis)
    }
}
