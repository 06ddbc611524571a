// ABOUTME: Answer files for unattended runs
// ABOUTME: A JSON object mapping section keys to answer text, with null or "" meaning skip

use std::path::Path;

use serde_json::Value;

use crate::error::{CliError, CliResult};

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedAnswer {
    pub section: String,
    /// `None` records a skip
    pub answer: Option<String>,
}

pub fn parse_answers(raw: &str) -> CliResult<Vec<PlannedAnswer>> {
    let value: Value = serde_json::from_str(raw).map_err(|e| CliError::Answers(e.to_string()))?;
    let map = value
        .as_object()
        .ok_or_else(|| CliError::Answers("expected an object of section key to answer".to_string()))?;

    map.iter()
        .map(|(section, value)| {
            let answer = match value {
                Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
                Value::String(_) | Value::Null => None,
                other => {
                    return Err(CliError::Answers(format!(
                        "answer for '{}' must be a string or null, got {}",
                        section, other
                    )))
                }
            };
            Ok(PlannedAnswer {
                section: section.clone(),
                answer,
            })
        })
        .collect()
}

pub async fn load_answers(path: &Path) -> CliResult<Vec<PlannedAnswer>> {
    let raw = tokio::fs::read_to_string(path).await?;
    parse_answers(&raw)
}
