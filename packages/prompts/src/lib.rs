// ABOUTME: Centralized prompt management for every language-model call in the pipeline
// ABOUTME: Built-in JSON prompts are embedded at compile time and can be overridden from a directory

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum PromptError {
    #[error("Prompt not found: {0}")]
    NotFound(String),

    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Failed to read prompt file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse prompt JSON: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Invalid prompt format: {0}")]
    InvalidFormat(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptMetadata {
    pub version: String,
    #[serde(rename = "lastModified")]
    pub last_modified: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompt {
    pub id: String,
    pub name: String,
    pub category: String,
    pub template: String,
    pub parameters: Vec<String>,
    #[serde(rename = "outputSchema", skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PromptMetadata>,
}

impl Prompt {
    fn validate(self, origin: &str) -> Result<Self, PromptError> {
        if self.id.is_empty() || self.template.is_empty() || self.category.is_empty() {
            return Err(PromptError::InvalidFormat(format!(
                "Invalid prompt format in {}",
                origin
            )));
        }
        Ok(self)
    }
}

const BUILTIN_PROMPTS: &[(&str, &str)] = &[
    ("system/prd.json", include_str!("../system/prd.json")),
    ("system/strict_json.json", include_str!("../system/strict_json.json")),
    ("prd/extraction.json", include_str!("../prd/extraction.json")),
    ("prd/questions.json", include_str!("../prd/questions.json")),
    ("prd/format_section.json", include_str!("../prd/format_section.json")),
    ("prd/change_summary.json", include_str!("../prd/change_summary.json")),
    ("prd/backlog.json", include_str!("../prd/backlog.json")),
    ("prd/workspace_analysis.json", include_str!("../prd/workspace_analysis.json")),
    ("prd/language_detection.json", include_str!("../prd/language_detection.json")),
];

const CATEGORY_DIRS: &[&str] = &["prd", "system"];

/// Immutable prompt catalog, safe to share across tasks behind an `Arc`.
#[derive(Debug, Clone)]
pub struct PromptManager {
    prompts: HashMap<String, Prompt>,
}

impl PromptManager {
    /// Create a PromptManager from the built-in prompts, optionally overridden by
    /// `<dir>/prd/*.json` and `<dir>/system/*.json`
    pub fn new(overrides_dir: Option<&Path>) -> Result<Self, PromptError> {
        let mut manager = Self::builtin()?;
        if let Some(dir) = overrides_dir {
            manager.load_overrides(dir)?;
        }
        Ok(manager)
    }

    /// Only the prompts compiled into the binary
    pub fn builtin() -> Result<Self, PromptError> {
        let mut prompts = HashMap::new();
        for (origin, raw) in BUILTIN_PROMPTS {
            let prompt: Prompt = serde_json::from_str(raw)?;
            let prompt = prompt.validate(origin)?;
            prompts.insert(prompt.id.clone(), prompt);
        }
        Ok(Self { prompts })
    }

    fn load_overrides(&mut self, dir: &Path) -> Result<(), PromptError> {
        for category in CATEGORY_DIRS {
            let category_dir = dir.join(category);
            if !category_dir.exists() {
                continue;
            }

            for entry in fs::read_dir(&category_dir)? {
                let path = entry?.path();
                if path.extension().and_then(|s| s.to_str()) != Some("json") {
                    continue;
                }

                let content = fs::read_to_string(&path)?;
                let prompt: Prompt = serde_json::from_str(&content)?;
                let prompt = prompt.validate(&path.display().to_string())?;
                debug!("Prompt '{}' overridden from {}", prompt.id, path.display());
                self.prompts.insert(prompt.id.clone(), prompt);
            }
        }
        info!("Loaded prompt overrides from {}", dir.display());
        Ok(())
    }

    /// Get a prompt by ID with parameter substitution
    pub fn get_prompt(&self, prompt_id: &str, parameters: &[(&str, &str)]) -> Result<String, PromptError> {
        let prompt = self.get_prompt_metadata(prompt_id)?;
        substitute_parameters(&prompt.template, parameters, &prompt.parameters)
    }

    /// Get a system prompt by id; system prompts take no parameters
    pub fn get_system_prompt(&self, prompt_id: &str) -> Result<String, PromptError> {
        let prompt = self.get_prompt_metadata(prompt_id)?;
        if prompt.category != "system" {
            return Err(PromptError::NotFound(format!("system/{}", prompt_id)));
        }
        Ok(prompt.template.clone())
    }

    /// Get prompt metadata without substitution
    pub fn get_prompt_metadata(&self, prompt_id: &str) -> Result<&Prompt, PromptError> {
        self.prompts
            .get(prompt_id)
            .ok_or_else(|| PromptError::NotFound(prompt_id.to_string()))
    }

    /// List prompt ids in a category, sorted
    pub fn list_prompts(&self, category: &str) -> Vec<String> {
        let by_id: BTreeMap<&str, &Prompt> = self
            .prompts
            .iter()
            .filter(|(_, p)| p.category == category)
            .map(|(id, p)| (id.as_str(), p))
            .collect();
        by_id.keys().map(|id| id.to_string()).collect()
    }
}

/// Replace `{{parameter}}` placeholders after checking every required parameter is present
fn substitute_parameters(
    template: &str,
    parameters: &[(&str, &str)],
    required_params: &[String],
) -> Result<String, PromptError> {
    let param_map: HashMap<&str, &str> = parameters.iter().copied().collect();

    for required in required_params {
        if !param_map.contains_key(required.as_str()) {
            return Err(PromptError::MissingParameter(required.clone()));
        }
    }

    let mut result = template.to_string();
    for (key, value) in parameters {
        let placeholder = format!("{{{{{}}}}}", key);
        result = result.replace(&placeholder, value);
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_system_prompt() {
        let manager = PromptManager::builtin().unwrap();
        let prompt = manager.get_system_prompt("prd").unwrap();
        assert!(prompt.contains("product analyst"));
        assert!(prompt.contains("never invent"));
    }

    #[test]
    fn test_load_prompt_with_parameters() {
        let manager = PromptManager::builtin().unwrap();
        let prompt = manager
            .get_prompt(
                "extraction",
                &[
                    ("language_instruction", "Write in English."),
                    ("sections", "- business_context"),
                    ("content", "Acme sells anvils"),
                ],
            )
            .unwrap();
        assert!(prompt.contains("Acme sells anvils"));
        assert!(prompt.contains("extracted_info"));
        assert!(!prompt.contains("{{content}}"));
    }

    #[test]
    fn test_missing_parameter_error() {
        let manager = PromptManager::builtin().unwrap();
        let result = manager.get_prompt("extraction", &[]);
        assert!(matches!(result, Err(PromptError::MissingParameter(_))));
    }

    #[test]
    fn test_prompt_not_found() {
        let manager = PromptManager::builtin().unwrap();
        let result = manager.get_prompt("nonexistent", &[]);
        assert!(matches!(result, Err(PromptError::NotFound(_))));
    }

    #[test]
    fn test_user_prompt_is_not_a_system_prompt() {
        let manager = PromptManager::builtin().unwrap();
        assert!(matches!(
            manager.get_system_prompt("extraction"),
            Err(PromptError::NotFound(_))
        ));
    }

    #[test]
    fn test_list_prompts() {
        let manager = PromptManager::builtin().unwrap();
        let prompts = manager.list_prompts("prd");
        assert!(prompts.contains(&"extraction".to_string()));
        assert!(prompts.contains(&"questions".to_string()));
        assert!(!prompts.contains(&"strict_json".to_string()));
    }

    #[test]
    fn test_directory_overrides_builtin() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("prd")).unwrap();
        fs::write(
            dir.path().join("prd").join("change_summary.json"),
            r#"{"id":"change_summary","name":"Short","category":"prd","template":"Changed: {{added}}","parameters":["added"]}"#,
        )
        .unwrap();

        let manager = PromptManager::new(Some(dir.path())).unwrap();
        let prompt = manager.get_prompt("change_summary", &[("added", "Risks")]).unwrap();
        assert_eq!(prompt, "Changed: Risks");
        // Untouched prompts still come from the built-in set
        assert!(manager.get_prompt_metadata("extraction").is_ok());
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("system")).unwrap();
        fs::write(
            dir.path().join("system").join("prd.json"),
            r#"{"id":"prd","name":"Empty","category":"system","template":"","parameters":[]}"#,
        )
        .unwrap();

        let result = PromptManager::new(Some(dir.path()));
        assert!(matches!(result, Err(PromptError::InvalidFormat(_))));
    }
}
