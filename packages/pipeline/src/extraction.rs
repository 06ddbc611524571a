// ABOUTME: Extraction engine that copies source facts into template sections
// ABOUTME: Model output is post-processed so nothing ungrounded, duplicated or low-confidence survives

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::gateway::ModelGateway;
use crate::grounding::{normalize_sentence, split_sentences, Grounding};
use crate::language::Language;
use crate::merge::identity_key;
use crate::template::{SectionKey, Template};
use crate::types::{ExtractionResult, Gap};

/// Score assumed for kept content the model did not score
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Model reply before any of the guarantees are applied
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawExtraction {
    #[serde(default)]
    pub product_name: Option<String>,
    pub extracted_info: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub confidence_scores: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub explicit_features: Vec<String>,
    #[serde(default)]
    pub inferred_features: Vec<String>,
}

/// Flatten whatever shape the model used for a section into plain lines
fn flatten_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(items) => items
            .iter()
            .map(flatten_value)
            .filter(|s| !s.trim().is_empty())
            .map(|s| format!("- {}", s.trim()))
            .collect::<Vec<_>>()
            .join("\n"),
        serde_json::Value::Object(fields) => fields
            .iter()
            .map(|(k, v)| (k, flatten_value(v)))
            .filter(|(_, v)| !v.trim().is_empty())
            .map(|(k, v)| format!("{}: {}", k.replace('_', " "), v.trim()))
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

fn score_of(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|score| score.is_finite())
}

type Lines = Vec<Vec<String>>;

/// Apply grounding, confidence, tie-break and exclusivity rules to a raw model reply
pub fn post_process(
    raw: RawExtraction,
    source: &str,
    template: &Template,
    min_confidence: f64,
) -> Result<ExtractionResult> {
    let grounding = Grounding::new(source);

    // Grounded sentences per section, confidence already applied
    let mut candidates: Vec<(SectionKey, Lines, f64)> = Vec::new();
    for (raw_key, value) in &raw.extracted_info {
        let key = match template.parse_key(raw_key) {
            Ok(key) => key,
            Err(_) => {
                warn!("Dropping unknown section '{}' returned by the model", raw_key);
                continue;
            }
        };

        let mut dropped = 0usize;
        let lines: Lines = flatten_value(value)
            .lines()
            .map(|line| {
                split_sentences(line)
                    .into_iter()
                    .filter(|sentence| {
                        let grounded = grounding.is_grounded(sentence);
                        if !grounded {
                            dropped += 1;
                        }
                        grounded
                    })
                    .collect::<Vec<_>>()
            })
            .filter(|line| !line.is_empty())
            .collect();

        if dropped > 0 {
            warn!(
                "Dropped {} ungrounded sentence(s) from section {}",
                dropped, key
            );
        }
        if lines.is_empty() {
            continue;
        }

        let score = raw
            .confidence_scores
            .get(raw_key)
            .and_then(score_of)
            .unwrap_or(DEFAULT_CONFIDENCE)
            .clamp(0.0, 1.0);
        if score <= 0.0 || score < min_confidence {
            info!(
                "Section {} treated as a gap (confidence {:.2} below {:.2})",
                key, score, min_confidence
            );
            continue;
        }

        candidates.push((key, lines, score));
    }
    candidates.sort_by_key(|(key, _, _)| template.position(*key));

    // A sentence belongs to the narrowest section claiming it; ties go to the earlier one
    let mut owner: HashMap<String, SectionKey> = HashMap::new();
    for (key, lines, _) in &candidates {
        let specificity = template.get(*key).map(|s| s.specificity).unwrap_or(0);
        for sentence in lines.iter().flatten() {
            let normalized = normalize_sentence(sentence);
            if normalized.is_empty() {
                continue;
            }
            let claim = owner.entry(normalized).or_insert(*key);
            let current = template.get(*claim).map(|s| s.specificity).unwrap_or(0);
            if specificity > current {
                *claim = *key;
            }
        }
    }

    let mut extracted_info = BTreeMap::new();
    let mut confidence_scores = BTreeMap::new();
    for (key, lines, score) in candidates {
        let mut kept_here = HashSet::new();
        let content = lines
            .into_iter()
            .map(|line| {
                line.into_iter()
                    .filter(|sentence| {
                        let normalized = normalize_sentence(sentence);
                        owner.get(&normalized) == Some(&key) && kept_here.insert(normalized)
                    })
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .filter(|line| !line.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        if content.trim().is_empty() {
            continue;
        }
        extracted_info.insert(key, content);
        confidence_scores.insert(key, score);
    }

    // Explicit features must be grounded; the rest are demoted to inferred
    let mut seen = HashSet::new();
    let mut explicit_features = Vec::new();
    let mut demoted = Vec::new();
    for feature in &raw.explicit_features {
        let feature = feature.trim();
        let key = identity_key(feature);
        if key.is_empty() || seen.contains(&key) {
            continue;
        }
        if grounding.is_grounded(feature) {
            seen.insert(key);
            explicit_features.push(feature.to_string());
        } else {
            warn!("Demoting ungrounded explicit feature to inferred: {}", feature);
            demoted.push(feature.to_string());
        }
    }
    let mut inferred_features = Vec::new();
    for feature in raw.inferred_features.iter().map(|f| f.trim().to_string()).chain(demoted) {
        let key = identity_key(&feature);
        if !key.is_empty() && seen.insert(key) {
            inferred_features.push(feature);
        }
    }

    let product_name = match raw.product_name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() && grounding.is_grounded(name) => name.to_string(),
        Some(name) if !name.is_empty() => {
            warn!("Ignoring product name not found in the source: {}", name);
            String::new()
        }
        _ => String::new(),
    };

    let gaps = template
        .sections()
        .iter()
        .filter(|section| !extracted_info.contains_key(&section.key))
        .map(Gap::from_section)
        .collect();

    let result = ExtractionResult {
        product_name,
        extracted_info,
        confidence_scores,
        explicit_features,
        inferred_features,
        gaps,
    };
    result.verify_exclusive()?;
    Ok(result)
}

pub struct ExtractionEngine {
    gateway: Arc<ModelGateway>,
    template: Arc<Template>,
    min_confidence: f64,
}

impl ExtractionEngine {
    pub fn new(gateway: Arc<ModelGateway>, template: Arc<Template>, min_confidence: f64) -> Self {
        Self {
            gateway,
            template,
            min_confidence,
        }
    }

    fn section_catalog(&self) -> String {
        self.template
            .sections()
            .iter()
            .map(|s| {
                format!(
                    "- {} ({}, {}): {}. Consider: {}",
                    s.key,
                    s.title,
                    s.priority,
                    s.description,
                    s.guiding_questions.join(" ")
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Extract section content from `raw_text`. Nothing is returned unless the
    /// model reply parses (after at most one strict retry).
    pub async fn extract(&self, raw_text: &str, language: Language) -> Result<ExtractionResult> {
        if raw_text.trim().is_empty() {
            return Err(PipelineError::Validation(
                "no source text to analyze".to_string(),
            ));
        }

        let catalog = self.section_catalog();
        let prompt = self.gateway.prompts().get_prompt(
            "extraction",
            &[
                ("language_instruction", language.instruction()),
                ("sections", &catalog),
                ("content", raw_text),
            ],
        )?;
        let request = self.gateway.request(prompt)?.with_max_tokens(8192);

        let raw: RawExtraction = self
            .gateway
            .complete_json("extraction", request, |_| Ok(()))
            .await?;

        let result = post_process(raw, raw_text, &self.template, self.min_confidence)?;
        info!(
            "Extraction complete: {} section(s) extracted, {} gap(s)",
            result.extracted_info.len(),
            result.gaps.len()
        );
        Ok(result)
    }
}
