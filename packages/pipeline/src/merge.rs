// ABOUTME: Deterministic merge rules for reconciling analyses across rounds of source material
// ABOUTME: Lists union by identity key new-first, scalars prefer non-empty new values, all merges idempotent

use std::collections::{BTreeMap, HashSet};

use crate::error::Result;
use crate::template::Template;
use crate::types::{ExtractionResult, Gap};
use crate::workspace::{ResourceEstimation, TechStackRecommendation, WorkspaceAnalysis};

/// Lowercase, whitespace-collapsed, trimmed. The only dedup rule; no fuzzy matching.
pub fn identity_key(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// New entries first (deduplicated), then old entries whose key was not seen
pub fn merge_lists<T, F>(previous: &[T], new: &[T], key: F) -> Vec<T>
where
    T: Clone,
    F: Fn(&T) -> String,
{
    let mut seen = HashSet::new();
    new.iter()
        .chain(previous.iter())
        .filter(|item| {
            let k = key(item);
            !k.is_empty() && seen.insert(k)
        })
        .cloned()
        .collect()
}

pub fn merge_strings(previous: &[String], new: &[String]) -> Vec<String> {
    merge_lists(previous, new, |s| identity_key(s))
}

pub fn prefer_new(previous: &str, new: &str) -> String {
    if new.trim().is_empty() {
        previous.to_string()
    } else {
        new.to_string()
    }
}

fn prefer_new_opt(previous: &Option<String>, new: &Option<String>) -> Option<String> {
    match new {
        Some(value) if !value.trim().is_empty() => Some(value.clone()),
        _ => previous.clone().or_else(|| new.clone()),
    }
}

fn merge_string_maps(
    previous: &BTreeMap<String, String>,
    new: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged = previous.clone();
    for (key, value) in new {
        let entry = merged.entry(key.clone()).or_default();
        *entry = prefer_new(entry, value);
    }
    merged
}

/// Merge two extraction runs over the same template
pub fn merge_extractions(
    previous: &ExtractionResult,
    new: &ExtractionResult,
    template: &Template,
) -> Result<ExtractionResult> {
    let mut extracted_info = BTreeMap::new();
    let mut confidence_scores = BTreeMap::new();
    for section in template.sections() {
        let key = section.key;
        let new_content = new.extracted_info.get(&key).filter(|c| !c.trim().is_empty());
        let old_content = previous.extracted_info.get(&key).filter(|c| !c.trim().is_empty());
        let (content, score) = match (new_content, old_content) {
            (Some(content), _) => (content, new.confidence_scores.get(&key)),
            (None, Some(content)) => (content, previous.confidence_scores.get(&key)),
            (None, None) => continue,
        };
        extracted_info.insert(key, content.clone());
        if let Some(score) = score {
            confidence_scores.insert(key, *score);
        }
    }

    let explicit_features = merge_strings(&previous.explicit_features, &new.explicit_features);
    let explicit_keys: HashSet<String> = explicit_features.iter().map(|f| identity_key(f)).collect();
    let inferred_features = merge_strings(&previous.inferred_features, &new.inferred_features)
        .into_iter()
        .filter(|f| !explicit_keys.contains(&identity_key(f)))
        .collect();

    let gaps = template
        .sections()
        .iter()
        .filter(|section| !extracted_info.contains_key(&section.key))
        .map(|section| {
            new.gap(section.key)
                .or_else(|| previous.gap(section.key))
                .cloned()
                .unwrap_or_else(|| Gap::from_section(section))
        })
        .collect();

    let merged = ExtractionResult {
        product_name: prefer_new(&previous.product_name, &new.product_name),
        extracted_info,
        confidence_scores,
        explicit_features,
        inferred_features,
        gaps,
    };
    merged.verify_exclusive()?;
    Ok(merged)
}

fn prefer_new_list(previous: &[String], new: &[String]) -> Vec<String> {
    if new.iter().any(|v| !v.trim().is_empty()) {
        new.to_vec()
    } else {
        previous.to_vec()
    }
}

fn merge_tech_stack(
    previous: &Option<TechStackRecommendation>,
    new: &Option<TechStackRecommendation>,
) -> Option<TechStackRecommendation> {
    match (previous, new) {
        (None, None) => None,
        (Some(p), None) => Some(p.clone()),
        (None, Some(n)) => Some(n.clone()),
        (Some(p), Some(n)) => Some(TechStackRecommendation {
            frontend: prefer_new_list(&p.frontend, &n.frontend),
            backend: prefer_new_list(&p.backend, &n.backend),
            database: prefer_new_list(&p.database, &n.database),
            infrastructure: prefer_new_list(&p.infrastructure, &n.infrastructure),
            rationale: merge_string_maps(&p.rationale, &n.rationale),
        }),
    }
}

fn merge_resources(
    previous: &Option<ResourceEstimation>,
    new: &Option<ResourceEstimation>,
) -> Option<ResourceEstimation> {
    match (previous, new) {
        (None, None) => None,
        (Some(p), None) => Some(p.clone()),
        (None, Some(n)) => Some(n.clone()),
        (Some(p), Some(n)) => Some(ResourceEstimation {
            team_size: n.team_size.or(p.team_size),
            estimated_timeline: prefer_new_opt(&p.estimated_timeline, &n.estimated_timeline),
            deadline: prefer_new_opt(&p.deadline, &n.deadline),
            required_team_size: n.required_team_size.or(p.required_team_size),
            assumptions: merge_strings(&p.assumptions, &n.assumptions),
            confidence_level: prefer_new_opt(&p.confidence_level, &n.confidence_level),
        }),
    }
}

/// Merge two workspace analyses. The version counter lives on the workspace, not here.
pub fn merge_analyses(previous: &WorkspaceAnalysis, new: &WorkspaceAnalysis) -> WorkspaceAnalysis {
    WorkspaceAnalysis {
        executive_summary: prefer_new(&previous.executive_summary, &new.executive_summary),
        architecture_overview: prefer_new(&previous.architecture_overview, &new.architecture_overview),
        project_scope: merge_string_maps(&previous.project_scope, &new.project_scope),
        business_objectives: merge_strings(&previous.business_objectives, &new.business_objectives),
        identified_features: merge_lists(
            &previous.identified_features,
            &new.identified_features,
            |f| identity_key(&f.name),
        ),
        suggested_modules: merge_lists(&previous.suggested_modules, &new.suggested_modules, |m| {
            identity_key(&m.name)
        }),
        tech_stack_recommendation: merge_tech_stack(
            &previous.tech_stack_recommendation,
            &new.tech_stack_recommendation,
        ),
        resource_estimation: merge_resources(&previous.resource_estimation, &new.resource_estimation),
        technical_risks: merge_strings(&previous.technical_risks, &new.technical_risks),
        business_risks: merge_strings(&previous.business_risks, &new.business_risks),
    }
}
