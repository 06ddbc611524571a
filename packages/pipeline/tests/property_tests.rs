// ABOUTME: Property tests for the pipeline's pure guarantees
// ABOUTME: No ungrounded facts survive extraction, merges are idempotent, answers always win

use docforge_pipeline::assembly::resolve_document;
use docforge_pipeline::extraction::{post_process, RawExtraction};
use docforge_pipeline::grounding::Grounding;
use docforge_pipeline::merge::{merge_analyses, merge_extractions, merge_strings};
use docforge_pipeline::workspace::{IdentifiedFeature, WorkspaceAnalysis};
use docforge_pipeline::{ExtractionResult, Gap, SectionKey, SectionSource, Template};
use proptest::prelude::*;
use std::collections::BTreeMap;

fn words() -> impl Strategy<Value = String> {
    "[a-z]{1,8}( [a-z]{1,8}){0,3}"
}

fn extraction_from(info: BTreeMap<SectionKey, String>, features: Vec<String>) -> ExtractionResult {
    let template = Template::enterprise_prd();
    let gaps: Vec<Gap> = template
        .sections()
        .iter()
        .filter(|s| !info.contains_key(&s.key))
        .map(Gap::from_section)
        .collect();
    ExtractionResult {
        product_name: "Ledger".to_string(),
        confidence_scores: info.keys().map(|k| (*k, 1.0)).collect(),
        extracted_info: info,
        explicit_features: features,
        inferred_features: Vec::new(),
        gaps,
    }
}

fn extraction_strategy() -> impl Strategy<Value = ExtractionResult> {
    (
        prop::sample::subsequence(SectionKey::ALL.to_vec(), 0..=15),
        prop::collection::vec(words(), 15),
        prop::collection::vec(words(), 0..4),
    )
        .prop_map(|(keys, texts, features)| {
            let info = keys.into_iter().zip(texts).collect();
            extraction_from(info, features)
        })
}

fn analysis_strategy() -> impl Strategy<Value = WorkspaceAnalysis> {
    (
        "[a-z ]{0,12}",
        prop::collection::vec(words(), 0..4),
        prop::collection::vec(words(), 0..4),
        prop::collection::vec(words(), 0..3),
    )
        .prop_map(|(summary, risks, objectives, features)| WorkspaceAnalysis {
            executive_summary: summary,
            technical_risks: risks,
            business_objectives: objectives,
            identified_features: features
                .into_iter()
                .map(|name| IdentifiedFeature {
                    name,
                    description: String::new(),
                })
                .collect(),
            ..Default::default()
        })
}

proptest! {
    // ========================================================================
    // No hallucination
    // ========================================================================

    #[test]
    fn prop_extracted_content_is_grounded(
        source_words in prop::collection::vec("[A-P][a-z]{2,6}", 1..6),
        invented in prop::collection::vec("Q[a-z]{2,6}", 0..4),
        mix in prop::collection::vec(any::<bool>(), 6),
    ) {
        let source = source_words
            .iter()
            .map(|w| format!("{} ships weekly.", w))
            .collect::<Vec<_>>()
            .join(" ");

        let sentences: Vec<String> = mix
            .iter()
            .enumerate()
            .map(|(i, use_source)| {
                if *use_source || invented.is_empty() {
                    format!("{} ships weekly.", source_words[i % source_words.len()])
                } else {
                    format!("{} ships weekly.", invented[i % invented.len()])
                }
            })
            .collect();

        let mut raw = RawExtraction::default();
        raw.extracted_info.insert(
            "solution_overview".to_string(),
            serde_json::Value::String(sentences.join(" ")),
        );
        raw.extracted_info.insert(
            "kpis_metrics".to_string(),
            serde_json::Value::Array(invented.iter().map(|w| serde_json::Value::String(w.clone())).collect()),
        );

        let result = post_process(raw, &source, &Template::enterprise_prd(), 0.3).unwrap();
        let grounding = Grounding::new(&source);
        for content in result.extracted_info.values() {
            prop_assert!(grounding.is_grounded(content), "ungrounded content kept: {}", content);
        }
        prop_assert!(result.verify_exclusive().is_ok());
    }

    // ========================================================================
    // Idempotent merge
    // ========================================================================

    #[test]
    fn prop_list_merge_is_idempotent(
        a in prop::collection::vec(words(), 0..6),
        b in prop::collection::vec(words(), 0..6),
    ) {
        let once = merge_strings(&a, &b);
        prop_assert_eq!(merge_strings(&once, &b), once.clone());
        for item in &b {
            prop_assert!(once.iter().any(|m| m.eq_ignore_ascii_case(item)));
        }
    }

    #[test]
    fn prop_extraction_merge_is_idempotent(a in extraction_strategy(), b in extraction_strategy()) {
        let template = Template::enterprise_prd();
        let once = merge_extractions(&a, &b, &template).unwrap();
        let twice = merge_extractions(&once, &b, &template).unwrap();
        prop_assert_eq!(twice, once.clone());

        for key in a.extracted_info.keys().chain(b.extracted_info.keys()) {
            prop_assert!(once.extracted_info.contains_key(key));
        }
    }

    #[test]
    fn prop_analysis_merge_is_idempotent(a in analysis_strategy(), b in analysis_strategy()) {
        let once = merge_analyses(&a, &b);
        prop_assert_eq!(merge_analyses(&once, &b), once);
    }

    // ========================================================================
    // Precedence law
    // ========================================================================

    #[test]
    fn prop_answers_override_extraction(
        extraction in extraction_strategy(),
        answered in prop::sample::subsequence(SectionKey::ALL.to_vec(), 0..=15),
        texts in prop::collection::vec(words(), 15),
    ) {
        let answers: BTreeMap<SectionKey, String> = answered.into_iter().zip(texts).collect();
        let resolved = resolve_document(&extraction, &answers, &Template::enterprise_prd());

        for (key, answer) in &answers {
            prop_assert_eq!(
                resolved.get(key),
                Some(&(SectionSource::Answer, answer.trim().to_string()))
            );
        }
        for (key, (source, text)) in &resolved {
            prop_assert!(!text.trim().is_empty());
            if !answers.contains_key(key) {
                prop_assert_eq!(*source, SectionSource::Extracted);
            }
        }
    }
}
