// ABOUTME: Assembly engine merging extracted content and user answers into a Document
// ABOUTME: Answers override extraction; formatting may only restructure, never add facts

use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::Result;
use crate::gateway::ModelGateway;
use crate::grounding::Grounding;
use crate::language::Language;
use crate::template::{SectionKey, Template, TemplateSection};
use crate::types::{Document, DocumentSection, ExtractionResult, SectionSource};

/// Content per section after precedence. Blank sections are absent.
pub fn resolve_document(
    extraction: &ExtractionResult,
    answers: &BTreeMap<SectionKey, String>,
    template: &Template,
) -> BTreeMap<SectionKey, (SectionSource, String)> {
    template
        .sections()
        .iter()
        .filter_map(|section| {
            let key = section.key;
            match answers.get(&key).filter(|a| !a.trim().is_empty()) {
                Some(answer) => Some((key, (SectionSource::Answer, answer.trim().to_string()))),
                None => extraction
                    .extracted_info
                    .get(&key)
                    .filter(|text| !text.trim().is_empty())
                    .map(|text| (key, (SectionSource::Extracted, text.trim().to_string()))),
            }
        })
        .collect()
}

pub struct AssemblyEngine {
    gateway: Arc<ModelGateway>,
    template: Arc<Template>,
}

impl AssemblyEngine {
    pub fn new(gateway: Arc<ModelGateway>, template: Arc<Template>) -> Self {
        Self { gateway, template }
    }

    pub async fn assemble(
        &self,
        extraction: &ExtractionResult,
        answers: &BTreeMap<SectionKey, String>,
        language: Language,
        version: u32,
    ) -> Result<Document> {
        let resolved = resolve_document(extraction, answers, &self.template);
        let mut sections = BTreeMap::new();

        for (key, (source, text)) in resolved {
            let Some(section) = self.template.get(key) else {
                continue;
            };
            let (formatted, degraded) = self.format_section(section, &text, language).await;
            sections.insert(
                key,
                DocumentSection {
                    key,
                    title: section.title.to_string(),
                    priority: section.priority,
                    source,
                    resolved: text,
                    formatted,
                    degraded,
                },
            );
        }

        let mut metadata = BTreeMap::new();
        metadata.insert("Version".to_string(), version.to_string());
        metadata.insert("Generated".to_string(), Utc::now().format("%Y-%m-%d %H:%M UTC").to_string());
        metadata.insert("Language".to_string(), language.name().to_string());

        let document = Document {
            product_name: if extraction.product_name.trim().is_empty() {
                "Untitled Product".to_string()
            } else {
                extraction.product_name.clone()
            },
            sections,
            critical: self.template.critical_keys(),
            metadata,
            version,
        };

        let missing = document.missing_critical();
        if !missing.is_empty() {
            warn!("Assembled document lacks {} critical section(s)", missing.len());
        }
        info!(
            "Assembled document with {} section(s), {} degraded",
            document.sections.len(),
            document.degraded_sections().len()
        );
        Ok(document)
    }

    /// Returns the text to publish and whether it fell back to the raw content
    async fn format_section(&self, section: &TemplateSection, raw: &str, language: Language) -> (String, bool) {
        let formatted = match self.request_formatting(section, raw, language).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Formatting failed for {}, keeping raw text: {}", section.key, e);
                return (raw.to_string(), true);
            }
        };

        if formatted.trim().is_empty() {
            warn!("Formatting for {} came back empty, keeping raw text", section.key);
            return (raw.to_string(), true);
        }

        let grounding = Grounding::new(raw).with_extra(section.title);
        let added = grounding.ungrounded(&formatted);
        if !added.is_empty() {
            warn!(
                "Formatting for {} introduced unsupported terms {:?}, keeping raw text",
                section.key, added
            );
            return (raw.to_string(), true);
        }

        (formatted, false)
    }

    async fn request_formatting(&self, section: &TemplateSection, raw: &str, language: Language) -> Result<String> {
        let prompt = self.gateway.prompts().get_prompt(
            "format_section",
            &[
                ("language_instruction", language.instruction()),
                ("title", section.title),
                ("description", section.description),
                ("content", raw),
            ],
        )?;
        let request = self.gateway.request(prompt)?.with_temperature(0.2);
        self.gateway.complete("format_section", request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docforge_ai::{AIServiceError, AIServiceResult, CompletionRequest, LanguageModel};
    use docforge_prompts::PromptManager;
    use std::time::Duration;

    /// Echoes the CONTENT block, optionally with a suffix appended
    struct Echo {
        suffix: &'static str,
        fail: bool,
    }

    #[async_trait]
    impl LanguageModel for Echo {
        async fn complete(&self, request: CompletionRequest) -> AIServiceResult<String> {
            if self.fail {
                return Err(AIServiceError::ApiError("down".into()));
            }
            let content = request
                .user_prompt
                .split("CONTENT:\n")
                .nth(1)
                .and_then(|rest| rest.split("\n\nRespond").next())
                .unwrap_or_default();
            Ok(format!("{}{}", content, self.suffix))
        }
    }

    fn engine(model: Echo) -> AssemblyEngine {
        let gateway = ModelGateway::new(
            Arc::new(model),
            Arc::new(PromptManager::builtin().unwrap()),
            Duration::from_secs(5),
        );
        AssemblyEngine::new(Arc::new(gateway), Arc::new(Template::enterprise_prd()))
    }

    fn extraction(pairs: &[(SectionKey, &str)]) -> ExtractionResult {
        ExtractionResult {
            product_name: "Ledger".into(),
            extracted_info: pairs.iter().map(|(k, v)| (*k, v.to_string())).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_answers_override_extraction() {
        let template = Template::enterprise_prd();
        let mut answers = BTreeMap::new();
        answers.insert(SectionKey::PersonasRoles, "Admin: Jane".to_string());

        let resolved = resolve_document(
            &extraction(&[(SectionKey::PersonasRoles, "Operators")]),
            &answers,
            &template,
        );
        assert_eq!(
            resolved[&SectionKey::PersonasRoles],
            (SectionSource::Answer, "Admin: Jane".to_string())
        );
    }

    #[tokio::test]
    async fn test_blank_section_is_omitted() {
        let doc = engine(Echo { suffix: "", fail: false })
            .assemble(
                &extraction(&[(SectionKey::UxFlows, "   "), (SectionKey::BusinessContext, "Ledger for SMBs")]),
                &BTreeMap::new(),
                Language::En,
                1,
            )
            .await
            .unwrap();

        assert!(doc.section(SectionKey::UxFlows).is_none());
        assert!(!doc.to_markdown().contains("UX & Flows"));
        assert!(doc.section(SectionKey::BusinessContext).is_some());
    }

    #[tokio::test]
    async fn test_formatting_that_adds_facts_is_rejected() {
        let doc = engine(Echo { suffix: " Integrates with Stripe.", fail: false })
            .assemble(
                &extraction(&[(SectionKey::SolutionOverview, "Ledger reconciles payouts")]),
                &BTreeMap::new(),
                Language::En,
                1,
            )
            .await
            .unwrap();

        let section = doc.section(SectionKey::SolutionOverview).unwrap();
        assert!(section.degraded);
        assert_eq!(section.formatted, "Ledger reconciles payouts");
    }

    #[tokio::test]
    async fn test_failed_formatting_degrades() {
        let doc = engine(Echo { suffix: "", fail: true })
            .assemble(
                &extraction(&[(SectionKey::SolutionOverview, "Ledger reconciles payouts")]),
                &BTreeMap::new(),
                Language::En,
                1,
            )
            .await
            .unwrap();

        assert_eq!(doc.degraded_sections(), vec![SectionKey::SolutionOverview]);
        assert!(!doc.is_complete());
    }
}
