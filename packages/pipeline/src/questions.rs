// ABOUTME: Gap/question engine: selects which gaps to ask about and phrases them
// ABOUTME: Selection is pure and tiered by priority; the model only supplies wording

use docforge_core::Priority;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::Result;
use crate::gateway::ModelGateway;
use crate::language::Language;
use crate::template::{SectionKey, Template};
use crate::types::{ExtractionResult, Gap};

/// Gaps chosen for asking, in asking order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuestionPlan {
    pub selected: Vec<Gap>,
    /// Critical gaps alone exceeded the cap; all of them were kept
    pub soft_cap_exceeded: bool,
    /// Eligible gaps left out because of the cap
    pub dropped: usize,
}

impl QuestionPlan {
    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuestionBatch {
    pub questions: Vec<Gap>,
    pub soft_cap_exceeded: bool,
}

/// Decide which gaps get a question.
///
/// Critical and important gaps are eligible, optional ones only when
/// `include_optional` is set. Keys in `known_answers` are excluded. Ordering is
/// by tier, then template order. The cap trims the lowest tiers first and never
/// drops a critical gap.
pub fn plan_questions(
    result: &ExtractionResult,
    template: &Template,
    max_questions: usize,
    known_answers: &BTreeMap<SectionKey, String>,
    include_optional: bool,
) -> QuestionPlan {
    let mut eligible: Vec<&Gap> = result
        .gaps
        .iter()
        .filter(|g| !known_answers.contains_key(&g.section_key))
        .filter(|g| g.priority.asked_by_default() || include_optional)
        .collect();
    eligible.sort_by_key(|g| (g.priority, template.position(g.section_key)));

    let critical = eligible
        .iter()
        .filter(|g| g.priority == Priority::Critical)
        .count();

    let (keep, soft_cap_exceeded) = if critical > max_questions {
        warn!(
            "{} critical gaps exceed the question cap of {}; asking all of them",
            critical, max_questions
        );
        (critical, true)
    } else {
        (eligible.len().min(max_questions), false)
    };

    QuestionPlan {
        dropped: eligible.len() - keep,
        selected: eligible.into_iter().take(keep).cloned().collect(),
        soft_cap_exceeded,
    }
}

#[derive(Debug, Deserialize)]
struct RawQuestion {
    section_key: String,
    #[serde(default)]
    question: String,
    #[serde(default)]
    context: String,
    #[serde(default)]
    options: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RawQuestions {
    questions: Vec<RawQuestion>,
}

pub struct QuestionEngine {
    gateway: Arc<ModelGateway>,
    template: Arc<Template>,
    include_optional: bool,
}

impl QuestionEngine {
    pub fn new(gateway: Arc<ModelGateway>, template: Arc<Template>, include_optional: bool) -> Self {
        Self {
            gateway,
            template,
            include_optional,
        }
    }

    pub fn plan(
        &self,
        result: &ExtractionResult,
        max_questions: usize,
        known_answers: &BTreeMap<SectionKey, String>,
    ) -> QuestionPlan {
        plan_questions(
            result,
            &self.template,
            max_questions,
            known_answers,
            self.include_optional,
        )
    }

    pub async fn generate_questions(
        &self,
        result: &ExtractionResult,
        max_questions: usize,
        known_answers: &BTreeMap<SectionKey, String>,
        language: Language,
    ) -> Result<QuestionBatch> {
        let plan = self.plan(result, max_questions, known_answers);
        if plan.is_empty() {
            info!("No eligible gaps; skipping question generation");
            return Ok(QuestionBatch {
                questions: Vec::new(),
                soft_cap_exceeded: plan.soft_cap_exceeded,
            });
        }

        let known = Self::describe_known(result, known_answers);
        let gaps = plan
            .selected
            .iter()
            .map(|g| {
                let description = self
                    .template
                    .get(g.section_key)
                    .map(|s| s.description)
                    .unwrap_or_default();
                format!("- {} ({}, {}): {}", g.section_key, g.section_title, g.priority, description)
            })
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = self.gateway.prompts().get_prompt(
            "questions",
            &[
                ("language_instruction", language.instruction()),
                ("product_name", result.product_name.as_str()),
                ("known", &known),
                ("gaps", &gaps),
            ],
        )?;
        let request = self.gateway.request(prompt)?;
        let raw: RawQuestions = self
            .gateway
            .complete_json("questions", request, |_| Ok(()))
            .await?;

        let mut phrased: BTreeMap<SectionKey, RawQuestion> = BTreeMap::new();
        for q in raw.questions {
            match q.section_key.trim().parse::<SectionKey>() {
                Ok(key) if plan.selected.iter().any(|g| g.section_key == key) => {
                    phrased.entry(key).or_insert(q);
                }
                _ => warn!("Ignoring question for unrequested section '{}'", q.section_key),
            }
        }

        let questions: Vec<Gap> = plan
            .selected
            .into_iter()
            .map(|mut gap| {
                match phrased.remove(&gap.section_key) {
                    Some(q) if !q.question.trim().is_empty() => {
                        gap.question = q.question.trim().to_string();
                        gap.context = q.context.trim().to_string();
                        gap.options = q.options.filter(|o| !o.is_empty());
                    }
                    _ => {
                        if let Some(section) = self.template.get(gap.section_key) {
                            gap.question = section.fallback_question();
                            gap.context = section.description.to_string();
                        }
                    }
                }
                gap
            })
            .collect();

        info!("Generated {} question(s)", questions.len());
        Ok(QuestionBatch {
            questions,
            soft_cap_exceeded: plan.soft_cap_exceeded,
        })
    }

    fn describe_known(result: &ExtractionResult, known_answers: &BTreeMap<SectionKey, String>) -> String {
        let lines: Vec<String> = result
            .extracted_info
            .iter()
            .chain(known_answers.iter())
            .map(|(key, text)| format!("- {}: {}", key, docforge_core::truncate(text, 400)))
            .collect();
        if lines.is_empty() {
            "(nothing yet)".to_string()
        } else {
            lines.join("\n")
        }
    }
}
