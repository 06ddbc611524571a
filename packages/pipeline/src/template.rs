// ABOUTME: Document template registry with the fifteen enterprise PRD sections
// ABOUTME: Section keys are a closed enum; the catalog is immutable once built

use docforge_core::Priority;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{PipelineError, Result};

/// Declaration order doubles as template order (`Ord` follows it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKey {
    BusinessContext,
    ProblemDefinition,
    PersonasRoles,
    UserInsights,
    OpportunityAnalysis,
    SolutionOverview,
    FunctionalRequirements,
    UxFlows,
    TechnicalRequirements,
    AcceptanceCriteria,
    KpisMetrics,
    RisksChallenges,
    RolloutPlan,
    OutOfScope,
    Appendix,
}

impl SectionKey {
    pub const ALL: [SectionKey; 15] = [
        SectionKey::BusinessContext,
        SectionKey::ProblemDefinition,
        SectionKey::PersonasRoles,
        SectionKey::UserInsights,
        SectionKey::OpportunityAnalysis,
        SectionKey::SolutionOverview,
        SectionKey::FunctionalRequirements,
        SectionKey::UxFlows,
        SectionKey::TechnicalRequirements,
        SectionKey::AcceptanceCriteria,
        SectionKey::KpisMetrics,
        SectionKey::RisksChallenges,
        SectionKey::RolloutPlan,
        SectionKey::OutOfScope,
        SectionKey::Appendix,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SectionKey::BusinessContext => "business_context",
            SectionKey::ProblemDefinition => "problem_definition",
            SectionKey::PersonasRoles => "personas_roles",
            SectionKey::UserInsights => "user_insights",
            SectionKey::OpportunityAnalysis => "opportunity_analysis",
            SectionKey::SolutionOverview => "solution_overview",
            SectionKey::FunctionalRequirements => "functional_requirements",
            SectionKey::UxFlows => "ux_flows",
            SectionKey::TechnicalRequirements => "technical_requirements",
            SectionKey::AcceptanceCriteria => "acceptance_criteria",
            SectionKey::KpisMetrics => "kpis_metrics",
            SectionKey::RisksChallenges => "risks_challenges",
            SectionKey::RolloutPlan => "rollout_plan",
            SectionKey::OutOfScope => "out_of_scope",
            SectionKey::Appendix => "appendix",
        }
    }
}

impl fmt::Display for SectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SectionKey {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase();
        SectionKey::ALL
            .iter()
            .copied()
            .find(|key| key.as_str() == wanted)
            .ok_or_else(|| PipelineError::UnknownSection(s.to_string()))
    }
}

/// One slot of the target document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateSection {
    pub key: SectionKey,
    pub title: &'static str,
    pub priority: Priority,
    pub description: &'static str,
    pub guiding_questions: &'static [&'static str],
    /// Higher is narrower. Decides where a sentence lands when two sections claim it.
    pub specificity: u8,
}

impl TemplateSection {
    /// Question asked when the model does not supply one
    pub fn fallback_question(&self) -> String {
        self.guiding_questions
            .first()
            .map(|q| q.to_string())
            .unwrap_or_else(|| format!("Can you describe the {}?", self.title.to_lowercase()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Template {
    sections: Vec<TemplateSection>,
}

impl Template {
    pub fn new(sections: Vec<TemplateSection>) -> Result<Self> {
        let mut seen = BTreeSet::new();
        for section in &sections {
            if !seen.insert(section.key) {
                return Err(PipelineError::Validation(format!(
                    "Duplicate template section: {}",
                    section.key
                )));
            }
        }
        if sections.is_empty() {
            return Err(PipelineError::Validation("Template has no sections".to_string()));
        }
        Ok(Self { sections })
    }

    pub fn enterprise_prd() -> Self {
        Self {
            sections: enterprise_sections(),
        }
    }

    pub fn sections(&self) -> &[TemplateSection] {
        &self.sections
    }

    pub fn get(&self, key: SectionKey) -> Option<&TemplateSection> {
        self.sections.iter().find(|s| s.key == key)
    }

    pub fn contains(&self, key: SectionKey) -> bool {
        self.get(key).is_some()
    }

    /// Position in declaration order, used for tier-internal ordering
    pub fn position(&self, key: SectionKey) -> usize {
        self.sections
            .iter()
            .position(|s| s.key == key)
            .unwrap_or(usize::MAX)
    }

    pub fn by_priority(&self, priority: Priority) -> impl Iterator<Item = &TemplateSection> {
        self.sections.iter().filter(move |s| s.priority == priority)
    }

    pub fn critical_keys(&self) -> BTreeSet<SectionKey> {
        self.by_priority(Priority::Critical).map(|s| s.key).collect()
    }

    /// Resolve a caller-supplied key string against this template
    pub fn parse_key(&self, raw: &str) -> Result<SectionKey> {
        let key: SectionKey = raw.parse()?;
        if !self.contains(key) {
            return Err(PipelineError::UnknownSection(raw.to_string()));
        }
        Ok(key)
    }
}

impl Default for Template {
    fn default() -> Self {
        Self::enterprise_prd()
    }
}

fn enterprise_sections() -> Vec<TemplateSection> {
    vec![
        TemplateSection {
            key: SectionKey::BusinessContext,
            title: "Business Context Brief",
            priority: Priority::Critical,
            description: "Strategic context and business rationale",
            guiding_questions: &[
                "What is the business opportunity?",
                "Why now? (Market timing, competitive pressure)",
                "What is the expected business impact?",
                "How does this align with company strategy?",
            ],
            specificity: 1,
        },
        TemplateSection {
            key: SectionKey::ProblemDefinition,
            title: "Problem Definition",
            priority: Priority::Critical,
            description: "Detailed problem analysis",
            guiding_questions: &[
                "What problem does this solve?",
                "What is the user's main task/job-to-be-done?",
                "What are the current problems/pain points?",
                "How is this solved today and why doesn't it work?",
                "What is the cost of NOT solving this?",
            ],
            specificity: 2,
        },
        TemplateSection {
            key: SectionKey::PersonasRoles,
            title: "Personas & Roles",
            priority: Priority::Critical,
            description: "Detailed user personas and roles",
            guiding_questions: &[
                "Who are the primary users? (roles, responsibilities)",
                "What are their goals and motivations?",
                "What are their pain points and frustrations?",
                "What is their technical proficiency?",
                "What are their success criteria?",
            ],
            specificity: 3,
        },
        TemplateSection {
            key: SectionKey::UserInsights,
            title: "User Insights & Research Links",
            priority: Priority::Important,
            description: "Research data, user feedback, and insights",
            guiding_questions: &[
                "What user research supports this?",
                "What are the key insights from user interviews?",
                "What data/metrics validate the problem?",
                "Are there customer quotes or feedback?",
            ],
            specificity: 3,
        },
        TemplateSection {
            key: SectionKey::OpportunityAnalysis,
            title: "Opportunity & Market Analysis",
            priority: Priority::Important,
            description: "Market opportunity and competitive landscape",
            guiding_questions: &[
                "What is the market size/opportunity?",
                "Who are the competitors and how do they solve this?",
                "What is our differentiation?",
                "What are the market trends?",
            ],
            specificity: 2,
        },
        TemplateSection {
            key: SectionKey::SolutionOverview,
            title: "Solution Proposal (General Overview)",
            priority: Priority::Critical,
            description: "High-level solution description",
            guiding_questions: &[
                "What is the proposed solution?",
                "How does it solve the problem?",
                "What is the core value proposition?",
                "What makes this solution unique?",
            ],
            specificity: 1,
        },
        TemplateSection {
            key: SectionKey::FunctionalRequirements,
            title: "Functional Requirements",
            priority: Priority::Critical,
            description: "Detailed functional specifications",
            guiding_questions: &[
                "What are the new screens/views?",
                "What are the key behaviors and interactions?",
                "What are the different states (loading, error, success, empty)?",
                "What is the business logic?",
                "What are the visibility rules (permissions, conditions)?",
                "What are the user flows (happy path + alternatives)?",
                "What are the edge cases and exceptions?",
                "What are the exact UI texts, labels, and messages?",
                "What are the validation rules?",
                "What are the data requirements?",
            ],
            specificity: 3,
        },
        TemplateSection {
            key: SectionKey::UxFlows,
            title: "UX & Flows",
            priority: Priority::Critical,
            description: "User experience and interaction flows",
            guiding_questions: &[
                "What are the main user journeys?",
                "What are the preconditions for each flow?",
                "What are the postconditions/outcomes?",
                "What are the alternative paths?",
                "What are the error scenarios?",
                "What are the UI/UX patterns to use?",
                "What are the accessibility requirements?",
            ],
            specificity: 4,
        },
        TemplateSection {
            key: SectionKey::TechnicalRequirements,
            title: "Technical Requirements",
            priority: Priority::Critical,
            description: "Technical specifications and constraints",
            guiding_questions: &[
                "What feature flags are needed?",
                "What APIs need to be created/modified?",
                "What are the data models?",
                "What are the dependencies (internal/external)?",
                "What are the performance requirements (latency, throughput)?",
                "What are the scalability requirements?",
                "What are the security requirements?",
                "What are the technical limitations/constraints?",
                "What are the integration points?",
            ],
            specificity: 4,
        },
        TemplateSection {
            key: SectionKey::AcceptanceCriteria,
            title: "Acceptance Criteria",
            priority: Priority::Critical,
            description: "Definition of done (Gherkin format recommended)",
            guiding_questions: &[
                "What are the acceptance criteria (Given/When/Then)?",
                "What defines 'done' for each requirement?",
                "What are the test scenarios?",
                "What are the quality gates?",
                "What are the performance benchmarks?",
            ],
            specificity: 5,
        },
        TemplateSection {
            key: SectionKey::KpisMetrics,
            title: "KPIs & Metrics",
            priority: Priority::Critical,
            description: "Success metrics and KPIs",
            guiding_questions: &[
                "What are the primary success metrics?",
                "What are the leading indicators?",
                "What are the lagging indicators?",
                "How will we measure adoption?",
                "How will we measure engagement?",
                "How will we measure business impact?",
                "What are the target values/goals?",
                "How will we track these metrics?",
            ],
            specificity: 4,
        },
        TemplateSection {
            key: SectionKey::RisksChallenges,
            title: "Risks & Challenges",
            priority: Priority::Important,
            description: "Risks, challenges, and mitigation strategies",
            guiding_questions: &[
                "What are the technical risks?",
                "What are the business risks?",
                "What are the user adoption risks?",
                "What could go wrong?",
                "What are the mitigation strategies for each risk?",
                "What are the dependencies that could block us?",
                "What are the open questions/unknowns?",
            ],
            specificity: 3,
        },
        TemplateSection {
            key: SectionKey::RolloutPlan,
            title: "Rollout Plan",
            priority: Priority::Important,
            description: "Launch and rollout strategy",
            guiding_questions: &[
                "What is the rollout strategy (PEA/Beta/GA)?",
                "Who are the pilot customers?",
                "What are the key milestones?",
                "What is the timeline?",
                "What are the go/no-go criteria?",
                "What is the communication plan?",
                "What is the training/documentation plan?",
                "What is the support plan?",
            ],
            specificity: 3,
        },
        TemplateSection {
            key: SectionKey::OutOfScope,
            title: "Out of Scope",
            priority: Priority::Important,
            description: "Explicitly excluded items",
            guiding_questions: &[
                "What is explicitly NOT included in this version?",
                "What will be addressed in future phases?",
                "What alternatives were considered and rejected?",
                "What feature requests are deferred?",
            ],
            specificity: 3,
        },
        TemplateSection {
            key: SectionKey::Appendix,
            title: "Appendix",
            priority: Priority::Optional,
            description: "Supporting materials",
            guiding_questions: &[
                "Are there diagrams (flows, architecture, wireframes)?",
                "Are there technical notes?",
                "Are there example payloads/data mocks?",
                "Are there references or links?",
                "Is there a glossary?",
            ],
            specificity: 0,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enterprise_template_covers_every_key_in_order() {
        let template = Template::enterprise_prd();
        let keys: Vec<SectionKey> = template.sections().iter().map(|s| s.key).collect();
        assert_eq!(keys, SectionKey::ALL.to_vec());
    }

    #[test]
    fn test_priorities() {
        let template = Template::enterprise_prd();
        assert_eq!(template.critical_keys().len(), 9);
        assert_eq!(template.by_priority(Priority::Important).count(), 5);
        assert_eq!(
            template.get(SectionKey::Appendix).map(|s| s.priority),
            Some(Priority::Optional)
        );
        assert!(template.critical_keys().contains(&SectionKey::PersonasRoles));
    }

    #[test]
    fn test_key_parsing() {
        assert_eq!("ux_flows".parse::<SectionKey>().unwrap(), SectionKey::UxFlows);
        assert_eq!(" KPIS_METRICS ".parse::<SectionKey>().unwrap(), SectionKey::KpisMetrics);
        assert!(matches!(
            "pricing".parse::<SectionKey>(),
            Err(PipelineError::UnknownSection(_))
        ));
    }

    #[test]
    fn test_key_serializes_snake_case() {
        let json = serde_json::to_string(&SectionKey::PersonasRoles).unwrap();
        assert_eq!(json, "\"personas_roles\"");
    }

    #[test]
    fn test_narrower_section_is_more_specific() {
        let template = Template::enterprise_prd();
        let technical = template.get(SectionKey::TechnicalRequirements).unwrap();
        let functional = template.get(SectionKey::FunctionalRequirements).unwrap();
        assert!(technical.specificity > functional.specificity);
    }

    #[test]
    fn test_duplicate_sections_rejected() {
        let template = Template::enterprise_prd();
        let first = &template.sections()[..1];
        let sections = [first, first].concat();
        assert!(Template::new(sections).is_err());
    }

    #[test]
    fn test_custom_template_rejects_keys_it_lacks() {
        let sections = Template::enterprise_prd().sections()[..3].to_vec();
        let template = Template::new(sections).unwrap();
        assert!(template.parse_key("business_context").is_ok());
        assert!(template.parse_key("appendix").is_err());
    }
}
