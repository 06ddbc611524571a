// ABOUTME: Value types shared by the pipeline engines
// ABOUTME: Extraction results, gaps, answers, sessions, stage flags and assembled documents

use chrono::{DateTime, Duration, Utc};
use docforge_core::Priority;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{PipelineError, Result};
use crate::template::{SectionKey, TemplateSection};

// ============================================================================
// Extraction
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gap {
    pub section_key: SectionKey,
    pub section_title: String,
    pub priority: Priority,
    /// Empty until the question engine fills it
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub context: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

impl Gap {
    pub fn from_section(section: &TemplateSection) -> Self {
        Self {
            section_key: section.key,
            section_title: section.title.to_string(),
            priority: section.priority,
            question: String::new(),
            context: String::new(),
            options: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub product_name: String,
    pub extracted_info: BTreeMap<SectionKey, String>,
    pub confidence_scores: BTreeMap<SectionKey, f64>,
    pub explicit_features: Vec<String>,
    pub inferred_features: Vec<String>,
    pub gaps: Vec<Gap>,
}

impl ExtractionResult {
    pub fn gap_keys(&self) -> BTreeSet<SectionKey> {
        self.gaps.iter().map(|g| g.section_key).collect()
    }

    pub fn gap(&self, key: SectionKey) -> Option<&Gap> {
        self.gaps.iter().find(|g| g.section_key == key)
    }

    /// A section is either extracted or missing, never both, and never missing twice
    pub fn verify_exclusive(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for gap in &self.gaps {
            if self.extracted_info.contains_key(&gap.section_key) {
                return Err(PipelineError::MergeConflict(format!(
                    "section {} is both extracted and a gap",
                    gap.section_key
                )));
            }
            if !seen.insert(gap.section_key) {
                return Err(PipelineError::MergeConflict(format!(
                    "section {} appears twice in gaps",
                    gap.section_key
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Interactive Session
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub section_key: SectionKey,
    pub section_title: String,
    pub question: String,
    pub answer: String,
    pub skipped: bool,
    pub answered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    InProgress,
    Completed,
}

/// Public view of a document's session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    NotStarted,
    InProgress,
    Completed,
}

impl SessionStatus {
    pub fn of(session: Option<&InteractiveSession>) -> Self {
        match session.map(|s| s.status) {
            None => SessionStatus::NotStarted,
            Some(SessionState::InProgress) => SessionStatus::InProgress,
            Some(SessionState::Completed) => SessionStatus::Completed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractiveSession {
    pub answers: Vec<AnswerRecord>,
    pub regeneration_count: u32,
    pub status: SessionState,
    pub started_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl InteractiveSession {
    pub fn start(now: DateTime<Utc>) -> Self {
        Self {
            answers: Vec::new(),
            regeneration_count: 0,
            status: SessionState::InProgress,
            started_at: now,
            last_updated: now,
            completed_at: None,
        }
    }

    fn ensure_open(&self, action: &str) -> Result<()> {
        match self.status {
            SessionState::InProgress => Ok(()),
            SessionState::Completed => Err(PipelineError::InvalidState(format!(
                "cannot {} a completed session",
                action
            ))),
        }
    }

    /// Last write wins per section key
    pub fn save_answer(&mut self, record: AnswerRecord) -> Result<()> {
        self.ensure_open("answer")?;
        self.last_updated = record.answered_at;
        match self
            .answers
            .iter_mut()
            .find(|a| a.section_key == record.section_key)
        {
            Some(existing) => *existing = record,
            None => self.answers.push(record),
        }
        Ok(())
    }

    pub fn finalize(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.ensure_open("finalize")?;
        self.status = SessionState::Completed;
        self.completed_at = Some(now);
        self.last_updated = now;
        Ok(())
    }

    pub fn record_regeneration(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.ensure_open("regenerate questions for")?;
        self.regeneration_count += 1;
        self.last_updated = now;
        Ok(())
    }

    pub fn answered_count(&self) -> usize {
        self.answers.iter().filter(|a| !a.skipped).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.answers.iter().filter(|a| a.skipped).count()
    }

    pub fn answer_for(&self, key: SectionKey) -> Option<&AnswerRecord> {
        self.answers.iter().find(|a| a.section_key == key)
    }

    /// Non-skipped, non-blank answers keyed by section
    pub fn known_answers(&self) -> BTreeMap<SectionKey, String> {
        self.answers
            .iter()
            .filter(|a| !a.skipped && !a.answer.trim().is_empty())
            .map(|a| (a.section_key, a.answer.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionCache {
    pub questions: Vec<Gap>,
    pub max_questions: usize,
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub soft_cap_exceeded: bool,
}

impl QuestionCache {
    /// Reporting helper only; the session never expires a cache on its own
    pub fn is_fresh(&self, max_age: std::time::Duration, now: DateTime<Utc>) -> bool {
        match Duration::from_std(max_age) {
            Ok(max_age) => now - self.generated_at <= max_age,
            Err(_) => true,
        }
    }
}

// ============================================================================
// Document State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Created,
    InputsProcessed,
    ContextGenerated,
    GapsAnalyzed,
    QuestionsGenerated,
    DocumentBuilt,
    BacklogGenerated,
}

impl PipelineStage {
    pub fn previous(&self) -> Option<PipelineStage> {
        match self {
            PipelineStage::Created => None,
            PipelineStage::InputsProcessed => Some(PipelineStage::Created),
            PipelineStage::ContextGenerated => Some(PipelineStage::InputsProcessed),
            PipelineStage::GapsAnalyzed => Some(PipelineStage::ContextGenerated),
            PipelineStage::QuestionsGenerated => Some(PipelineStage::GapsAnalyzed),
            PipelineStage::DocumentBuilt => Some(PipelineStage::QuestionsGenerated),
            PipelineStage::BacklogGenerated => Some(PipelineStage::DocumentBuilt),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Created => "created",
            PipelineStage::InputsProcessed => "inputs_processed",
            PipelineStage::ContextGenerated => "context_generated",
            PipelineStage::GapsAnalyzed => "gaps_analyzed",
            PipelineStage::QuestionsGenerated => "questions_generated",
            PipelineStage::DocumentBuilt => "document_built",
            PipelineStage::BacklogGenerated => "backlog_generated",
        }
    }
}

/// Monotone completion flags. Set only after a stage fully succeeded; never cleared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFlags {
    pub inputs_processed: bool,
    pub context_generated: bool,
    pub gaps_analyzed: bool,
    pub questions_generated: bool,
    pub document_built: bool,
    pub backlog_generated: bool,
}

impl StageFlags {
    pub fn is_set(&self, stage: PipelineStage) -> bool {
        match stage {
            PipelineStage::Created => true,
            PipelineStage::InputsProcessed => self.inputs_processed,
            PipelineStage::ContextGenerated => self.context_generated,
            PipelineStage::GapsAnalyzed => self.gaps_analyzed,
            PipelineStage::QuestionsGenerated => self.questions_generated,
            PipelineStage::DocumentBuilt => self.document_built,
            PipelineStage::BacklogGenerated => self.backlog_generated,
        }
    }

    /// Furthest stage reached
    pub fn stage(&self) -> PipelineStage {
        [
            PipelineStage::BacklogGenerated,
            PipelineStage::DocumentBuilt,
            PipelineStage::QuestionsGenerated,
            PipelineStage::GapsAnalyzed,
            PipelineStage::ContextGenerated,
            PipelineStage::InputsProcessed,
        ]
        .into_iter()
        .find(|s| self.is_set(*s))
        .unwrap_or(PipelineStage::Created)
    }

    /// Fail unless `stage` has completed
    pub fn require(&self, stage: PipelineStage) -> Result<()> {
        if self.is_set(stage) {
            Ok(())
        } else {
            Err(PipelineError::Validation(format!(
                "precondition not met: {} has not completed",
                stage.as_str()
            )))
        }
    }

    /// Record completion of `stage`; its predecessor must already be complete
    pub fn mark(&mut self, stage: PipelineStage) -> Result<()> {
        if let Some(previous) = stage.previous() {
            self.require(previous)?;
        }
        match stage {
            PipelineStage::Created => {}
            PipelineStage::InputsProcessed => self.inputs_processed = true,
            PipelineStage::ContextGenerated => self.context_generated = true,
            PipelineStage::GapsAnalyzed => self.gaps_analyzed = true,
            PipelineStage::QuestionsGenerated => self.questions_generated = true,
            PipelineStage::DocumentBuilt => self.document_built = true,
            PipelineStage::BacklogGenerated => self.backlog_generated = true,
        }
        Ok(())
    }

    /// Every set flag implies all earlier flags are set
    pub fn is_consistent(&self) -> bool {
        let chain = [
            self.inputs_processed,
            self.context_generated,
            self.gaps_analyzed,
            self.questions_generated,
            self.document_built,
            self.backlog_generated,
        ];
        chain.windows(2).all(|pair| pair[0] || !pair[1])
    }

    /// True when no flag of `self` is cleared in `next`
    pub fn never_regresses_to(&self, next: &StageFlags) -> bool {
        let before = [
            self.inputs_processed,
            self.context_generated,
            self.gaps_analyzed,
            self.questions_generated,
            self.document_built,
            self.backlog_generated,
        ];
        let after = [
            next.inputs_processed,
            next.context_generated,
            next.gaps_analyzed,
            next.questions_generated,
            next.document_built,
            next.backlog_generated,
        ];
        before.iter().zip(after.iter()).all(|(b, a)| !*b || *a)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub files_added: Vec<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub gap_keys: Vec<SectionKey>,
    #[serde(default)]
    pub gaps_detected: usize,
    #[serde(default)]
    pub questions_generated: usize,
}

// ============================================================================
// Assembled Document
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionSource {
    Answer,
    Extracted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSection {
    pub key: SectionKey,
    pub title: String,
    pub priority: Priority,
    pub source: SectionSource,
    /// Content after answer-over-extraction precedence, before formatting
    pub resolved: String,
    pub formatted: String,
    /// Formatting was rejected or failed and `formatted` is the raw text
    #[serde(default)]
    pub degraded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub product_name: String,
    pub sections: BTreeMap<SectionKey, DocumentSection>,
    pub critical: BTreeSet<SectionKey>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub version: u32,
}

impl Document {
    pub fn section(&self, key: SectionKey) -> Option<&DocumentSection> {
        self.sections.get(&key)
    }

    /// Replace a section's content, adding the section when absent. Edited text
    /// is taken verbatim, so it counts as an answer and is never degraded.
    pub fn set_section(&mut self, section: &TemplateSection, content: &str) -> Option<DocumentSection> {
        let content = content.trim().to_string();
        self.sections.insert(
            section.key,
            DocumentSection {
                key: section.key,
                title: section.title.to_string(),
                priority: section.priority,
                source: SectionSource::Answer,
                resolved: content.clone(),
                formatted: content,
                degraded: false,
            },
        )
    }

    pub fn remove_section(&mut self, key: SectionKey) -> Option<DocumentSection> {
        self.sections.remove(&key)
    }

    pub fn missing_critical(&self) -> Vec<SectionKey> {
        self.critical
            .iter()
            .copied()
            .filter(|key| {
                self.sections
                    .get(key)
                    .map(|s| s.resolved.trim().is_empty())
                    .unwrap_or(true)
            })
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_critical().is_empty()
    }

    pub fn degraded_sections(&self) -> Vec<SectionKey> {
        self.sections
            .values()
            .filter(|s| s.degraded)
            .map(|s| s.key)
            .collect()
    }

    /// (title, content) pairs in template order
    pub fn titled_sections(&self) -> Vec<(String, String)> {
        self.sections
            .values()
            .map(|s| (s.title.clone(), s.formatted.clone()))
            .collect()
    }

    pub fn to_markdown(&self) -> String {
        let mut md = format!("# {}\n\n", self.product_name);

        if !self.metadata.is_empty() {
            md.push_str("**Document Information:**\n");
            for (key, value) in &self.metadata {
                md.push_str(&format!("- **{}**: {}\n", key, value));
            }
            md.push('\n');
        }

        md.push_str("---\n\n");

        for section in self.sections.values() {
            md.push_str(&format!("## {}\n\n{}\n\n", section.title, section.formatted.trim()));
        }

        md
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::Template;

    fn answer(key: SectionKey, text: &str, skipped: bool) -> AnswerRecord {
        AnswerRecord {
            section_key: key,
            section_title: key.to_string(),
            question: "?".to_string(),
            answer: text.to_string(),
            skipped,
            answered_at: Utc::now(),
        }
    }

    #[test]
    fn test_section_edits_are_structural() {
        let template = Template::enterprise_prd();
        let mut document = Document {
            product_name: "Ledger".to_string(),
            sections: BTreeMap::new(),
            critical: template.critical_keys(),
            metadata: BTreeMap::new(),
            version: 1,
        };
        let roles = template.get(SectionKey::PersonasRoles).unwrap();
        let ux = template.get(SectionKey::UxFlows).unwrap();

        assert!(document.set_section(roles, " Admin: Jane ").is_none());
        document.set_section(ux, "Wizard onboarding");
        let previous = document.set_section(roles, "Admin: Jane, Viewer: Bob").unwrap();
        assert_eq!(previous.resolved, "Admin: Jane");

        let markdown = document.to_markdown();
        assert!(markdown.contains("Admin: Jane, Viewer: Bob"));
        assert!(markdown.contains("Wizard onboarding"));

        assert!(document.remove_section(SectionKey::UxFlows).is_some());
        assert!(document.remove_section(SectionKey::UxFlows).is_none());
        assert!(!document.to_markdown().contains("Wizard onboarding"));
    }

    #[test]
    fn test_answer_upsert_replaces() {
        let mut session = InteractiveSession::start(Utc::now());
        session
            .save_answer(answer(SectionKey::PersonasRoles, "Admin: Jane", false))
            .unwrap();
        session
            .save_answer(answer(SectionKey::PersonasRoles, "Admin: Jane, Viewer: Bob", false))
            .unwrap();

        assert_eq!(session.answers.len(), 1);
        assert_eq!(
            session.answer_for(SectionKey::PersonasRoles).unwrap().answer,
            "Admin: Jane, Viewer: Bob"
        );
    }

    #[test]
    fn test_counts_follow_answers() {
        let mut session = InteractiveSession::start(Utc::now());
        session.save_answer(answer(SectionKey::UxFlows, "wizard", false)).unwrap();
        session.save_answer(answer(SectionKey::RolloutPlan, "", true)).unwrap();
        assert_eq!((session.answered_count(), session.skipped_count()), (1, 1));

        session.save_answer(answer(SectionKey::RolloutPlan, "beta first", false)).unwrap();
        assert_eq!((session.answered_count(), session.skipped_count()), (2, 0));
        assert_eq!(session.known_answers().len(), 2);
    }

    #[test]
    fn test_completed_session_rejects_answers() {
        let mut session = InteractiveSession::start(Utc::now());
        session.finalize(Utc::now()).unwrap();
        let before = session.clone();

        let err = session
            .save_answer(answer(SectionKey::UxFlows, "late", false))
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidState(_)));
        assert_eq!(session, before);
        assert!(session.finalize(Utc::now()).is_err());
        assert!(session.record_regeneration(Utc::now()).is_err());
    }

    #[test]
    fn test_session_status_view() {
        assert_eq!(SessionStatus::of(None), SessionStatus::NotStarted);
        let session = InteractiveSession::start(Utc::now());
        assert_eq!(SessionStatus::of(Some(&session)), SessionStatus::InProgress);
    }

    #[test]
    fn test_flags_require_predecessor() {
        let mut flags = StageFlags::default();
        assert!(flags.mark(PipelineStage::GapsAnalyzed).is_err());
        assert_eq!(flags, StageFlags::default());

        flags.mark(PipelineStage::InputsProcessed).unwrap();
        flags.mark(PipelineStage::ContextGenerated).unwrap();
        flags.mark(PipelineStage::GapsAnalyzed).unwrap();
        assert_eq!(flags.stage(), PipelineStage::GapsAnalyzed);
        assert!(flags.is_consistent());

        // Marking again is a no-op, never a reset
        let before = flags;
        flags.mark(PipelineStage::GapsAnalyzed).unwrap();
        assert!(before.never_regresses_to(&flags));
    }

    #[test]
    fn test_inconsistent_flags_detected() {
        let flags = StageFlags {
            document_built: true,
            ..StageFlags::default()
        };
        assert!(!flags.is_consistent());
    }

    #[test]
    fn test_exclusivity_check() {
        let template = Template::enterprise_prd();
        let section = template.get(SectionKey::UxFlows).unwrap();
        let mut result = ExtractionResult::default();
        result.gaps.push(Gap::from_section(section));
        assert!(result.verify_exclusive().is_ok());

        result
            .extracted_info
            .insert(SectionKey::UxFlows, "wizard".to_string());
        assert!(matches!(
            result.verify_exclusive(),
            Err(PipelineError::MergeConflict(_))
        ));
    }

    #[test]
    fn test_question_cache_freshness() {
        let now = Utc::now();
        let cache = QuestionCache {
            questions: vec![],
            max_questions: 5,
            generated_at: now - Duration::hours(30),
            soft_cap_exceeded: false,
        };
        assert!(!cache.is_fresh(std::time::Duration::from_secs(24 * 3600), now));
        assert!(cache.is_fresh(std::time::Duration::from_secs(48 * 3600), now));
    }
}
