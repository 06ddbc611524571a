// ABOUTME: Interactive question/answer session operations on a document
// ABOUTME: Cached questions are reused unless regeneration is forced, so re-entering a session is free

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::manager::DocumentManager;
use crate::records::DocumentRecord;
use crate::types::{AnswerRecord, Gap, InteractiveSession, PipelineStage, SessionState, SessionStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionView {
    pub document_id: String,
    pub status: SessionStatus,
    pub questions: Vec<Gap>,
    pub answers: Vec<AnswerRecord>,
    pub total_questions: usize,
    pub answered_count: usize,
    pub skipped_count: usize,
    pub regeneration_count: u32,
    pub soft_cap_exceeded: bool,
    /// Questions came from the cache without a model call
    pub from_cache: bool,
}

impl SessionView {
    fn of(record: &DocumentRecord, from_cache: bool) -> Self {
        let questions = record
            .question_cache
            .as_ref()
            .map(|c| c.questions.clone())
            .unwrap_or_default();
        let session = record.session.as_ref();
        Self {
            document_id: record.id.clone(),
            status: SessionStatus::of(session),
            total_questions: questions.len(),
            questions,
            answers: session.map(|s| s.answers.clone()).unwrap_or_default(),
            answered_count: session.map(|s| s.answered_count()).unwrap_or(0),
            skipped_count: session.map(|s| s.skipped_count()).unwrap_or(0),
            regeneration_count: session.map(|s| s.regeneration_count).unwrap_or(0),
            soft_cap_exceeded: record
                .question_cache
                .as_ref()
                .map(|c| c.soft_cap_exceeded)
                .unwrap_or(false),
            from_cache,
        }
    }
}

fn open_session(record: &mut DocumentRecord) -> Result<&mut InteractiveSession> {
    match record.session.as_mut() {
        Some(session) => Ok(session),
        None => Err(PipelineError::InvalidState(format!(
            "no session has been started for document {}",
            record.id
        ))),
    }
}

impl DocumentManager {
    /// Start or resume the session. Served from the question cache unless
    /// `force_regenerate` is set or no questions are cached yet.
    pub async fn start_session(
        &self,
        id: &str,
        max_questions: Option<usize>,
        force_regenerate: bool,
    ) -> Result<SessionView> {
        let _guard = self.locks.lock_document(id).await;
        let mut record = self.records.load_document(id).await?;
        record.flags.require(PipelineStage::GapsAnalyzed)?;

        if let Some(session) = &record.session {
            if session.status == SessionState::Completed {
                if force_regenerate {
                    return Err(PipelineError::InvalidState(
                        "cannot regenerate questions for a completed session".to_string(),
                    ));
                }
                return Ok(SessionView::of(&record, true));
            }
        }

        let from_cache = record.question_cache.is_some() && !force_regenerate;
        let now = Utc::now();
        if !from_cache {
            self.refresh_questions(&mut record, max_questions).await?;
            if let (true, Some(session)) = (force_regenerate, record.session.as_mut()) {
                session.record_regeneration(now)?;
            }
        }
        if record.session.is_none() {
            record.session = Some(InteractiveSession::start(now));
        }
        record.updated_at = now;
        self.records.save_document(&record).await?;

        info!(
            "Document {}: session started ({} question(s){})",
            id,
            record.question_cache.as_ref().map(|c| c.questions.len()).unwrap_or(0),
            if from_cache { ", cached" } else { "" }
        );
        Ok(SessionView::of(&record, from_cache))
    }

    /// Record an answer; a second answer for the same section replaces the first
    pub async fn save_answer(
        &self,
        id: &str,
        section_key: &str,
        answer: &str,
        skipped: bool,
    ) -> Result<SessionView> {
        let key = self.template.parse_key(section_key)?;
        let _guard = self.locks.lock_document(id).await;
        let mut record = self.records.load_document(id).await?;

        let (question, title) = match record
            .question_cache
            .as_ref()
            .and_then(|c| c.questions.iter().find(|g| g.section_key == key))
        {
            Some(gap) => (gap.question.clone(), gap.section_title.clone()),
            None => {
                let section = self
                    .template
                    .get(key)
                    .ok_or_else(|| PipelineError::UnknownSection(section_key.to_string()))?;
                (section.fallback_question(), section.title.to_string())
            }
        };

        let now = Utc::now();
        open_session(&mut record)?.save_answer(AnswerRecord {
            section_key: key,
            section_title: title,
            question,
            answer: if skipped { String::new() } else { answer.trim().to_string() },
            skipped,
            answered_at: now,
        })?;
        record.updated_at = now;
        self.records.save_document(&record).await?;
        Ok(SessionView::of(&record, true))
    }

    pub async fn finalize_session(&self, id: &str) -> Result<SessionView> {
        let _guard = self.locks.lock_document(id).await;
        let mut record = self.records.load_document(id).await?;
        let now = Utc::now();
        open_session(&mut record)?.finalize(now)?;
        record.updated_at = now;
        self.records.save_document(&record).await?;

        info!("Document {}: session completed", id);
        Ok(SessionView::of(&record, true))
    }

    /// New questions for what is still unanswered. Always calls the model.
    pub async fn regenerate_questions(&self, id: &str, max_questions: Option<usize>) -> Result<SessionView> {
        let _guard = self.locks.lock_document(id).await;
        let mut record = self.records.load_document(id).await?;
        let now = Utc::now();
        // Validates the session is open before spending a model call
        let mut session = open_session(&mut record)?.clone();
        session.record_regeneration(now)?;

        self.refresh_questions(&mut record, max_questions).await?;
        record.session = Some(session);
        record.updated_at = now;
        self.records.save_document(&record).await?;
        Ok(SessionView::of(&record, false))
    }

    pub async fn session_status(&self, id: &str) -> Result<SessionStatus> {
        let record = self.records.load_document(id).await?;
        Ok(SessionStatus::of(record.session.as_ref()))
    }

    pub async fn get_session(&self, id: &str) -> Result<SessionView> {
        let record = self.records.load_document(id).await?;
        Ok(SessionView::of(&record, true))
    }
}
