// ABOUTME: Version history bookkeeping and gap comparison between versions
// ABOUTME: Each round of new sources appends a VersionRecord with the gaps it left open

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{PipelineError, Result};
use crate::template::SectionKey;
use crate::types::{ExtractionResult, VersionRecord};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapComparison {
    pub from_version: u32,
    pub to_version: u32,
    pub gaps_before: usize,
    pub gaps_after: usize,
    /// Gaps present only in the later version
    pub new_gaps: Vec<SectionKey>,
    /// Gaps the later version filled
    pub resolved_gaps: Vec<SectionKey>,
    pub common_gaps: Vec<SectionKey>,
}

impl VersionRecord {
    pub fn new(
        version: u32,
        created_at: DateTime<Utc>,
        files_added: Vec<String>,
        notes: impl Into<String>,
        extraction: Option<&ExtractionResult>,
    ) -> Self {
        let gap_keys: Vec<SectionKey> = extraction
            .map(|e| e.gap_keys().into_iter().collect())
            .unwrap_or_default();
        Self {
            version,
            created_at,
            files_added,
            notes: notes.into(),
            gaps_detected: gap_keys.len(),
            gap_keys,
            questions_generated: 0,
        }
    }
}

pub fn find_version<'a>(
    history: &'a [VersionRecord],
    document_id: &str,
    version: u32,
) -> Result<&'a VersionRecord> {
    history
        .iter()
        .find(|r| r.version == version)
        .ok_or_else(|| PipelineError::VersionNotFound {
            document_id: document_id.to_string(),
            version,
        })
}

pub fn compare_gaps(from: &VersionRecord, to: &VersionRecord) -> GapComparison {
    let before: BTreeSet<SectionKey> = from.gap_keys.iter().copied().collect();
    let after: BTreeSet<SectionKey> = to.gap_keys.iter().copied().collect();

    GapComparison {
        from_version: from.version,
        to_version: to.version,
        gaps_before: before.len(),
        gaps_after: after.len(),
        new_gaps: after.difference(&before).copied().collect(),
        resolved_gaps: before.difference(&after).copied().collect(),
        common_gaps: before.intersection(&after).copied().collect(),
    }
}
