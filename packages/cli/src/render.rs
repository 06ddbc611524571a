// ABOUTME: Terminal rendering for pipeline results
// ABOUTME: Tables for templates, documents, workspaces and backlogs plus plain-text diff reports

use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, ContentArrangement, Table};
use docforge_core::truncate;
use docforge_pipeline::backlog::Backlog;
use docforge_pipeline::diff::LineChangeKind;
use docforge_pipeline::records::DocumentRecord;
use docforge_pipeline::versioning::GapComparison;
use docforge_pipeline::{Diff, Gap, Template, Workspace};

const QUESTION_CHARS: usize = 100;

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(header);
    table
}

pub fn template_table(template: &Template) -> Table {
    let mut table = new_table(vec!["#", "Key", "Title", "Priority"]);
    for (index, section) in template.sections().iter().enumerate() {
        table.add_row(vec![
            (index + 1).to_string(),
            section.key.to_string(),
            section.title.to_string(),
            section.priority.as_str().to_string(),
        ]);
    }
    table
}

pub fn documents_table(records: &[DocumentRecord]) -> Table {
    let mut table = new_table(vec!["ID", "Name", "Stage", "Version", "Language", "Workspace", "Updated"]);
    for record in records {
        table.add_row(vec![
            record.id.clone(),
            record.name.clone(),
            record.flags.stage().as_str().to_string(),
            format!("v{}", record.current_version),
            record.language.to_string(),
            record.workspace_id.clone().unwrap_or_else(|| "-".to_string()),
            record.updated_at.format("%Y-%m-%d %H:%M").to_string(),
        ]);
    }
    table
}

pub fn workspaces_table(workspaces: &[Workspace]) -> Table {
    let mut table = new_table(vec!["ID", "Name", "Documents", "Context Files", "Analysis"]);
    for workspace in workspaces {
        let analysis = if workspace.analysis.is_some() {
            format!("v{}", workspace.analysis_version)
        } else {
            "none".to_string()
        };
        table.add_row(vec![
            workspace.id.clone(),
            workspace.name.clone(),
            workspace.children.len().to_string(),
            workspace.context_documents.len().to_string(),
            analysis,
        ]);
    }
    table
}

pub fn questions_table(questions: &[Gap]) -> Table {
    let mut table = new_table(vec!["Section", "Priority", "Question"]);
    for gap in questions {
        table.add_row(vec![
            gap.section_key.to_string(),
            gap.priority.as_str().to_string(),
            truncate(&gap.question, QUESTION_CHARS).to_string(),
        ]);
    }
    table
}

pub fn backlog_table(backlog: &Backlog) -> Table {
    let mut table = new_table(vec!["Type", "Priority", "Points", "Summary"]);
    for item in &backlog.items {
        table.add_row(vec![
            format!("{:?}", item.issue_type),
            format!("{:?}", item.priority),
            item.story_points.to_string(),
            item.summary.clone(),
        ]);
    }
    table
}

/// Unified-style text report of a document comparison
pub fn diff_report(diff: &Diff) -> String {
    let mut out = format!(
        "{} added, {} removed, {} modified, {} unchanged\n\n{}\n",
        diff.sections_added, diff.sections_removed, diff.sections_modified, diff.sections_unchanged, diff.summary
    );

    for section in &diff.added {
        out.push_str(&format!("\n+ {} ({})\n", section.title, section.section));
        if !section.preview.is_empty() {
            out.push_str(&format!("  {}\n", section.preview));
        }
    }
    for section in &diff.removed {
        out.push_str(&format!("\n- {} ({})\n", section.title, section.section));
    }
    for section in &diff.modified {
        out.push_str(&format!(
            "\n~ {} ({}) similarity {:.0}%\n",
            section.title,
            section.section,
            section.similarity * 100.0
        ));
        for change in &section.changes {
            let marker = match change.kind {
                LineChangeKind::Added => '+',
                LineChangeKind::Removed => '-',
                LineChangeKind::Context => ' ',
            };
            out.push_str(&format!("  {}{}\n", marker, change.content));
        }
    }
    out
}

pub fn gap_report(comparison: &GapComparison) -> String {
    let join = |keys: &[docforge_pipeline::SectionKey]| {
        if keys.is_empty() {
            "none".to_string()
        } else {
            keys.iter().map(|k| k.to_string()).collect::<Vec<_>>().join(", ")
        }
    };
    format!(
        "v{} -> v{}: {} gaps -> {} gaps\n  resolved: {}\n  new: {}\n  still open: {}\n",
        comparison.from_version,
        comparison.to_version,
        comparison.gaps_before,
        comparison.gaps_after,
        join(&comparison.resolved_gaps),
        join(&comparison.new_gaps),
        join(&comparison.common_gaps),
    )
}
