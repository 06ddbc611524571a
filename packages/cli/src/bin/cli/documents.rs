use std::collections::HashSet;
use std::path::Path;

use clap::Subcommand;
use colored::*;
use inquire::{Confirm, Select, Text};

use docforge_cli::answers::load_answers;
use docforge_cli::{render, AppContext};
use docforge_pipeline::ingest::read_dir_sources;
use docforge_pipeline::{SectionKey, SessionView};

#[derive(Subcommand)]
pub enum DocumentsCommands {
    /// List all documents
    List,
    /// Create an empty document
    Create {
        /// Document name
        name: String,
    },
    /// Show where a document stands in the pipeline
    Status {
        id: String,
    },
    /// Ingest the first batch of source files
    Ingest {
        id: String,
        /// Directory with PDF, audio and text sources
        dir: String,
    },
    /// Extract grounded facts and detect gaps
    Analyze {
        id: String,
    },
    /// Answer clarifying questions interactively
    Interview {
        id: String,
        #[arg(long)]
        max_questions: Option<usize>,
        /// Ask the model for a fresh set of questions
        #[arg(long)]
        regenerate: bool,
    },
    /// Show the session's questions and progress
    Session {
        id: String,
    },
    /// Ask the model for new questions covering what is still unanswered
    Regenerate {
        id: String,
        #[arg(long)]
        max_questions: Option<usize>,
    },
    /// Record a single answer
    Answer {
        id: String,
        /// Section key, see `docforge template`
        section: String,
        /// Answer text
        #[arg(default_value = "")]
        text: String,
        /// Record the question as skipped
        #[arg(long)]
        skip: bool,
    },
    /// Close the interview
    Finalize {
        id: String,
    },
    /// Assemble the document from extracted facts and answers
    Build {
        id: String,
    },
    /// Print an assembled document as markdown
    Show {
        id: String,
        /// Assembled version (defaults to the latest)
        #[arg(long)]
        version: Option<u32>,
    },
    /// Replace one section of an assembled version
    EditSection {
        id: String,
        version: u32,
        /// Section key, see `docforge template`
        section: String,
        /// New section text
        text: String,
    },
    /// Remove one section from an assembled version
    DeleteSection {
        id: String,
        version: u32,
        section: String,
    },
    /// Derive an engineering backlog from the latest build
    Backlog {
        id: String,
    },
    /// Add more sources and merge them into the existing extraction
    AddSources {
        id: String,
        dir: String,
        #[arg(short, long, default_value = "")]
        notes: String,
    },
    /// Diff two assembled versions
    Compare {
        id: String,
        from: u32,
        to: u32,
    },
    /// Show which gaps were resolved between two versions
    Gaps {
        id: String,
        from: u32,
        to: u32,
    },
    /// Delete a document and its assembled versions
    Delete {
        id: String,
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

pub async fn handle_documents_command(ctx: &AppContext, command: DocumentsCommands) -> anyhow::Result<()> {
    let documents = &ctx.documents;
    match command {
        DocumentsCommands::List => {
            let records = documents.list_documents().await?;
            if records.is_empty() {
                println!("{}", "No documents found".yellow());
                println!("{}", "Use 'docforge docs create' or 'docforge run' to start one".dimmed());
                return Ok(());
            }
            println!("{}", render::documents_table(&records));
        }
        DocumentsCommands::Create { name } => {
            let record = documents.create_document(&name).await?;
            println!("{} Created document {} ({})", "✓".green(), record.name.bold(), record.id);
        }
        DocumentsCommands::Status { id } => {
            let status = documents.status(&id).await?;
            println!("{} {}", "📄".blue(), status.name.bold());
            println!("  {} {}", "Stage:".dimmed(), status.stage.as_str());
            println!("  {} v{}", "Version:".dimmed(), status.current_version);
            println!("  {} {}", "Language:".dimmed(), status.language.name());
            println!("  {} {}", "Open gaps:".dimmed(), status.gaps);
            println!("  {} {:?}", "Session:".dimmed(), status.session);
            if let Some(fresh) = status.question_cache_fresh {
                let label = if fresh { "fresh".green() } else { "stale".yellow() };
                println!("  {} {}", "Questions:".dimmed(), label);
            }
            if let Some(workspace) = status.workspace_id {
                println!("  {} {}", "Workspace:".dimmed(), workspace);
            }
        }
        DocumentsCommands::Ingest { id, dir } => {
            let files = read_dir_sources(Path::new(&dir)).await?;
            let summary = documents.process_inputs(&id, &files).await?;
            println!(
                "{} Processed {} files ({} chars, {})",
                "✓".green(),
                summary.files_processed,
                summary.context_length,
                summary.language.name()
            );
        }
        DocumentsCommands::Analyze { id } => {
            let extraction = documents.analyze_gaps(&id).await?;
            println!(
                "{} {}: {} sections extracted, {} gaps",
                "✓".green(),
                extraction.product_name.bold(),
                extraction.extracted_info.len(),
                extraction.gaps.len()
            );
        }
        DocumentsCommands::Interview {
            id,
            max_questions,
            regenerate,
        } => {
            let view = documents.start_session(&id, max_questions, regenerate).await?;
            interview(ctx, &id, view).await?;
        }
        DocumentsCommands::Session { id } => {
            let view = documents.get_session(&id).await?;
            print_session(&view);
        }
        DocumentsCommands::Regenerate { id, max_questions } => {
            let view = documents.regenerate_questions(&id, max_questions).await?;
            print_session(&view);
        }
        DocumentsCommands::Answer { id, section, text, skip } => {
            let view = documents.save_answer(&id, &section, &text, skip).await?;
            println!(
                "{} {}/{} answered, {} skipped",
                "✓".green(),
                view.answered_count,
                view.total_questions,
                view.skipped_count
            );
        }
        DocumentsCommands::Finalize { id } => {
            let view = documents.finalize_session(&id).await?;
            println!("{} Session completed with {} answers", "✓".green(), view.answered_count);
        }
        DocumentsCommands::Build { id } => {
            let document = documents.build_document(&id).await?;
            report_build(&document);
        }
        DocumentsCommands::Show { id, version } => {
            let document = match version {
                Some(version) => documents.get_document(&id, version).await?,
                None => documents.latest_document(&id).await?,
            };
            print!("{}", document.to_markdown());
        }
        DocumentsCommands::EditSection { id, version, section, text } => {
            let document = documents.edit_section(&id, version, &section, &text).await?;
            println!("{} Section {} updated in v{}", "✓".green(), section, document.version);
        }
        DocumentsCommands::DeleteSection { id, version, section } => {
            let document = documents.delete_section(&id, version, &section).await?;
            println!(
                "{} Section {} removed from v{}, {} sections remain",
                "✓".green(),
                section,
                document.version,
                document.sections.len()
            );
        }
        DocumentsCommands::Backlog { id } => {
            let backlog = documents.generate_backlog(&id).await?;
            println!("{}", render::backlog_table(&backlog));
            println!("Total story points: {}", backlog.total_story_points());
        }
        DocumentsCommands::AddSources { id, dir, notes } => {
            let files = read_dir_sources(Path::new(&dir)).await?;
            let version = documents.add_sources(&id, &files, &notes).await?;
            println!(
                "{} Version {} created from {} files, {} gaps remain",
                "✓".green(),
                version.version,
                version.files_added.len(),
                version.gaps_detected
            );
        }
        DocumentsCommands::Compare { id, from, to } => {
            let diff = documents.compare_versions(&id, from, to).await?;
            print!("{}", render::diff_report(&diff));
        }
        DocumentsCommands::Gaps { id, from, to } => {
            let comparison = documents.compare_gaps(&id, from, to).await?;
            print!("{}", render::gap_report(&comparison));
        }
        DocumentsCommands::Delete { id, yes } => {
            if !yes {
                let confirmed = Confirm::new(&format!("Delete document {}?", id))
                    .with_default(false)
                    .prompt()?;
                if !confirmed {
                    println!("{}", "Cancelled".yellow());
                    return Ok(());
                }
            }
            if documents.delete_document(&id).await? {
                println!("{} Deleted document {}", "✓".green(), id);
            } else {
                println!("{}", format!("Document {} not found", id).yellow());
            }
        }
    }
    Ok(())
}

/// Create, ingest, analyze, interview and build in one go
pub async fn run_pipeline(
    ctx: &AppContext,
    inputs: &Path,
    name: &str,
    answers: Option<&Path>,
    max_questions: Option<usize>,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let documents = &ctx.documents;
    let files = read_dir_sources(inputs).await?;
    let record = documents.create_document(name).await?;
    eprintln!("{} Created document {}", "✓".green(), record.id);

    let summary = documents.process_inputs(&record.id, &files).await?;
    eprintln!("{} Processed {} files", "✓".green(), summary.files_processed);

    let extraction = documents.analyze_gaps(&record.id).await?;
    eprintln!("{} Found {} gaps", "✓".green(), extraction.gaps.len());

    let view = documents.start_session(&record.id, max_questions, false).await?;
    if view.soft_cap_exceeded {
        eprintln!(
            "{}",
            "More critical gaps than the question cap; all critical questions are included".yellow()
        );
    }

    match answers {
        Some(path) => {
            for planned in load_answers(path).await? {
                let skipped = planned.answer.is_none();
                documents
                    .save_answer(&record.id, &planned.section, planned.answer.as_deref().unwrap_or(""), skipped)
                    .await?;
            }
        }
        None => interview(ctx, &record.id, view).await?,
    }
    documents.finalize_session(&record.id).await?;

    let document = documents.build_document(&record.id).await?;
    report_build(&document);

    let markdown = document.to_markdown();
    match output {
        Some(path) => {
            tokio::fs::write(path, &markdown).await?;
            eprintln!("{} Wrote {}", "✓".green(), path.display());
        }
        None => print!("{}", markdown),
    }
    Ok(())
}

async fn interview(ctx: &AppContext, id: &str, view: SessionView) -> anyhow::Result<()> {
    let answered: HashSet<SectionKey> = view.answers.iter().map(|a| a.section_key).collect();
    let pending: Vec<_> = view
        .questions
        .iter()
        .filter(|gap| !answered.contains(&gap.section_key))
        .collect();

    if pending.is_empty() {
        eprintln!("{}", "No open questions".dimmed());
        return Ok(());
    }

    for (index, gap) in pending.iter().enumerate() {
        eprintln!(
            "\n{} {}",
            format!("[{}/{}]", index + 1, pending.len()).dimmed(),
            gap.section_title.bold()
        );
        if !gap.context.is_empty() {
            eprintln!("{}", gap.context.dimmed());
        }

        let answer = match gap.options.as_ref().filter(|o| !o.is_empty()) {
            Some(options) => Select::new(&gap.question, options.clone())
                .with_help_message("Esc to skip")
                .prompt_skippable()?,
            None => Text::new(&gap.question)
                .with_help_message("Leave empty to skip")
                .prompt_skippable()?,
        };

        match answer.filter(|text| !text.trim().is_empty()) {
            Some(text) => ctx.documents.save_answer(id, gap.section_key.as_str(), &text, false).await?,
            None => ctx.documents.save_answer(id, gap.section_key.as_str(), "", true).await?,
        };
    }
    Ok(())
}

fn print_session(view: &SessionView) {
    println!(
        "Session {:?}: {}/{} answered, {} skipped, regenerated {} time(s)",
        view.status, view.answered_count, view.total_questions, view.skipped_count, view.regeneration_count
    );
    if view.soft_cap_exceeded {
        println!("{}", "Critical gaps exceed the question cap".yellow());
    }
    if !view.questions.is_empty() {
        println!("{}", render::questions_table(&view.questions));
    }
}

fn report_build(document: &docforge_pipeline::Document) {
    eprintln!(
        "{} Built {} v{} with {} sections",
        "✓".green(),
        document.product_name.bold(),
        document.version,
        document.sections.len()
    );
    let missing = document.missing_critical();
    if !missing.is_empty() {
        let keys: Vec<&str> = missing.iter().map(|k| k.as_str()).collect();
        eprintln!("{} Missing critical sections: {}", "⚠".yellow(), keys.join(", "));
    }
    let degraded = document.degraded_sections();
    if !degraded.is_empty() {
        let keys: Vec<&str> = degraded.iter().map(|k| k.as_str()).collect();
        eprintln!("{} Kept raw text for: {}", "⚠".yellow(), keys.join(", "));
    }
}
