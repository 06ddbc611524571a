use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use colored::*;

use docforge_cli::{render, AppContext};
use docforge_config::PipelineConfig;
use docforge_pipeline::diff::{compute_diff, parse_markdown_sections};
use docforge_pipeline::Template;

mod cli;

use cli::documents::DocumentsCommands;
use cli::workspaces::WorkspacesCommands;

#[derive(Parser)]
#[command(name = "docforge")]
#[command(about = "Docforge - gap-driven requirements document assembly")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the sections of the document template
    Template,
    /// Run the whole pipeline over a directory of source files
    Run {
        /// Directory with PDF, audio and text sources
        #[arg(short, long)]
        inputs: PathBuf,
        /// Document name
        #[arg(short, long)]
        name: String,
        /// JSON file of section key to answer; prompts interactively when omitted
        #[arg(short, long)]
        answers: Option<PathBuf>,
        /// Question cap (defaults to DOCFORGE_MAX_QUESTIONS)
        #[arg(long)]
        max_questions: Option<usize>,
        /// Write the markdown here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Compare two markdown documents section by section
    Compare {
        old: PathBuf,
        new: PathBuf,
    },
    /// Manage documents
    #[command(subcommand)]
    Docs(DocumentsCommands),
    /// Manage workspaces
    #[command(subcommand)]
    Workspaces(WorkspacesCommands),
}

#[tokio::main]
async fn main() {
    docforge_cli::init();
    let cli = Cli::parse();

    if let Err(e) = handle_command(cli.command).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(1);
    }
}

async fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Template => {
            println!("{}", "📋 Document Template".blue().bold());
            println!("{}", render::template_table(&Template::enterprise_prd()));
            Ok(())
        }
        // Offline: no store or model needed
        Commands::Compare { old, new } => {
            let old = tokio::fs::read_to_string(&old).await?;
            let new = tokio::fs::read_to_string(&new).await?;
            let diff = compute_diff(&parse_markdown_sections(&old), &parse_markdown_sections(&new));
            print!("{}", render::diff_report(&diff));
            Ok(())
        }
        Commands::Run {
            inputs,
            name,
            answers,
            max_questions,
            output,
        } => {
            let ctx = open_context().await?;
            cli::documents::run_pipeline(&ctx, &inputs, &name, answers.as_deref(), max_questions, output.as_deref())
                .await
        }
        Commands::Docs(command) => {
            let ctx = open_context().await?;
            cli::documents::handle_documents_command(&ctx, command).await
        }
        Commands::Workspaces(command) => {
            let ctx = open_context().await?;
            cli::workspaces::handle_workspaces_command(&ctx, command).await
        }
    }
}

async fn open_context() -> anyhow::Result<AppContext> {
    let config = PipelineConfig::from_env()?;
    Ok(AppContext::open(config).await?)
}
