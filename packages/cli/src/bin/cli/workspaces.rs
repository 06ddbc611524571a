use std::path::Path;

use clap::Subcommand;
use colored::*;
use inquire::Confirm;

use docforge_cli::{render, AppContext};
use docforge_pipeline::ingest::read_dir_sources;

#[derive(Subcommand)]
pub enum WorkspacesCommands {
    /// List all workspaces
    List,
    /// Create a workspace
    Create {
        name: String,
        #[arg(short, long, default_value = "")]
        description: String,
    },
    /// Show a workspace and its latest analysis
    Show {
        id: String,
    },
    /// Attach shared context files
    AddContext {
        id: String,
        dir: String,
    },
    /// Create a document inside the workspace
    CreateDoc {
        id: String,
        name: String,
    },
    /// Move an existing document into the workspace
    AddChild {
        id: String,
        document_id: String,
    },
    /// Analyze the workspace and propagate the result to its documents
    Analyze {
        id: String,
    },
    /// Delete a workspace and every document in it
    Delete {
        id: String,
        #[arg(short, long)]
        yes: bool,
    },
}

pub async fn handle_workspaces_command(ctx: &AppContext, command: WorkspacesCommands) -> anyhow::Result<()> {
    let workspaces = &ctx.workspaces;
    match command {
        WorkspacesCommands::List => {
            let all = workspaces.list_workspaces().await?;
            if all.is_empty() {
                println!("{}", "No workspaces found".yellow());
                return Ok(());
            }
            println!("{}", render::workspaces_table(&all));
        }
        WorkspacesCommands::Create { name, description } => {
            let workspace = workspaces.create_workspace(&name, &description).await?;
            println!("{} Created workspace {} ({})", "✓".green(), workspace.name.bold(), workspace.id);
        }
        WorkspacesCommands::Show { id } => {
            let workspace = workspaces.get_workspace(&id).await?;
            println!("{} {}", "🗂".blue(), workspace.name.bold());
            if !workspace.description.is_empty() {
                println!("{}", workspace.description.dimmed());
            }
            println!("  Documents: {}", workspace.children.join(", "));
            match &workspace.analysis {
                Some(analysis) => {
                    println!("  Analysis v{}", workspace.analysis_version);
                    println!("\n{}", analysis.executive_summary);
                    for feature in &analysis.identified_features {
                        println!("  • {}", feature.name);
                    }
                }
                None => println!("  {}", "Not analyzed yet".dimmed()),
            }
        }
        WorkspacesCommands::AddContext { id, dir } => {
            let files = read_dir_sources(Path::new(&dir)).await?;
            let workspace = workspaces.add_context_files(&id, &files).await?;
            println!(
                "{} {} context files attached",
                "✓".green(),
                workspace.context_documents.len()
            );
        }
        WorkspacesCommands::CreateDoc { id, name } => {
            let record = workspaces.create_child_document(&id, &name).await?;
            println!("{} Created document {} ({})", "✓".green(), record.name.bold(), record.id);
        }
        WorkspacesCommands::AddChild { id, document_id } => {
            let workspace = workspaces.add_child(&id, &document_id).await?;
            println!("{} {} now holds {} documents", "✓".green(), workspace.name, workspace.children.len());
        }
        WorkspacesCommands::Analyze { id } => {
            let analysis = workspaces.analyze_workspace(&id).await?;
            println!(
                "{} {} features, {} modules, {} technical risks",
                "✓".green(),
                analysis.identified_features.len(),
                analysis.suggested_modules.len(),
                analysis.technical_risks.len()
            );
        }
        WorkspacesCommands::Delete { id, yes } => {
            if !yes {
                let confirmed = Confirm::new(&format!("Delete workspace {} and all of its documents?", id))
                    .with_default(false)
                    .prompt()?;
                if !confirmed {
                    println!("{}", "Cancelled".yellow());
                    return Ok(());
                }
            }
            if workspaces.delete_workspace(&id).await? {
                println!("{} Deleted workspace {}", "✓".green(), id);
            } else {
                println!("{}", format!("Workspace {} not found", id).yellow());
            }
        }
    }
    Ok(())
}
