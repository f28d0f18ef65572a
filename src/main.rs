use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;

use workflow_hub::{
    config, init_telemetry, AddWorkflowRequest, ErrorBody, HubConfig, RemoveWorkflowRequest,
    WorkflowError, WorkflowService,
};

#[derive(Parser)]
#[command(name = "workflow-hub")]
#[command(about = "Track GitHub Actions workflows and report their latest run status")]
#[command(long_about = "Workflow Hub keeps a shared list of GitHub Actions workflows and \
                       aggregates the latest run of each one, authenticating as a GitHub App. \
                       All output is JSON on stdout; logs go to stderr.")]
struct Cli {
    /// Configuration file to use instead of ./workflow-hub.toml
    #[arg(long, global = true, help = "Path to a TOML configuration file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report the latest run of every tracked workflow
    Status,
    /// Show the tracked workflows without contacting GitHub
    List,
    /// Start tracking a workflow
    Add {
        #[arg(long, help = "Repository in owner/repo form")]
        repo: String,
        #[arg(long, help = "Workflow file name, e.g. ci.yml")]
        workflow: String,
        #[arg(long, help = "Display label for the workflow")]
        label: String,
    },
    /// Stop tracking a workflow
    Remove {
        #[arg(long, help = "Repository in owner/repo form")]
        repo: String,
        #[arg(long, help = "Workflow file name, e.g. ci.yml")]
        workflow: String,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let hub_config = match &cli.config {
        Some(path) => {
            HubConfig::load_env_file()?;
            HubConfig::load_from(Some(path))?
        }
        None => config()?.clone(),
    };
    init_telemetry(&hub_config.observability)?;

    let service = WorkflowService::from_config(&hub_config)?;
    match cli.command {
        Commands::Status => render(service.statuses().await),
        Commands::List => render(service.list().await),
        Commands::Add {
            repo,
            workflow,
            label,
        } => render(
            service
                .add(AddWorkflowRequest {
                    repo,
                    workflow,
                    label,
                })
                .await,
        ),
        Commands::Remove { repo, workflow } => {
            render(service.remove(RemoveWorkflowRequest { repo, workflow }).await)
        }
    }
}

/// Print the result or the structured error as JSON
fn render<T: Serialize>(result: Result<T, WorkflowError>) -> Result<ExitCode> {
    match result {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            tracing::error!(
                kind = ?err.kind(),
                status = err.status_code(),
                error = %err,
                "Request failed"
            );
            println!("{}", serde_json::to_string_pretty(&ErrorBody::from(&err))?);
            Ok(ExitCode::FAILURE)
        }
    }
}
