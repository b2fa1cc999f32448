use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "repo-migrator")]
#[command(version, about = "Resumable repository migration orchestrator")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Reuse empty destinations without asking
    #[arg(long, global = true)]
    pub yes: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Path to migrator.toml. Defaults to .migrator/migrator.toml in the project directory
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Migrate every configured repository that has not finished yet
    Run {
        /// Migrate only these repositories (comma-separated)
        #[arg(long)]
        only: Option<String>,
    },
    /// Show persisted migration progress
    Status {
        /// Show the step history of a single repository
        name: Option<String>,
    },
    /// List configured repositories and their resolved sources
    List,
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a starter migrator.toml file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Run { only } => {
            let only = cmd::parse_only(only.as_deref());
            cmd::cmd_run(&cli, project_dir, &only).await?;
        }
        Commands::Status { name } => cmd::cmd_status(&cli, project_dir, name.as_deref())?,
        Commands::List => cmd::cmd_list(&cli, project_dir)?,
        Commands::Config { command } => cmd::cmd_config(&cli, project_dir, command.clone())?,
    }

    Ok(())
}
