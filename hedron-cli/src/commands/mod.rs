//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod job;
mod project;
mod revision;

pub use job::JobCommands;
pub use project::ProjectCommands;
pub use revision::RevisionCommands;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Project management
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },
    /// Revision inspection
    Revision {
        #[command(subcommand)]
        command: RevisionCommands,
    },
    /// Job inspection and status reports
    Job {
        #[command(subcommand)]
        command: JobCommands,
    },
}

/// Route a command to its handler module
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Project { command } => project::handle_project_command(command, config).await,
        Commands::Revision { command } => revision::handle_revision_command(command, config).await,
        Commands::Job { command } => job::handle_job_command(command, config).await,
    }
}
