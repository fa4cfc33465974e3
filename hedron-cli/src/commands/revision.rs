//! Revision command handlers

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use hedron_client::ControllerClient;
use hedron_core::domain::revision::{Revision, RevisionState};

use crate::config::Config;

/// Revision subcommands
#[derive(Subcommand)]
pub enum RevisionCommands {
    /// Get revision details
    Get {
        /// Revision name (`<project>-<hash>`)
        name: String,
    },
}

pub async fn handle_revision_command(command: RevisionCommands, config: &Config) -> Result<()> {
    let client = ControllerClient::new(&config.controller_url);

    match command {
        RevisionCommands::Get { name } => get_revision(&client, &config.namespace, &name).await,
    }
}

async fn get_revision(client: &ControllerClient, namespace: &str, name: &str) -> Result<()> {
    let revision = client.get_revision(namespace, name).await?;

    print_revision_details(&revision);

    Ok(())
}

pub(crate) fn state_colored(state: RevisionState) -> ColoredString {
    let text = state.to_string();
    match state {
        RevisionState::Pending => text.yellow(),
        RevisionState::Building => text.blue(),
        RevisionState::Ready => text.green(),
        RevisionState::Failed => text.red(),
    }
}

pub(crate) fn print_revision_summary(revision: &Revision) {
    println!(
        "  {} {} [{}]",
        "▸".cyan(),
        revision.metadata.name.bold(),
        state_colored(revision.status.state)
    );
    println!("    Hash:    {}", revision.spec.content_hash.as_str().dimmed());
    if let Some(created) = revision.metadata.creation_timestamp {
        println!(
            "    Created: {}",
            created.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
        );
    }
    if let Some(message) = &revision.status.message {
        println!("    Message: {}", message.dimmed());
    }
    println!();
}

fn print_revision_details(revision: &Revision) {
    let meta = &revision.metadata;

    println!("{}", "Revision Details:".bold());
    println!("  Name:        {}", meta.key().to_string().cyan());
    println!("  Project:     {}", revision.spec.project_ref);
    println!("  Hash:        {}", revision.spec.content_hash);
    println!("  Image:       {}", revision.spec.image.name);
    println!("  State:       {}", state_colored(revision.status.state));
    if let Some(job) = &revision.status.job_name {
        println!("  Job:         {}", job);
    }
    if let Some(created) = meta.creation_timestamp {
        println!("  Created:     {}", created.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(changed) = revision.status.last_transition_time {
        println!("  Transition:  {}", changed.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(message) = &revision.status.message {
        println!("  Message:     {}", message);
    }
}
