//! Job command handlers
//!
//! Inspect Jobs and report their counters on behalf of an execution backend.

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use hedron_client::ControllerClient;
use hedron_core::domain::job::{Job, JobStatus};

use crate::config::Config;

/// Job subcommands
#[derive(Subcommand)]
pub enum JobCommands {
    /// Get job details
    Get {
        /// Job name (same as its revision)
        name: String,
    },
    /// Report a job's counters
    Report {
        /// Job name
        name: String,

        /// Number of running pods
        #[arg(long, default_value = "0")]
        active: u32,

        /// Number of successful completions
        #[arg(long, default_value = "0")]
        succeeded: u32,

        /// Number of failed attempts
        #[arg(long, default_value = "0")]
        failed: u32,
    },
}

pub async fn handle_job_command(command: JobCommands, config: &Config) -> Result<()> {
    let client = ControllerClient::new(&config.controller_url);
    let namespace = config.namespace.as_str();

    match command {
        JobCommands::Get { name } => get_job(&client, namespace, &name).await,
        JobCommands::Report {
            name,
            active,
            succeeded,
            failed,
        } => {
            let status = JobStatus {
                active,
                succeeded,
                failed,
                ..Default::default()
            };
            report_job(&client, namespace, &name, status).await
        }
    }
}

async fn get_job(client: &ControllerClient, namespace: &str, name: &str) -> Result<()> {
    let job = client.get_job(namespace, name).await?;

    print_job_details(&job);

    Ok(())
}

async fn report_job(client: &ControllerClient, namespace: &str, name: &str, status: JobStatus) -> Result<()> {
    let job = client.report_job_status(namespace, name, &status).await?;

    println!("{}", "✓ Job status reported!".green().bold());
    println!("  Job:      {}", job.metadata.key().to_string().cyan());
    println!("  Counters: {}", counters(&job.status));

    Ok(())
}

fn counters(status: &JobStatus) -> String {
    format!(
        "active={} succeeded={} failed={}",
        status.active, status.succeeded, status.failed
    )
}

fn print_job_details(job: &Job) {
    let container = &job.spec.template.container;

    println!("{}", "Job Details:".bold());
    println!("  Name:      {}", job.metadata.key().to_string().cyan());
    println!("  Project:   {}", job.spec.project_ref);
    println!("  Revision:  {}", job.spec.revision_ref);
    println!("  Hash:      {}", job.spec.content_hash.dimmed());
    println!("  Image:     {}", container.image);
    if !container.command.is_empty() {
        println!("  Command:   {}", container.command.join(" "));
    }
    if !container.args.is_empty() {
        println!("  Args:      {}", container.args.join(" "));
    }
    println!("  Counters:  {}", counters(&job.status));
    if let Some(started) = job.status.start_time {
        println!("  Started:   {}", started.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(finished) = job.status.completion_time {
        println!("  Finished:  {}", finished.format("%Y-%m-%d %H:%M:%S"));
    }
}
