//! Project command handlers
//!
//! Create, edit, inspect and delete Projects, and list the Revisions the
//! controller built for them.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::*;
use hedron_client::ControllerClient;
use hedron_core::domain::project::{Image, Project, ProjectSpec, Repository};
use hedron_core::domain::revision::Revision;
use hedron_core::dto::project::{CreateProject, UpdateProject};

use super::revision::print_revision_summary;
use crate::config::Config;

/// Project subcommands
#[derive(Subcommand)]
pub enum ProjectCommands {
    /// Create a new project
    Create {
        /// Project name (lowercase DNS label)
        name: String,

        #[command(flatten)]
        spec: SpecArgs,
    },
    /// Change a project's image or repository
    Update {
        /// Project name
        name: String,

        #[command(flatten)]
        spec: SpecArgs,
    },
    /// List projects
    List {
        /// List projects in every namespace
        #[arg(short = 'A', long)]
        all_namespaces: bool,
    },
    /// Get project details
    Get {
        /// Project name
        name: String,
    },
    /// Delete a project and everything built for it
    Delete {
        /// Project name
        name: String,
    },
    /// List the revisions built for a project
    Revisions {
        /// Project name
        name: String,
    },
}

/// Spec fields settable from the command line
///
/// On update, only the flags that are given replace the current values.
#[derive(Args, Debug, Default)]
pub struct SpecArgs {
    /// Container image the build runs in
    #[arg(long)]
    image: Option<String>,

    /// Repository URL
    #[arg(long)]
    url: Option<String>,

    /// Branch, tag or full reference (defaults to the remote HEAD)
    #[arg(long = "ref")]
    reference: Option<String>,

    /// Container entrypoint (repeatable)
    #[arg(long)]
    entrypoint: Vec<String>,

    /// Build command, everything after `--`
    #[arg(last = true)]
    cmd: Vec<String>,
}

impl SpecArgs {
    /// Build a fresh spec; image and URL are mandatory
    fn into_spec(self) -> Result<ProjectSpec> {
        let image = self.image.context("--image is required")?;
        let url = self.url.context("--url is required")?;

        Ok(ProjectSpec {
            image: Image {
                name: image,
                entrypoint: self.entrypoint,
                cmd: self.cmd,
            },
            repository: Repository {
                url,
                reference: self.reference.unwrap_or_default(),
            },
        })
    }

    /// Overlay the given flags onto an existing spec
    fn apply_to(self, mut spec: ProjectSpec) -> ProjectSpec {
        if let Some(image) = self.image {
            spec.image.name = image;
        }
        if let Some(url) = self.url {
            spec.repository.url = url;
        }
        if let Some(reference) = self.reference {
            spec.repository.reference = reference;
        }
        if !self.entrypoint.is_empty() {
            spec.image.entrypoint = self.entrypoint;
        }
        if !self.cmd.is_empty() {
            spec.image.cmd = self.cmd;
        }
        spec
    }
}

pub async fn handle_project_command(command: ProjectCommands, config: &Config) -> Result<()> {
    let client = ControllerClient::new(&config.controller_url);
    let namespace = config.namespace.as_str();

    match command {
        ProjectCommands::Create { name, spec } => create_project(&client, namespace, name, spec).await,
        ProjectCommands::Update { name, spec } => update_project(&client, namespace, &name, spec).await,
        ProjectCommands::List { all_namespaces } => {
            let filter = (!all_namespaces).then_some(namespace);
            list_projects(&client, filter).await
        }
        ProjectCommands::Get { name } => get_project(&client, namespace, &name).await,
        ProjectCommands::Delete { name } => delete_project(&client, namespace, &name).await,
        ProjectCommands::Revisions { name } => list_revisions(&client, namespace, &name).await,
    }
}

async fn create_project(client: &ControllerClient, namespace: &str, name: String, args: SpecArgs) -> Result<()> {
    let req = CreateProject {
        name,
        namespace: Some(namespace.to_string()),
        spec: args.into_spec()?,
    };

    let project = client.create_project(req).await?;

    println!("{}", "✓ Project created successfully!".green().bold());
    println!("  Name:       {}", project.metadata.key().to_string().cyan());
    println!("  Image:      {}", project.spec.image.name.bold());
    println!("  Repository: {}", describe_repository(&project).dimmed());

    Ok(())
}

async fn update_project(client: &ControllerClient, namespace: &str, name: &str, args: SpecArgs) -> Result<()> {
    let current = client.get_project(namespace, name).await?;
    let spec = args.apply_to(current.spec.clone());

    if spec == current.spec {
        println!("{}", "Nothing to change.".yellow());
        return Ok(());
    }

    let project = client
        .update_project(namespace, name, UpdateProject { spec })
        .await?;

    println!("{}", "✓ Project updated successfully!".green().bold());
    println!("  Name:       {}", project.metadata.key().to_string().cyan());
    println!("  Generation: {}", project.metadata.generation);

    Ok(())
}

async fn list_projects(client: &ControllerClient, namespace: Option<&str>) -> Result<()> {
    let projects = client.list_projects(namespace).await?;

    if projects.is_empty() {
        println!("{}", "No projects found.".yellow());
    } else {
        println!("{}", format!("Found {} project(s):", projects.len()).bold());
        println!();
        for project in projects {
            print_project_summary(&project);
        }
    }

    Ok(())
}

async fn get_project(client: &ControllerClient, namespace: &str, name: &str) -> Result<()> {
    let project = client.get_project(namespace, name).await?;

    print_project_details(&project);

    Ok(())
}

async fn delete_project(client: &ControllerClient, namespace: &str, name: &str) -> Result<()> {
    client.delete_project(namespace, name).await?;

    println!(
        "{}",
        format!("✓ Project {}/{} deleted successfully!", namespace, name)
            .green()
            .bold()
    );

    Ok(())
}

async fn list_revisions(client: &ControllerClient, namespace: &str, name: &str) -> Result<()> {
    let mut revisions: Vec<Revision> = client.list_project_revisions(namespace, name).await?;

    if revisions.is_empty() {
        println!("{}", format!("No revisions for {}/{} yet.", namespace, name).yellow());
        return Ok(());
    }

    // Newest first
    revisions.sort_by(|a, b| {
        b.metadata
            .creation_timestamp
            .cmp(&a.metadata.creation_timestamp)
    });

    println!("{}", format!("Found {} revision(s):", revisions.len()).bold());
    println!();
    for revision in &revisions {
        print_revision_summary(revision);
    }

    Ok(())
}

fn describe_repository(project: &Project) -> String {
    let repository = &project.spec.repository;
    if repository.reference.is_empty() {
        format!("{} @ HEAD", repository.url)
    } else {
        format!("{} @ {}", repository.url, repository.reference)
    }
}

fn print_project_summary(project: &Project) {
    println!("  {} {}", "▸".cyan(), project.metadata.key().to_string().bold());
    println!("    Repository: {}", describe_repository(project).dimmed());
    match &project.status.last_revision {
        Some(revision) => println!("    Latest:     {}", revision.dimmed()),
        None => println!("    Latest:     {}", "none".dimmed()),
    }
    if let Some(message) = &project.status.message {
        println!("    Message:    {}", message.red());
    }
    println!();
}

fn print_project_details(project: &Project) {
    let meta = &project.metadata;

    println!("{}", "Project Details:".bold());
    println!("  Name:        {}", meta.key().to_string().cyan());
    if let Some(uid) = meta.uid {
        println!("  UID:         {}", uid);
    }
    if let Some(created) = meta.creation_timestamp {
        println!("  Created:     {}", created.format("%Y-%m-%d %H:%M:%S"));
    }
    println!(
        "  Generation:  {} (observed {})",
        meta.generation, project.status.observed_generation
    );

    println!("\n{}", "Spec:".bold());
    println!("  Image:       {}", project.spec.image.name);
    if !project.spec.image.entrypoint.is_empty() {
        println!("  Entrypoint:  {}", project.spec.image.entrypoint.join(" "));
    }
    if !project.spec.image.cmd.is_empty() {
        println!("  Command:     {}", project.spec.image.cmd.join(" "));
    }
    println!("  Repository:  {}", describe_repository(project));

    println!("\n{}", "Status:".bold());
    match (&project.status.last_revision, &project.status.last_content_hash) {
        (Some(revision), Some(hash)) => println!("  Latest:      {} ({})", revision.cyan(), hash.dimmed()),
        (Some(revision), None) => println!("  Latest:      {}", revision.cyan()),
        _ => println!("  Latest:      {}", "none".dimmed()),
    }
    if let Some(message) = &project.status.message {
        println!("  Message:     {}", message.red());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(image: Option<&str>, url: Option<&str>) -> SpecArgs {
        SpecArgs {
            image: image.map(str::to_string),
            url: url.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_into_spec_requires_image_and_url() {
        assert!(args(None, Some("https://example.com/demo.git")).into_spec().is_err());
        assert!(args(Some("alpine:3"), None).into_spec().is_err());

        let spec = args(Some("alpine:3"), Some("https://example.com/demo.git"))
            .into_spec()
            .unwrap();
        assert_eq!(spec.image.name, "alpine:3");
        assert!(spec.repository.reference.is_empty());
    }

    #[test]
    fn test_apply_to_only_overrides_given_flags() {
        let current = args(Some("alpine:3"), Some("https://example.com/demo.git"))
            .into_spec()
            .unwrap();

        let update = SpecArgs {
            reference: Some("develop".to_string()),
            cmd: vec!["make".to_string(), "test".to_string()],
            ..Default::default()
        };
        let spec = update.apply_to(current.clone());

        assert_eq!(spec.image.name, current.image.name);
        assert_eq!(spec.repository.url, current.repository.url);
        assert_eq!(spec.repository.reference, "develop");
        assert_eq!(spec.image.cmd, vec!["make", "test"]);
    }
}
