//! Job Service
//!
//! Derives the Job a Revision needs and materializes it.

use hedron_core::domain::job::{
    ContainerSpec, EnvVar, Job, JobSpec, JobStatus, JobTemplate, RestartPolicy,
};
use hedron_core::domain::meta::{LABEL_PROJECT, LABEL_REVISION, ObjectMeta, OwnerReference, Resource};
use hedron_core::domain::naming;
use hedron_core::domain::revision::Revision;

use super::ensure_owned;
use crate::error::ReconcileError;
use crate::store::Api;

/// Name of the single container every build Job runs
pub const RUNNER_CONTAINER: &str = "hedron-runner";

/// Builds the execution template for `revision` from the image it captured
///
/// The entrypoint becomes the container command and `cmd` its arguments.
/// Repository coordinates are handed to the build through the environment.
pub fn job_template(revision: &Revision) -> Result<JobTemplate, ReconcileError> {
    let image = &revision.spec.image;
    if image.name.trim().is_empty() {
        return Err(ReconcileError::InvalidSpec {
            kind: Revision::KIND,
            key: revision.key(),
            reason: "spec.image.name is empty".to_string(),
        });
    }

    let repository = &revision.spec.repository;
    let env = vec![
        EnvVar {
            name: "HEDRON_REPOSITORY_URL".to_string(),
            value: repository.url.clone(),
        },
        EnvVar {
            name: "HEDRON_REPOSITORY_REF".to_string(),
            value: repository.reference.clone(),
        },
        EnvVar {
            name: "HEDRON_CONTENT_HASH".to_string(),
            value: revision.spec.content_hash.to_string(),
        },
    ];

    Ok(JobTemplate {
        container: ContainerSpec {
            name: RUNNER_CONTAINER.to_string(),
            image: image.name.clone(),
            command: image.entrypoint.clone(),
            args: image.cmd.clone(),
            env,
        },
        restart_policy: RestartPolicy::Never,
    })
}

/// Builds the Job a Revision should have
pub fn desired_job(revision: &Revision, template: JobTemplate) -> Result<Job, ReconcileError> {
    let owner = OwnerReference::controlled_by(revision)?;

    let mut metadata = ObjectMeta::new(
        &revision.metadata.namespace,
        naming::job_name(&revision.metadata.name),
    )
    .with_label(LABEL_PROJECT, &revision.spec.project_ref)
    .with_label(LABEL_REVISION, &revision.metadata.name);
    metadata.owner_references.push(owner);

    Ok(Job {
        metadata,
        spec: JobSpec {
            project_ref: revision.spec.project_ref.clone(),
            revision_ref: revision.metadata.name.clone(),
            content_hash: revision.spec.content_hash.to_string(),
            template,
        },
        status: JobStatus::default(),
    })
}

/// Gets or creates the Job for `revision`
///
/// An existing Job is never updated, even if the template would now differ.
pub async fn ensure_job(
    jobs: &Api<Job>,
    revision: &Revision,
    template: JobTemplate,
) -> Result<Job, ReconcileError> {
    let owner = OwnerReference::controlled_by(revision)?;
    let desired = desired_job(revision, template)?;

    let ensured = ensure_owned(jobs, desired, &owner).await?;
    if ensured.created {
        tracing::info!(
            "Job created: {} for revision: {}",
            ensured.object.key(),
            revision.metadata.name
        );
    }

    Ok(ensured.object)
}
