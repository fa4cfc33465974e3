//! Project entry point
//!
//! Resolves the Project's repository reference and makes sure a Revision
//! exists for the content hash it points at. Nothing is created unless the
//! hash was resolved.

use hedron_core::domain::meta::ObjectKey;
use hedron_core::domain::project::Project;
use hedron_core::domain::revision::Revision;

use super::Action;
use crate::context::Context;
use crate::error::{ErrorClass, ReconcileError};
use crate::service::{revision_service, status_service};
use crate::store::Api;

#[tracing::instrument(name = "reconcile", skip_all, fields(kind = "Project", key = %key))]
pub async fn reconcile_project(ctx: &Context, key: &ObjectKey) -> Result<Action, ReconcileError> {
    let projects: Api<Project> = ctx.api();

    let Some(project) = projects.get_opt(key).await? else {
        tracing::debug!("Project no longer exists, nothing to do");
        return Ok(Action::done());
    };

    let revision = match converge(ctx, &project).await {
        Ok(revision) => revision,
        Err(err) => {
            if err.class() != ErrorClass::Conflict {
                status_service::record_project_message(&projects, project, err.to_string()).await;
            }
            return Err(err);
        }
    };

    status_service::record_project_revision(&projects, project, &revision).await?;

    Ok(Action::requeue(ctx.poll_interval))
}

async fn converge(ctx: &Context, project: &Project) -> Result<Revision, ReconcileError> {
    let repository = &project.spec.repository;
    let hash = ctx
        .resolver
        .resolve(&repository.url, &repository.reference)
        .await?;

    tracing::debug!(
        "Resolved {} @ {:?} to {}",
        repository.url,
        repository.reference,
        hash
    );

    revision_service::ensure_revision(&ctx.api(), project, &hash).await
}
