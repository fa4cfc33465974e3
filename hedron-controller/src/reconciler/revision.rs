//! Revision entry point
//!
//! Makes sure a non-terminal Revision has its Job and folds the Job's
//! counters into the Revision's state.

use hedron_core::domain::job::Job;
use hedron_core::domain::meta::ObjectKey;
use hedron_core::domain::project::Project;
use hedron_core::domain::revision::Revision;

use super::Action;
use crate::context::Context;
use crate::error::{ErrorClass, ReconcileError};
use crate::service::{job_service, status_service};
use crate::store::Api;

#[tracing::instrument(name = "reconcile", skip_all, fields(kind = "Revision", key = %key))]
pub async fn reconcile_revision(ctx: &Context, key: &ObjectKey) -> Result<Action, ReconcileError> {
    let revisions: Api<Revision> = ctx.api();

    let Some(revision) = revisions.get_opt(key).await? else {
        tracing::debug!("Revision no longer exists, nothing to do");
        return Ok(Action::done());
    };

    if revision.status.state.is_terminal() {
        tracing::debug!("Revision is {}, nothing to do", revision.status.state);
        return Ok(Action::done());
    }

    let project_key = ObjectKey::new(&key.namespace, &revision.spec.project_ref);
    let Some(project) = ctx.api::<Project>().get_opt(&project_key).await? else {
        tracing::debug!("Project {} is gone, revision awaits collection", project_key);
        return Ok(Action::done());
    };

    if let Some(owner) = revision.metadata.controller()
        && Some(owner.uid) != project.metadata.uid
    {
        tracing::debug!(
            "Revision belongs to an earlier incarnation of {}, awaiting collection",
            project_key
        );
        return Ok(Action::done());
    }

    let job = match ensure_job(ctx, &revision).await {
        Ok(job) => job,
        Err(err) => {
            if err.class() != ErrorClass::Conflict {
                status_service::record_revision_message(&revisions, revision, err.to_string())
                    .await;
            }
            return Err(err);
        }
    };

    status_service::fold_job_status(&revisions, ctx.clock.as_ref(), revision, Some(&job)).await?;

    Ok(Action::done())
}

async fn ensure_job(ctx: &Context, revision: &Revision) -> Result<Job, ReconcileError> {
    let template = job_service::job_template(revision)?;
    job_service::ensure_job(&ctx.api(), revision, template).await
}
