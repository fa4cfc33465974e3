//! Job entry point
//!
//! A Job change only matters to the Revision that owns it, so this re-derives
//! the owner's key and runs the Revision entry point.

use hedron_core::domain::job::Job;
use hedron_core::domain::meta::{Kind, ObjectKey};

use super::{Action, reconcile_revision};
use crate::context::Context;
use crate::error::ReconcileError;

#[tracing::instrument(name = "reconcile", skip_all, fields(kind = "Job", key = %key))]
pub async fn reconcile_job(ctx: &Context, key: &ObjectKey) -> Result<Action, ReconcileError> {
    let Some(job) = ctx.api::<Job>().get_opt(key).await? else {
        tracing::debug!("Job no longer exists, nothing to do");
        return Ok(Action::done());
    };

    let Some(owner) = owning_revision(&job) else {
        tracing::debug!("Job has no controlling revision, ignoring");
        return Ok(Action::done());
    };

    reconcile_revision(ctx, &owner).await
}

/// Key of the Revision controlling `job`, if any
pub fn owning_revision(job: &Job) -> Option<ObjectKey> {
    job.metadata
        .controller()
        .filter(|owner| owner.kind == Kind::Revision)
        .map(|owner| ObjectKey::new(&job.metadata.namespace, &owner.name))
}
