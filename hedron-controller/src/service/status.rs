//! Status Service
//!
//! Status writes for Projects and Revisions. Writes are skipped when nothing
//! would change and retried once against a fresh copy on a version conflict.

use chrono::{DateTime, Utc};
use hedron_core::domain::job::Job;
use hedron_core::domain::meta::Resource;
use hedron_core::domain::project::{Project, ProjectStatus};
use hedron_core::domain::revision::{Revision, RevisionState, RevisionStatus};

use crate::context::Clock;
use crate::error::ReconcileError;
use crate::store::Api;

/// Writes the status `apply` derives from the current object, if any
///
/// `apply` returns `None` when the object is already as it should be. On a
/// conflict the object is re-read and `apply` consulted again; a second
/// conflict is returned to the caller.
pub async fn update_status<K, F>(api: &Api<K>, current: K, apply: F) -> Result<K, ReconcileError>
where
    K: Resource,
    F: Fn(&K) -> Option<K>,
{
    let Some(next) = apply(&current) else {
        return Ok(current);
    };

    match api.replace_status(&next).await {
        Ok(written) => Ok(written),
        Err(err) if err.is_conflict() => {
            tracing::debug!("Status conflict on {} {}, retrying", K::KIND, current.key());
            let fresh = api.get(&current.key()).await?;
            match apply(&fresh) {
                Some(next) => Ok(api.replace_status(&next).await?),
                None => Ok(fresh),
            }
        }
        Err(err) => Err(err.into()),
    }
}

/// Computes the status a Revision should have after observing its Job
///
/// Returns `None` when the Revision is terminal or nothing changed.
pub fn next_revision_status(
    revision: &Revision,
    job: Option<&Job>,
    now: DateTime<Utc>,
) -> Option<RevisionStatus> {
    let current = &revision.status;
    if current.state.is_terminal() {
        return None;
    }

    let mut next = current.clone();

    if let Some(job) = job
        && next.job_name.as_deref() != Some(job.metadata.name.as_str())
    {
        next.job_name = Some(job.metadata.name.clone());
        next.message = None;
    }

    let state = current.state.fold(job.map(|job| &job.status));
    if state != current.state {
        next.state = state;
        next.last_transition_time = Some(now);
        next.message = job.and_then(|job| transition_message(state, &job.metadata.name));
    }

    (next != *current).then_some(next)
}

fn transition_message(state: RevisionState, job_name: &str) -> Option<String> {
    match state {
        RevisionState::Pending => None,
        RevisionState::Building => Some(format!("job {} is running", job_name)),
        RevisionState::Ready => Some(format!("job {} succeeded", job_name)),
        RevisionState::Failed => Some(format!("job {} failed", job_name)),
    }
}

/// Folds the observed Job into the Revision's status and persists it
pub async fn fold_job_status(
    revisions: &Api<Revision>,
    clock: &dyn Clock,
    revision: Revision,
    job: Option<&Job>,
) -> Result<Revision, ReconcileError> {
    let now = clock.now();
    let before = revision.status.state;

    let updated = update_status(revisions, revision, |current| {
        next_revision_status(current, job, now).map(|status| Revision {
            status,
            ..current.clone()
        })
    })
    .await?;

    if updated.status.state != before {
        tracing::info!(
            "Revision {} transitioned {} -> {}",
            updated.key(),
            before,
            updated.status.state
        );
    }

    Ok(updated)
}

/// Records why a Revision cannot make progress
///
/// Best effort: a failed write is logged and otherwise ignored, since the
/// caller is already returning the underlying error.
pub async fn record_revision_message(revisions: &Api<Revision>, revision: Revision, message: String) {
    let key = revision.key();
    let result = update_status(revisions, revision, |current| {
        if current.status.state.is_terminal()
            || current.status.message.as_deref() == Some(message.as_str())
        {
            return None;
        }
        let mut next = current.clone();
        next.status.message = Some(message.clone());
        Some(next)
    })
    .await;

    if let Err(err) = result {
        tracing::warn!("Failed to record status message on revision {}: {}", key, err);
    }
}

/// Records the Revision a Project's current source resolved to
pub async fn record_project_revision(
    projects: &Api<Project>,
    project: Project,
    revision: &Revision,
) -> Result<Project, ReconcileError> {
    let observed = project.metadata.generation;
    let desired = ProjectStatus {
        last_revision: Some(revision.metadata.name.clone()),
        last_content_hash: Some(revision.spec.content_hash.to_string()),
        message: None,
        observed_generation: observed,
    };

    update_status(projects, project, |current| {
        project_status_change(current, observed, &desired)
    })
    .await
}

/// Records why a Project's source could not be resolved
///
/// Best effort, like [`record_revision_message`]. The last successfully
/// resolved Revision is kept.
pub async fn record_project_message(projects: &Api<Project>, project: Project, message: String) {
    let key = project.key();
    let observed = project.metadata.generation;
    let desired = ProjectStatus {
        message: Some(message),
        observed_generation: observed,
        ..project.status.clone()
    };

    let result = update_status(projects, project, |current| {
        let desired = ProjectStatus {
            last_revision: current.status.last_revision.clone(),
            last_content_hash: current.status.last_content_hash.clone(),
            ..desired.clone()
        };
        project_status_change(current, observed, &desired)
    })
    .await;

    if let Err(err) = result {
        tracing::warn!("Failed to record status message on project {}: {}", key, err);
    }
}

fn project_status_change(current: &Project, observed: u64, desired: &ProjectStatus) -> Option<Project> {
    // A newer spec has landed since this pass read the Project; the next pass
    // owns the status now
    if current.metadata.generation != observed || current.status == *desired {
        return None;
    }

    let mut next = current.clone();
    next.status = desired.clone();
    Some(next)
}
