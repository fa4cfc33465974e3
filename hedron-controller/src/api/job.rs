//! Job API Handlers
//!
//! Read access to Jobs, plus the endpoint the execution backend reports
//! completion counters through.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
};
use hedron_core::domain::job::{Job, JobStatus};
use hedron_core::domain::meta::ObjectKey;

use crate::api::error::ApiResult;
use crate::store::{Api, ObjectStore};

/// GET /api/jobs/{namespace}/{name}
/// Get a job
pub async fn get_job(
    State(store): State<Arc<dyn ObjectStore>>,
    Path((namespace, name)): Path<(String, String)>,
) -> ApiResult<Json<Job>> {
    tracing::debug!("Getting job: {}/{}", namespace, name);

    let job = Api::<Job>::new(store)
        .get(&ObjectKey::new(namespace, name))
        .await?;

    Ok(Json(job))
}

/// PUT /api/jobs/{namespace}/{name}/status
/// Report a job's counters
pub async fn report_job_status(
    State(store): State<Arc<dyn ObjectStore>>,
    Path((namespace, name)): Path<(String, String)>,
    Json(status): Json<JobStatus>,
) -> ApiResult<Json<Job>> {
    tracing::info!(
        "Job {}/{} reported: active={} succeeded={} failed={}",
        namespace,
        name,
        status.active,
        status.succeeded,
        status.failed
    );

    let jobs = Api::<Job>::new(store);
    let mut job = jobs.get(&ObjectKey::new(namespace, name)).await?;
    job.status = status;
    let updated = jobs.replace_status(&job).await?;

    Ok(Json(updated))
}
