//! Project API Handlers
//!
//! HTTP endpoints for project management. These are the only writes users
//! make; everything below a Project is derived by the controller.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use hedron_core::domain::meta::ObjectKey;
use hedron_core::domain::naming;
use hedron_core::domain::project::{Project, ProjectSpec};
use hedron_core::domain::revision::Revision;
use hedron_core::dto::project::{CreateProject, UpdateProject};
use serde::Deserialize;

use crate::api::error::{ApiError, ApiResult};
use crate::store::{Api, ObjectStore};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub namespace: Option<String>,
}

fn validate_spec(spec: &ProjectSpec) -> ApiResult<()> {
    if spec.image.name.trim().is_empty() {
        return Err(ApiError::BadRequest("spec.image.name is required".to_string()));
    }
    if spec.repository.url.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "spec.repository.url is required".to_string(),
        ));
    }
    Ok(())
}

/// POST /api/projects
/// Create a new project
pub async fn create_project(
    State(store): State<Arc<dyn ObjectStore>>,
    Json(req): Json<CreateProject>,
) -> ApiResult<(StatusCode, Json<Project>)> {
    tracing::info!("Creating project: {}/{}", req.namespace(), req.name);

    naming::validate_name(&req.name).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    naming::validate_name(req.namespace()).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    validate_spec(&req.spec)?;

    let namespace = req.namespace().to_string();
    let project = Project::new(namespace, req.name, req.spec);
    let created = Api::<Project>::new(store).create(&project).await?;

    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /api/projects
/// List projects, optionally in one namespace
pub async fn list_projects(
    State(store): State<Arc<dyn ObjectStore>>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Project>>> {
    tracing::debug!("Listing projects");

    let projects = Api::<Project>::new(store)
        .list(query.namespace.as_deref())
        .await?;

    Ok(Json(projects))
}

/// GET /api/projects/{namespace}/{name}
/// Get a project
pub async fn get_project(
    State(store): State<Arc<dyn ObjectStore>>,
    Path((namespace, name)): Path<(String, String)>,
) -> ApiResult<Json<Project>> {
    tracing::debug!("Getting project: {}/{}", namespace, name);

    let project = Api::<Project>::new(store)
        .get(&ObjectKey::new(namespace, name))
        .await?;

    Ok(Json(project))
}

/// PUT /api/projects/{namespace}/{name}
/// Replace a project's spec
pub async fn update_project(
    State(store): State<Arc<dyn ObjectStore>>,
    Path((namespace, name)): Path<(String, String)>,
    Json(req): Json<UpdateProject>,
) -> ApiResult<Json<Project>> {
    tracing::info!("Updating project: {}/{}", namespace, name);

    validate_spec(&req.spec)?;

    let projects = Api::<Project>::new(store);
    let mut project = projects.get(&ObjectKey::new(namespace, name)).await?;
    project.spec = req.spec;
    let updated = projects.replace(&project).await?;

    Ok(Json(updated))
}

/// DELETE /api/projects/{namespace}/{name}
/// Delete a project and everything derived from it
pub async fn delete_project(
    State(store): State<Arc<dyn ObjectStore>>,
    Path((namespace, name)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    tracing::info!("Deleting project: {}/{}", namespace, name);

    Api::<Project>::new(store)
        .delete(&ObjectKey::new(namespace, name))
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/projects/{namespace}/{name}/revisions
/// List the revisions a project owns
pub async fn list_project_revisions(
    State(store): State<Arc<dyn ObjectStore>>,
    Path((namespace, name)): Path<(String, String)>,
) -> ApiResult<Json<Vec<Revision>>> {
    tracing::debug!("Listing revisions of project: {}/{}", namespace, name);

    let project = Api::<Project>::new(Arc::clone(&store))
        .get(&ObjectKey::new(&namespace, name))
        .await?;
    let uid = project
        .metadata
        .uid
        .ok_or_else(|| ApiError::InternalError("stored project has no uid".to_string()))?;

    let revisions = Api::<Revision>::new(store)
        .list_owned(&namespace, uid)
        .await?;

    Ok(Json(revisions))
}
