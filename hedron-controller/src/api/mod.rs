//! API Module
//!
//! HTTP API layer for the controller.
//! Each submodule handles endpoints for a specific kind.

pub mod error;
pub mod health;
pub mod job;
pub mod project;
pub mod revision;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, put},
};
use tower_http::trace::TraceLayer;

use crate::store::ObjectStore;

/// Create the main API router with all endpoints
pub fn create_router(store: Arc<dyn ObjectStore>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Project endpoints
        .route(
            "/api/projects",
            get(project::list_projects).post(project::create_project),
        )
        .route(
            "/api/projects/{namespace}/{name}",
            get(project::get_project)
                .put(project::update_project)
                .delete(project::delete_project),
        )
        .route(
            "/api/projects/{namespace}/{name}/revisions",
            get(project::list_project_revisions),
        )
        // Revision endpoints
        .route(
            "/api/revisions/{namespace}/{name}",
            get(revision::get_revision),
        )
        // Job endpoints
        .route("/api/jobs/{namespace}/{name}", get(job::get_job))
        .route(
            "/api/jobs/{namespace}/{name}/status",
            put(job::report_job_status),
        )
        // Add state and middleware
        .with_state(store)
        .layer(TraceLayer::new_for_http())
}
