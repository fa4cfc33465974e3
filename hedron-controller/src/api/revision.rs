//! Revision API Handlers

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
};
use hedron_core::domain::meta::ObjectKey;
use hedron_core::domain::revision::Revision;

use crate::api::error::ApiResult;
use crate::store::{Api, ObjectStore};

/// GET /api/revisions/{namespace}/{name}
/// Get a revision
pub async fn get_revision(
    State(store): State<Arc<dyn ObjectStore>>,
    Path((namespace, name)): Path<(String, String)>,
) -> ApiResult<Json<Revision>> {
    tracing::debug!("Getting revision: {}/{}", namespace, name);

    let revision = Api::<Revision>::new(store)
        .get(&ObjectKey::new(namespace, name))
        .await?;

    Ok(Json(revision))
}
