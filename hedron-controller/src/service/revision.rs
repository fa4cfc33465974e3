//! Revision Service
//!
//! Materializes the Revision for a resolved content hash.

use hedron_core::domain::meta::{LABEL_PROJECT, ObjectMeta, OwnerReference, Resource};
use hedron_core::domain::naming::{self, ContentHash};
use hedron_core::domain::project::Project;
use hedron_core::domain::revision::{Revision, RevisionSpec, RevisionStatus};

use super::ensure_owned;
use crate::error::ReconcileError;
use crate::store::Api;

/// Builds the Revision a Project should have for `hash`
///
/// The Project's image and repository are copied into the Revision, so the
/// build it describes stays fixed whatever happens to the Project later.
pub fn desired_revision(project: &Project, hash: &ContentHash) -> Result<Revision, ReconcileError> {
    let owner = OwnerReference::controlled_by(project)?;
    let name = naming::revision_name(&project.metadata.name, hash)?;

    let mut metadata = ObjectMeta::new(&project.metadata.namespace, name)
        .with_label(LABEL_PROJECT, &project.metadata.name);
    metadata.owner_references.push(owner);

    Ok(Revision {
        metadata,
        spec: RevisionSpec {
            project_ref: project.metadata.name.clone(),
            content_hash: hash.clone(),
            image: project.spec.image.clone(),
            repository: project.spec.repository.clone(),
        },
        status: RevisionStatus::default(),
    })
}

/// Gets or creates the Revision for `hash`, owned by `project`
///
/// An existing Revision is returned as is, whatever its state.
pub async fn ensure_revision(
    revisions: &Api<Revision>,
    project: &Project,
    hash: &ContentHash,
) -> Result<Revision, ReconcileError> {
    let owner = OwnerReference::controlled_by(project)?;
    let desired = desired_revision(project, hash)?;

    let ensured = ensure_owned(revisions, desired, &owner).await?;
    if ensured.created {
        tracing::info!(
            "Revision created: {} for project: {}",
            ensured.object.key(),
            project.metadata.name
        );
    }

    Ok(ensured.object)
}
