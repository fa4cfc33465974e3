//! Service Module
//!
//! Idempotent building blocks the reconcilers are assembled from. Every
//! operation here reads current state first and only writes what is missing
//! or different, so running it twice has the same effect as running it once.

pub mod job;
pub mod revision;
pub mod status;

// Re-export for convenience
pub use job as job_service;
pub use revision as revision_service;
pub use status as status_service;

use hedron_core::domain::meta::{OwnerReference, Resource};

use crate::error::ReconcileError;
use crate::store::{Api, StoreError};

/// Outcome of a get-or-create
#[derive(Debug)]
pub struct Ensured<K> {
    pub object: K,
    /// True when this call created the object
    pub created: bool,
}

/// Returns the object named by `desired` if it exists, creating it otherwise
///
/// An existing object is never modified: derived objects are immutable once
/// created. A same-named object controlled by a different owner uid is a
/// leftover of a deleted parent that has not been collected yet.
pub async fn ensure_owned<K: Resource>(
    api: &Api<K>,
    desired: K,
    owner: &OwnerReference,
) -> Result<Ensured<K>, ReconcileError> {
    let key = desired.key();

    if let Some(existing) = api.get_opt(&key).await? {
        return check_owner(existing, owner).map(|object| Ensured {
            object,
            created: false,
        });
    }

    match api.create(&desired).await {
        Ok(object) => Ok(Ensured {
            object,
            created: true,
        }),
        // Someone else created it between our read and our write
        Err(StoreError::AlreadyExists { .. }) => {
            let existing = api.get(&key).await?;
            check_owner(existing, owner).map(|object| Ensured {
                object,
                created: false,
            })
        }
        Err(err) => Err(err.into()),
    }
}

fn check_owner<K: Resource>(object: K, owner: &OwnerReference) -> Result<K, ReconcileError> {
    if object.metadata().is_controlled_by(owner.uid) {
        Ok(object)
    } else {
        Err(ReconcileError::StaleOwner {
            kind: K::KIND,
            key: object.key(),
        })
    }
}
