//! Reconcile error taxonomy
//!
//! Every error that can reach the controller runtime is classified by its
//! variant into an [`ErrorClass`]; the class alone decides whether the
//! request is dropped, retried with backoff, or surfaced as permanent.

use std::time::Duration;

use hedron_core::domain::meta::{Kind, MetaError, ObjectKey};
use thiserror::Error;

use crate::source::ResolveError;
use crate::store::StoreError;

/// How the runtime reacts to a failed reconcile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The object is absent. Ends the pass cleanly.
    NotFound,
    /// Network, lock or availability trouble. Retried with backoff.
    Transient,
    /// Malformed spec or unreconcilable reference. Reported, not retried.
    Permanent,
    /// Optimistic-concurrency mismatch. Retried after re-reading.
    Conflict,
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Meta(#[from] MetaError),

    #[error("{kind} {key} has an invalid spec: {reason}")]
    InvalidSpec {
        kind: Kind,
        key: ObjectKey,
        reason: String,
    },

    #[error("{kind} {key} is controlled by a previous owner that has not been garbage collected yet")]
    StaleOwner { kind: Kind, key: ObjectKey },

    #[error("reconcile did not finish within {0:?}")]
    Timeout(Duration),
}

impl ReconcileError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ReconcileError::Store(err) => err.class(),
            ReconcileError::Resolve(err) => err.class(),
            // A parent without a uid has not been persisted yet; it will be.
            ReconcileError::Meta(MetaError::NotPersisted { .. }) => ErrorClass::Transient,
            ReconcileError::Meta(_) => ErrorClass::Permanent,
            ReconcileError::InvalidSpec { .. } => ErrorClass::Permanent,
            ReconcileError::StaleOwner { .. } => ErrorClass::Transient,
            ReconcileError::Timeout(_) => ErrorClass::Transient,
        }
    }
}
