//! Reconcile entry points
//!
//! One entry point per watched kind. Each takes the key of the object that
//! changed, re-reads everything it needs from the store and converges it.
//! They are safe to call any number of times, in any order; the runtime only
//! guarantees that the same key is never reconciled twice at once.

pub mod job;
pub mod project;
pub mod revision;

use std::time::Duration;

use hedron_core::domain::meta::{Kind, ObjectKey};

use crate::context::Context;
use crate::error::ReconcileError;

pub use job::reconcile_job;
pub use project::reconcile_project;
pub use revision::reconcile_revision;

/// What the runtime should do with a key after a successful pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Action {
    pub requeue_after: Option<Duration>,
}

impl Action {
    /// Nothing left to do until the next change notification
    pub fn done() -> Self {
        Self::default()
    }

    pub fn requeue(after: Duration) -> Self {
        Self {
            requeue_after: Some(after),
        }
    }
}

/// Dispatches to the entry point for `kind`
pub async fn reconcile(ctx: &Context, kind: Kind, key: &ObjectKey) -> Result<Action, ReconcileError> {
    match kind {
        Kind::Project => reconcile_project(ctx, key).await,
        Kind::Revision => reconcile_revision(ctx, key).await,
        Kind::Job => reconcile_job(ctx, key).await,
    }
}
