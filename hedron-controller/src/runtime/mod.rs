//! Controller runtime
//!
//! The caller of the reconcile entry points: work queue, backoff and the
//! event, resync and worker tasks that tie them together.

pub mod backoff;
pub mod controller;
pub mod queue;

pub use backoff::Backoff;
pub use controller::{Controller, ControllerSettings, Request};
pub use queue::WorkQueue;
