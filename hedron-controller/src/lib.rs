//! hedron controller
//!
//! Drives Projects toward their desired state: every resolved source hash
//! gets exactly one Revision, every Revision exactly one Job, and Job
//! outcomes are folded back into the Revision's state.

pub mod api;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod reconciler;
pub mod runtime;
pub mod service;
pub mod source;
pub mod store;
