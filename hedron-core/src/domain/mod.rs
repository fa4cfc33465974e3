//! Core domain types
//!
//! These types are the objects held by the object store. They are shared
//! between the controller (which reconciles them) and the client/CLI (which
//! creates and inspects them).

pub mod job;
pub mod meta;
pub mod naming;
pub mod project;
pub mod revision;
