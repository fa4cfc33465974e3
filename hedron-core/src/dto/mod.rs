//! Data Transfer Objects
//!
//! Request bodies exchanged between the controller API and its clients.
//! Stored objects themselves travel as the domain types.

pub mod project;
