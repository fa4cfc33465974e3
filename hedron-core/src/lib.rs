//! Hedron Core
//!
//! Core types and abstractions for the Hedron build controller.
//!
//! This crate contains:
//! - Domain types: the stored objects (Project, Revision, Job), their metadata
//!   and the deterministic naming and state rules that tie them together
//! - DTOs: request bodies exchanged between the controller API and its clients

pub mod domain;
pub mod dto;
