// src/lib.rs

//! VMaaS query engine
//!
//! Answers update and vulnerability questions about RPM package builds
//! against an in-memory, periodically refreshed dataset.
//!
//! # Architecture
//!
//! - Version semantics: NEVRA parsing and RPM EVR ordering (`~`, `^`)
//! - Snapshots: one immutable, fully indexed generation of the dataset
//! - Cache manager: atomic publication of new generations to readers
//! - Queries: pure functions over a snapshot, behind `QueryService`

pub mod cache;
pub mod dump;
mod error;
pub mod query;
pub mod version;

pub use error::{Error, Result};
