// src/cache/mod.rs

//! In-memory dataset cache
//!
//! This module handles everything between raw records and queries:
//! - Raw dataset records (`models`)
//! - Immutable indexed snapshots (`snapshot`)
//! - Building snapshots from records (`builder`)
//! - Publishing snapshots to concurrent readers (`manager`)

pub mod builder;
pub mod manager;
pub mod models;
pub mod snapshot;

pub use builder::SnapshotBuilder;
pub use manager::{CacheManager, CacheState};
pub use models::{DbChange, ModuleStream, RawDataset};
pub use snapshot::{PackageId, RepositoryId, Snapshot, SnapshotStats};
