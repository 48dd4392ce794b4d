// src/cache/manager.rs

//! Publication of snapshots to concurrent readers
//!
//! The current generation lives in an `ArcSwapOption`. Readers take a
//! reference-counted handle and keep it for the duration of their query;
//! a publish swaps the pointer and never waits for them. An old snapshot
//! is dropped once its last reader lets go.

use super::snapshot::Snapshot;
use crate::error::{Error, Result};
use arc_swap::ArcSwapOption;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use tracing::{info, warn};

/// Readiness of the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// No snapshot has been published yet
    NotReady,
    /// Serving the given generation
    Ready { generation: u64 },
}

/// Holds the currently published snapshot
#[derive(Debug, Default)]
pub struct CacheManager {
    current: ArcSwapOption<Snapshot>,
    generation: AtomicU64,
    /// Serializes writers; readers never take it
    publish_lock: Mutex<()>,
}

impl CacheManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> CacheState {
        match &*self.current.load() {
            Some(snapshot) => CacheState::Ready {
                generation: snapshot.generation(),
            },
            None => CacheState::NotReady,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.current.load().is_some()
    }

    /// The latest fully built snapshot
    pub fn get_current(&self) -> Result<Arc<Snapshot>> {
        self.current.load_full().ok_or(Error::CacheNotReady)
    }

    /// Make `snapshot` the current generation and return its number
    pub fn publish(&self, mut snapshot: Snapshot) -> u64 {
        let _guard = self
            .publish_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        snapshot.generation = generation;
        let stats = snapshot.stats();

        let previous = self.current.swap(Some(Arc::new(snapshot)));
        match previous {
            Some(previous) => info!(
                "Published snapshot generation {} ({} packages, {} CVEs), replacing generation {}",
                generation,
                stats.packages,
                stats.cves,
                previous.generation()
            ),
            None => info!(
                "Published first snapshot generation {} ({} packages, {} CVEs), cache is ready",
                generation, stats.packages, stats.cves
            ),
        }

        generation
    }

    /// Build a snapshot and publish it.
    ///
    /// A failed build leaves the current snapshot in place.
    pub fn refresh<F>(&self, build: F) -> Result<u64>
    where
        F: FnOnce() -> Result<Snapshot>,
    {
        match build() {
            Ok(snapshot) => Ok(self.publish(snapshot)),
            Err(e) => {
                match self.state() {
                    CacheState::Ready { generation } => warn!(
                        "Snapshot refresh failed, still serving generation {}: {}",
                        generation, e
                    ),
                    CacheState::NotReady => {
                        warn!("Snapshot refresh failed, cache is not ready: {}", e)
                    }
                }
                Err(e)
            }
        }
    }

    /// Run [`refresh`](Self::refresh) on a dedicated background thread
    pub fn spawn_refresh<F>(self: &Arc<Self>, build: F) -> Result<JoinHandle<Result<u64>>>
    where
        F: FnOnce() -> Result<Snapshot> + Send + 'static,
    {
        let manager = Arc::clone(self);
        let handle = thread::Builder::new()
            .name("snapshot-refresh".to_string())
            .spawn(move || manager.refresh(build))?;
        Ok(handle)
    }
}
