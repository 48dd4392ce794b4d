// src/query/mod.rs

//! Query engine
//!
//! Every operation is a pure function of a [`Snapshot`] and its request.
//! [`QueryService`] is the boundary the transport layer talks to: it takes
//! the current snapshot once per request and turns faults inside a query
//! into [`Error::Internal`].

pub mod packages;
pub mod patterns;
pub mod updates;
pub mod vulnerabilities;

pub use packages::{
    PackageRepositoriesResponse, PackageTreeRequest, PackageTreeResponse, PackagesRequest,
    PackagesResponse, package_info, package_repositories, package_tree,
};
pub use patterns::{EntityKind, PatternMatches, PatternResponse, pattern_lookup};
pub use updates::{UpdatesRequest, UpdatesResponse, updates};
pub use vulnerabilities::{VulnerabilitiesRequest, VulnerabilitiesResponse, vulnerabilities};

use crate::cache::{CacheManager, DbChange, Snapshot, SnapshotStats};
use crate::error::{Error, Result};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error};

/// Change timestamps recorded in the snapshot
pub fn db_change(snapshot: &Snapshot) -> DbChange {
    snapshot.changes().clone()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs queries against whatever snapshot is current
#[derive(Debug, Clone)]
pub struct QueryService {
    cache: Arc<CacheManager>,
}

impl QueryService {
    pub fn new(cache: Arc<CacheManager>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    fn run<T, F>(&self, operation: &str, query: F) -> Result<T>
    where
        F: FnOnce(&Snapshot) -> Result<T>,
    {
        let snapshot = self.cache.get_current()?;

        match panic::catch_unwind(AssertUnwindSafe(|| query(&snapshot))) {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => {
                if e.is_client_error() {
                    debug!("Rejected {} query: {}", operation, e);
                } else {
                    error!("{} query failed: {}", operation, e);
                }
                Err(e)
            }
            Err(payload) => {
                let message = panic_message(&*payload);
                error!(
                    "{} query panicked on snapshot generation {}: {}",
                    operation,
                    snapshot.generation(),
                    message
                );
                Err(Error::Internal(message))
            }
        }
    }

    pub fn updates(&self, request: &UpdatesRequest) -> Result<UpdatesResponse> {
        self.run("updates", |snapshot| updates(snapshot, request))
    }

    pub fn vulnerabilities(
        &self,
        request: &VulnerabilitiesRequest,
    ) -> Result<VulnerabilitiesResponse> {
        self.run("vulnerabilities", |snapshot| vulnerabilities(snapshot, request))
    }

    pub fn pattern_lookup(&self, kind: EntityKind, patterns: &[String]) -> Result<PatternResponse> {
        self.run(kind.as_str(), |snapshot| pattern_lookup(snapshot, kind, patterns))
    }

    pub fn package_info(&self, request: &PackagesRequest) -> Result<PackagesResponse> {
        self.run("packages", |snapshot| package_info(snapshot, request))
    }

    pub fn package_tree(&self, request: &PackageTreeRequest) -> Result<PackageTreeResponse> {
        self.run("pkgtree", |snapshot| package_tree(snapshot, request))
    }

    pub fn package_repositories(
        &self,
        request: &PackagesRequest,
    ) -> Result<PackageRepositoriesResponse> {
        self.run("package repositories", |snapshot| {
            package_repositories(snapshot, request)
        })
    }

    pub fn db_change(&self) -> Result<DbChange> {
        self.run("dbchange", |snapshot| Ok(db_change(snapshot)))
    }

    pub fn stats(&self) -> Result<SnapshotStats> {
        self.run("stats", |snapshot| Ok(snapshot.stats()))
    }
}
