// src/dump/mod.rs

//! Dataset dump loading
//!
//! Reads a JSON dump of a [`RawDataset`] from disk. Compression is
//! detected from the file extension:
//! - `.zst`: zstd
//! - `.gz`: gzip
//! - anything else: plain JSON

use crate::cache::{Snapshot, SnapshotBuilder};
use crate::error::Result;
use flate2::read::GzDecoder;
use std::fs;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

pub use crate::cache::models::RawDataset;

/// Read and decode a dataset dump
pub fn load_dataset(path: &Path) -> Result<RawDataset> {
    info!("Loading dataset dump from {}", path.display());

    let raw = fs::read(path)?;
    let bytes = match path.extension().and_then(|ext| ext.to_str()) {
        Some("zst") => {
            debug!("Decompressing zstd-compressed dump");
            zstd::decode_all(raw.as_slice())?
        }
        Some("gz") => {
            debug!("Decompressing gzip-compressed dump");
            let mut decompressed = Vec::new();
            GzDecoder::new(raw.as_slice()).read_to_end(&mut decompressed)?;
            decompressed
        }
        _ => raw,
    };

    let dataset: RawDataset = serde_json::from_slice(&bytes)?;
    debug!(
        "Decoded dump: {} packages, {} CVEs, {} errata",
        dataset.packages.len(),
        dataset.cves.len(),
        dataset.errata.len()
    );
    Ok(dataset)
}

/// Load a dump and build a snapshot from it
pub fn load_snapshot(path: &Path) -> Result<Snapshot> {
    SnapshotBuilder::from_dataset(load_dataset(path)?).build()
}
