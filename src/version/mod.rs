// src/version/mod.rs

//! RPM version semantics
//!
//! - `nevra`: parsing package build identifiers
//! - `evr`: ordering epoch/version/release triples, `~` and `^` included

pub mod evr;
pub mod nevra;

pub use evr::{Evr, compare_evr, rpmvercmp};
pub use nevra::{Nevra, percent_decode};
