// src/cache/snapshot.rs

//! Immutable, fully indexed generation of the dataset
//!
//! All cross-references are plain indices into the snapshot's own vectors
//! (or ids into its own maps), so a snapshot never points into another
//! generation. Package lists in the name indices are sorted by EVR, which
//! turns "everything newer than X" into a binary search plus a slice.

use super::models::{DbChange, ErratumType, ModuleStream, Severity};
use crate::version::Nevra;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Index of a build in [`Snapshot`]
pub type PackageId = usize;

/// Index of a repository in [`Snapshot`]
pub type RepositoryId = usize;

/// A unique (name, EVR, arch) build
#[derive(Debug, Clone)]
pub struct PackageBuild {
    pub nevra: Nevra,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub source_package: Option<String>,
    pub first_published: Option<DateTime<Utc>>,
    pub repositories: Vec<RepositoryId>,
    /// Errata shipping this build, sorted by id
    pub errata: Vec<String>,
    /// CVEs affecting this build, sorted by id
    pub cves: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Repository {
    pub id: String,
    pub content_set: String,
    pub basearch: Option<String>,
    pub releasever: Option<String>,
    pub url: Option<String>,
    pub revision: Option<DateTime<Utc>>,
    pub last_change: Option<DateTime<Utc>>,
    pub third_party: bool,
}

#[derive(Debug, Clone)]
pub struct ContentSet {
    pub label: String,
    pub name: String,
    pub product: Option<String>,
    pub repositories: Vec<RepositoryId>,
}

#[derive(Debug, Clone)]
pub struct Cve {
    pub id: String,
    pub description: Option<String>,
    pub impact: Option<String>,
    pub cvss3_score: Option<f32>,
    pub cwe_list: Vec<String>,
    pub public_date: Option<DateTime<Utc>>,
    pub modified_date: Option<DateTime<Utc>>,
    pub redhat_url: Option<String>,
    pub secondary_url: Option<String>,
    pub affected_packages: Vec<PackageId>,
    /// Errata resolving this CVE, sorted by id
    pub errata: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Erratum {
    pub id: String,
    pub synopsis: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub severity: Option<Severity>,
    pub errata_type: ErratumType,
    pub issued: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    pub solution: Option<String>,
    pub url: Option<String>,
    pub references: Vec<String>,
    pub cves: Vec<String>,
    pub packages: Vec<PackageId>,
    pub modules: Vec<ModuleStream>,
}

impl Erratum {
    /// Security advisories either say so or fix at least one CVE
    pub fn is_security(&self) -> bool {
        self.errata_type == ErratumType::Security || !self.cves.is_empty()
    }

    /// Non-modular errata always apply; modular ones need an enabled stream
    pub fn applies_to(&self, enabled: &[ModuleStream]) -> bool {
        self.modules.is_empty() || self.modules.iter().any(|m| enabled.contains(m))
    }
}

/// Entity counts of one snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SnapshotStats {
    pub generation: u64,
    pub packages: usize,
    pub package_names: usize,
    pub repositories: usize,
    pub content_sets: usize,
    pub cves: usize,
    pub errata: usize,
}

#[derive(Debug, Default)]
pub struct Snapshot {
    pub(crate) generation: u64,
    pub(crate) packages: Vec<PackageBuild>,
    /// name -> builds ordered by (EVR, arch)
    pub(crate) by_name: HashMap<String, Vec<PackageId>>,
    /// name -> arch -> builds ordered by EVR
    pub(crate) by_name_arch: HashMap<String, HashMap<String, Vec<PackageId>>>,
    pub(crate) repositories: Vec<Repository>,
    pub(crate) repository_index: HashMap<String, RepositoryId>,
    pub(crate) content_sets: BTreeMap<String, ContentSet>,
    pub(crate) cves: BTreeMap<String, Cve>,
    pub(crate) errata: BTreeMap<String, Erratum>,
    pub(crate) changes: DbChange,
}

impl Snapshot {
    /// Publication counter stamped by the cache manager; 0 until published
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn package(&self, id: PackageId) -> &PackageBuild {
        &self.packages[id]
    }

    /// All builds of a name, ordered by EVR then arch
    pub fn builds_of(&self, name: &str) -> &[PackageId] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All builds of a name for one arch, ordered by EVR
    pub fn builds_of_arch(&self, name: &str, arch: &str) -> &[PackageId] {
        self.by_name_arch
            .get(name)
            .and_then(|arches| arches.get(arch))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Position of the first build strictly newer than `nevra`
    fn upper_bound(&self, builds: &[PackageId], nevra: &Nevra) -> usize {
        builds.partition_point(|&id| self.packages[id].nevra.evr() <= nevra.evr())
    }

    /// The exact build, if the snapshot knows it
    pub fn find_build(&self, nevra: &Nevra) -> Option<PackageId> {
        let builds = self.builds_of_arch(nevra.name(), nevra.arch());
        builds
            .binary_search_by(|&id| self.packages[id].nevra.evr().cmp(nevra.evr()))
            .ok()
            .map(|pos| builds[pos])
    }

    /// Same name and arch, EVR strictly greater, ascending
    pub fn newer_builds(&self, nevra: &Nevra) -> &[PackageId] {
        let builds = self.builds_of_arch(nevra.name(), nevra.arch());
        &builds[self.upper_bound(builds, nevra)..]
    }

    /// Same name and arch, EVR less than or equal, ascending
    pub fn builds_up_to(&self, nevra: &Nevra) -> &[PackageId] {
        let builds = self.builds_of_arch(nevra.name(), nevra.arch());
        &builds[..self.upper_bound(builds, nevra)]
    }

    pub fn repository(&self, id: RepositoryId) -> &Repository {
        &self.repositories[id]
    }

    pub fn content_set(&self, label: &str) -> Option<&ContentSet> {
        self.content_sets.get(label)
    }

    /// Content sets ordered by label
    pub fn content_sets(&self) -> impl Iterator<Item = &ContentSet> {
        self.content_sets.values()
    }

    /// Content set owning a repository
    pub fn content_set_of(&self, id: RepositoryId) -> Option<&ContentSet> {
        self.content_sets.get(&self.repositories[id].content_set)
    }

    pub fn cve(&self, id: &str) -> Option<&Cve> {
        self.cves.get(id)
    }

    /// CVEs ordered by id
    pub fn cves(&self) -> impl Iterator<Item = &Cve> {
        self.cves.values()
    }

    pub fn erratum(&self, id: &str) -> Option<&Erratum> {
        self.errata.get(id)
    }

    /// Errata ordered by id
    pub fn errata(&self) -> impl Iterator<Item = &Erratum> {
        self.errata.values()
    }

    pub fn changes(&self) -> &DbChange {
        &self.changes
    }

    pub fn last_change(&self) -> Option<DateTime<Utc>> {
        self.changes.last_change
    }

    pub fn stats(&self) -> SnapshotStats {
        SnapshotStats {
            generation: self.generation,
            packages: self.packages.len(),
            package_names: self.by_name.len(),
            repositories: self.repositories.len(),
            content_sets: self.content_sets.len(),
            cves: self.cves.len(),
            errata: self.errata.len(),
        }
    }
}
