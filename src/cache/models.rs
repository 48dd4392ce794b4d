// src/cache/models.rs

//! Raw dataset records
//!
//! These are the flat records a dataset refresh hands to the
//! [`SnapshotBuilder`](super::SnapshotBuilder). Cross-references are by
//! external identifier (content-set label, repository id, NEVRA string,
//! CVE id) and are resolved into indices when the snapshot is built.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Serialize timestamps as RFC 3339 with an explicit `+00:00` offset
pub mod rfc3339 {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::Serializer;

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::AutoSi, false))
    }

    pub fn serialize_option<S: Serializer>(
        ts: &Option<DateTime<Utc>>,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        match ts {
            Some(ts) => serialize(ts, s),
            None => s.serialize_none(),
        }
    }
}

/// Kind of advisory; dumps may spell it in any case
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ErratumType {
    Security,
    Bugfix,
    Enhancement,
    #[default]
    Other,
}

impl ErratumType {
    pub fn as_str(&self) -> &str {
        match self {
            ErratumType::Security => "security",
            ErratumType::Bugfix => "bugfix",
            ErratumType::Enhancement => "enhancement",
            ErratumType::Other => "other",
        }
    }
}

impl FromStr for ErratumType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "security" => Ok(ErratumType::Security),
            "bugfix" => Ok(ErratumType::Bugfix),
            "enhancement" => Ok(ErratumType::Enhancement),
            "other" => Ok(ErratumType::Other),
            _ => Err(format!("Invalid erratum type: {}", s)),
        }
    }
}

impl TryFrom<String> for ErratumType {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ErratumType> for String {
    fn from(kind: ErratumType) -> Self {
        kind.as_str().to_string()
    }
}

/// Advisory severity as published by the vendor
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Severity {
    Low,
    Moderate,
    Important,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &str {
        match self {
            Severity::Low => "Low",
            Severity::Moderate => "Moderate",
            Severity::Important => "Important",
            Severity::Critical => "Critical",
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "moderate" => Ok(Severity::Moderate),
            "important" => Ok(Severity::Important),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("Invalid severity: {}", s)),
        }
    }
}

impl TryFrom<String> for Severity {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Severity> for String {
    fn from(severity: Severity) -> Self {
        severity.as_str().to_string()
    }
}

/// An enabled module stream, e.g. `postgresql:12`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModuleStream {
    pub module_name: String,
    pub module_stream: String,
}

impl ModuleStream {
    pub fn new(module_name: impl Into<String>, module_stream: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            module_stream: module_stream.into(),
        }
    }
}

/// A product stream grouping repositories
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentSetRecord {
    pub label: String,
    pub name: String,
    #[serde(default)]
    pub product: Option<String>,
}

/// One repository (a content set for a given basearch/releasever)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryRecord {
    /// Unique key packages refer to
    pub id: String,
    /// Label of the owning content set
    pub content_set: String,
    #[serde(default)]
    pub basearch: Option<String>,
    #[serde(default)]
    pub releasever: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, serialize_with = "rfc3339::serialize_option")]
    pub revision: Option<DateTime<Utc>>,
    #[serde(default, serialize_with = "rfc3339::serialize_option")]
    pub last_change: Option<DateTime<Utc>>,
    #[serde(default)]
    pub third_party: bool,
}

/// A package build known to the dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageRecord {
    pub name: String,
    #[serde(default)]
    pub epoch: String,
    pub version: String,
    pub release: String,
    pub arch: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub source_package: Option<String>,
    #[serde(default, serialize_with = "rfc3339::serialize_option")]
    pub first_published: Option<DateTime<Utc>>,
    /// Ids of the repositories shipping this build
    #[serde(default)]
    pub repositories: Vec<String>,
}

impl PackageRecord {
    /// Minimal record, mostly for tests
    pub fn new(
        name: impl Into<String>,
        epoch: impl Into<String>,
        version: impl Into<String>,
        release: impl Into<String>,
        arch: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            epoch: epoch.into(),
            version: version.into(),
            release: release.into(),
            arch: arch.into(),
            summary: None,
            description: None,
            source_package: None,
            first_published: None,
            repositories: Vec::new(),
        }
    }
}

/// A CVE and the builds it affects
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CveRecord {
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub impact: Option<String>,
    #[serde(default)]
    pub cvss3_score: Option<f32>,
    #[serde(default)]
    pub cwe_list: Vec<String>,
    #[serde(default, serialize_with = "rfc3339::serialize_option")]
    pub public_date: Option<DateTime<Utc>>,
    #[serde(default, serialize_with = "rfc3339::serialize_option")]
    pub modified_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub redhat_url: Option<String>,
    #[serde(default)]
    pub secondary_url: Option<String>,
    /// NEVRA strings of affected builds
    #[serde(default)]
    pub affected_packages: Vec<String>,
}

impl CveRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: None,
            impact: None,
            cvss3_score: None,
            cwe_list: Vec::new(),
            public_date: None,
            modified_date: None,
            redhat_url: None,
            secondary_url: None,
            affected_packages: Vec::new(),
        }
    }
}

/// An advisory shipping fixed builds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErratumRecord {
    pub id: String,
    #[serde(default)]
    pub synopsis: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(rename = "type", default)]
    pub errata_type: ErratumType,
    #[serde(default, serialize_with = "rfc3339::serialize_option")]
    pub issued: Option<DateTime<Utc>>,
    #[serde(default, serialize_with = "rfc3339::serialize_option")]
    pub updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub solution: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub references: Vec<String>,
    #[serde(default)]
    pub cve_list: Vec<String>,
    /// NEVRA strings of shipped builds
    #[serde(default)]
    pub package_list: Vec<String>,
    /// Module streams this advisory is restricted to; empty for non-modular
    #[serde(default)]
    pub modules: Vec<ModuleStream>,
}

impl ErratumRecord {
    pub fn new(id: impl Into<String>, errata_type: ErratumType) -> Self {
        Self {
            id: id.into(),
            synopsis: None,
            summary: None,
            description: None,
            severity: None,
            errata_type,
            issued: None,
            updated: None,
            solution: None,
            url: None,
            references: Vec::new(),
            cve_list: Vec::new(),
            package_list: Vec::new(),
            modules: Vec::new(),
        }
    }
}

/// Last-change timestamps per entity kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbChange {
    #[serde(default, serialize_with = "rfc3339::serialize_option")]
    pub cve_changes: Option<DateTime<Utc>>,
    #[serde(default, serialize_with = "rfc3339::serialize_option")]
    pub errata_changes: Option<DateTime<Utc>>,
    #[serde(default, serialize_with = "rfc3339::serialize_option")]
    pub repository_changes: Option<DateTime<Utc>>,
    #[serde(default, serialize_with = "rfc3339::serialize_option")]
    pub last_change: Option<DateTime<Utc>>,
    #[serde(default, serialize_with = "rfc3339::serialize_option")]
    pub exported: Option<DateTime<Utc>>,
}

/// Everything one refresh cycle delivers
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawDataset {
    #[serde(default)]
    pub content_sets: Vec<ContentSetRecord>,
    #[serde(default)]
    pub repositories: Vec<RepositoryRecord>,
    #[serde(default)]
    pub packages: Vec<PackageRecord>,
    #[serde(default)]
    pub cves: Vec<CveRecord>,
    #[serde(default)]
    pub errata: Vec<ErratumRecord>,
    #[serde(default)]
    pub changes: DbChange,
}
