// src/query/patterns.rs

//! Pattern lookups over CVE, erratum and repository identifiers
//!
//! One operation serves all three entity kinds. Patterns are full-string
//! regular expressions; a request may carry several and gets the union of
//! their matches, ordered by identifier.

use crate::cache::Snapshot;
use crate::cache::models::{ErratumType, ModuleStream, Severity, rfc3339};
use crate::cache::snapshot::{ContentSet, Cve, Erratum};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Which identifier space a pattern is matched against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Cve,
    Erratum,
    /// Content-set labels
    Repository,
}

impl EntityKind {
    pub fn as_str(&self) -> &str {
        match self {
            EntityKind::Cve => "cve",
            EntityKind::Erratum => "erratum",
            EntityKind::Repository => "repository",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CveDetail {
    pub synopsis: String,
    pub description: Option<String>,
    pub impact: Option<String>,
    pub cvss3_score: Option<f32>,
    pub cwe_list: Vec<String>,
    #[serde(serialize_with = "rfc3339::serialize_option")]
    pub public_date: Option<DateTime<Utc>>,
    #[serde(serialize_with = "rfc3339::serialize_option")]
    pub modified_date: Option<DateTime<Utc>>,
    pub redhat_url: Option<String>,
    pub secondary_url: Option<String>,
    pub errata_list: Vec<String>,
    pub package_list: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErratumDetail {
    pub synopsis: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub severity: Option<Severity>,
    #[serde(rename = "type")]
    pub errata_type: ErratumType,
    #[serde(serialize_with = "rfc3339::serialize_option")]
    pub issued: Option<DateTime<Utc>>,
    #[serde(serialize_with = "rfc3339::serialize_option")]
    pub updated: Option<DateTime<Utc>>,
    pub solution: Option<String>,
    pub url: Option<String>,
    pub reference_list: Vec<String>,
    pub cve_list: Vec<String>,
    pub package_list: Vec<String>,
    pub modules_list: Vec<ModuleStream>,
}

/// One repository of a matched content set
#[derive(Debug, Clone, Serialize)]
pub struct RepositoryDetail {
    pub label: String,
    pub name: String,
    pub url: Option<String>,
    pub basearch: Option<String>,
    pub releasever: Option<String>,
    pub product: Option<String>,
    #[serde(serialize_with = "rfc3339::serialize_option")]
    pub revision: Option<DateTime<Utc>>,
    #[serde(serialize_with = "rfc3339::serialize_option")]
    pub last_change: Option<DateTime<Utc>>,
    pub third_party: bool,
}

#[derive(Debug, Clone, Serialize)]
pub enum PatternMatches {
    #[serde(rename = "cve_list")]
    Cves(BTreeMap<String, CveDetail>),
    #[serde(rename = "errata_list")]
    Errata(BTreeMap<String, ErratumDetail>),
    #[serde(rename = "repository_list")]
    Repositories(BTreeMap<String, Vec<RepositoryDetail>>),
}

impl PatternMatches {
    pub fn len(&self) -> usize {
        match self {
            PatternMatches::Cves(map) => map.len(),
            PatternMatches::Errata(map) => map.len(),
            PatternMatches::Repositories(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Matched identifiers in order
    pub fn ids(&self) -> Vec<&str> {
        match self {
            PatternMatches::Cves(map) => map.keys().map(String::as_str).collect(),
            PatternMatches::Errata(map) => map.keys().map(String::as_str).collect(),
            PatternMatches::Repositories(map) => map.keys().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PatternResponse {
    #[serde(flatten)]
    pub matches: PatternMatches,
    #[serde(serialize_with = "rfc3339::serialize_option")]
    pub last_change: Option<DateTime<Utc>>,
}

/// A compiled request pattern
struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    /// The pattern must parse on its own before it is anchored, otherwise an
    /// unbalanced `)` could close the anchoring group early.
    fn compile(source: &str) -> Result<Self> {
        let invalid = |e: regex::Error| Error::InvalidPattern {
            pattern: source.to_string(),
            message: e.to_string(),
        };
        Regex::new(source).map_err(invalid)?;
        let regex = Regex::new(&format!("^(?:{})$", source)).map_err(invalid)?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    /// Patterns without metacharacters name exactly one identifier
    fn as_literal(&self) -> Option<&str> {
        const META: &str = r"\.+*?()|[]{}^$";
        (!self.source.chars().any(|c| META.contains(c))).then_some(self.source.as_str())
    }
}

/// Union of every entity whose id matches one of `patterns`, keyed by id
fn select<'a, T, I>(
    patterns: &[Pattern],
    all: impl Fn() -> I,
    get: impl Fn(&str) -> Option<&'a T>,
    id: impl Fn(&'a T) -> &'a str,
) -> BTreeMap<&'a str, &'a T>
where
    T: 'a,
    I: Iterator<Item = &'a T>,
{
    let mut selected = BTreeMap::new();
    for pattern in patterns {
        match pattern.as_literal() {
            Some(literal) => {
                if let Some(item) = get(literal) {
                    selected.insert(id(item), item);
                }
            }
            None => {
                for item in all().filter(|&item| pattern.regex.is_match(id(item))) {
                    selected.insert(id(item), item);
                }
            }
        }
    }
    selected
}

fn cve_detail(snapshot: &Snapshot, cve: &Cve) -> CveDetail {
    CveDetail {
        synopsis: cve.id.clone(),
        description: cve.description.clone(),
        impact: cve.impact.clone(),
        cvss3_score: cve.cvss3_score,
        cwe_list: cve.cwe_list.clone(),
        public_date: cve.public_date,
        modified_date: cve.modified_date,
        redhat_url: cve.redhat_url.clone(),
        secondary_url: cve.secondary_url.clone(),
        errata_list: cve.errata.clone(),
        package_list: cve
            .affected_packages
            .iter()
            .map(|&id| snapshot.package(id).nevra.to_string())
            .collect(),
    }
}

fn erratum_detail(snapshot: &Snapshot, erratum: &Erratum) -> ErratumDetail {
    ErratumDetail {
        synopsis: erratum.synopsis.clone(),
        summary: erratum.summary.clone(),
        description: erratum.description.clone(),
        severity: erratum.severity,
        errata_type: erratum.errata_type,
        issued: erratum.issued,
        updated: erratum.updated,
        solution: erratum.solution.clone(),
        url: erratum.url.clone(),
        reference_list: erratum.references.clone(),
        cve_list: erratum.cves.clone(),
        package_list: erratum
            .packages
            .iter()
            .map(|&id| snapshot.package(id).nevra.to_string())
            .collect(),
        modules_list: erratum.modules.clone(),
    }
}

fn repository_details(snapshot: &Snapshot, content_set: &ContentSet) -> Vec<RepositoryDetail> {
    content_set
        .repositories
        .iter()
        .map(|&id| {
            let repo = snapshot.repository(id);
            RepositoryDetail {
                label: content_set.label.clone(),
                name: content_set.name.clone(),
                url: repo.url.clone(),
                basearch: repo.basearch.clone(),
                releasever: repo.releasever.clone(),
                product: content_set.product.clone(),
                revision: repo.revision,
                last_change: repo.last_change,
                third_party: repo.third_party,
            }
        })
        .collect()
}

/// Look up every entity of `kind` whose identifier fully matches one of
/// `patterns`. All patterns are compiled before any matching.
pub fn pattern_lookup(
    snapshot: &Snapshot,
    kind: EntityKind,
    patterns: &[String],
) -> Result<PatternResponse> {
    let patterns = patterns
        .iter()
        .map(|p| Pattern::compile(p))
        .collect::<Result<Vec<_>>>()?;

    let matches = match kind {
        EntityKind::Cve => PatternMatches::Cves(
            select(&patterns, || snapshot.cves(), |id| snapshot.cve(id), |c| c.id.as_str())
                .into_iter()
                .map(|(id, cve)| (id.to_string(), cve_detail(snapshot, cve)))
                .collect(),
        ),
        EntityKind::Erratum => PatternMatches::Errata(
            select(&patterns, || snapshot.errata(), |id| snapshot.erratum(id), |e| e.id.as_str())
                .into_iter()
                .map(|(id, erratum)| (id.to_string(), erratum_detail(snapshot, erratum)))
                .collect(),
        ),
        EntityKind::Repository => PatternMatches::Repositories(
            select(
                &patterns,
                || snapshot.content_sets(),
                |label| snapshot.content_set(label),
                |cs| cs.label.as_str(),
            )
            .into_iter()
            .map(|(label, cs)| (label.to_string(), repository_details(snapshot, cs)))
            .collect(),
        ),
    };

    debug!("{} lookup matched {} identifiers", kind.as_str(), matches.len());
    Ok(PatternResponse {
        matches,
        last_change: snapshot.last_change(),
    })
}
