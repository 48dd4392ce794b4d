// src/query/updates.rs

//! Update resolution
//!
//! For each requested build, list every newer build of the same name and
//! arch that is reachable through the queried build's content sets,
//! annotated with the repository and erratum that ship it.

use crate::cache::models::rfc3339;
use crate::cache::snapshot::{PackageBuild, Repository};
use crate::cache::{ModuleStream, Snapshot};
use crate::error::Result;
use crate::version::{Nevra, percent_decode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatesRequest {
    pub package_list: Vec<String>,
    /// Content-set labels the caller is subscribed to
    #[serde(default)]
    pub repository_list: Option<Vec<String>>,
    #[serde(default)]
    pub modules_list: Vec<ModuleStream>,
    #[serde(default)]
    pub releasever: Option<String>,
    #[serde(default)]
    pub basearch: Option<String>,
    #[serde(default)]
    pub security_only: bool,
}

impl UpdatesRequest {
    pub fn new(package_list: Vec<String>) -> Self {
        Self {
            package_list,
            ..Self::default()
        }
    }
}

/// One way to obtain a newer build
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct UpdateEntry {
    pub package: String,
    pub erratum: Option<String>,
    /// Content-set label of the shipping repository
    pub repository: Option<String>,
    pub basearch: Option<String>,
    pub releasever: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PackageUpdates {
    pub available_updates: Vec<UpdateEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdatesResponse {
    pub update_list: BTreeMap<String, PackageUpdates>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository_list: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub modules_list: Vec<ModuleStream>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub releasever: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub basearch: Option<String>,
    #[serde(serialize_with = "rfc3339::serialize_option")]
    pub last_change: Option<DateTime<Utc>>,
}

/// Which repositories a candidate build may come from
struct RepositoryFilter<'a> {
    /// Content sets reachable from the queried build; `None` when unknown
    reachable: Option<HashSet<&'a str>>,
    requested: Option<HashSet<&'a str>>,
    releasever: Option<&'a str>,
    basearch: Option<&'a str>,
}

impl<'a> RepositoryFilter<'a> {
    fn new(snapshot: &'a Snapshot, nevra: &Nevra, request: &'a UpdatesRequest) -> Self {
        let reachable = snapshot
            .find_build(nevra)
            .map(|id| snapshot.package(id))
            .filter(|build| !build.repositories.is_empty())
            .map(|build| {
                build
                    .repositories
                    .iter()
                    .map(|&repo| snapshot.repository(repo).content_set.as_str())
                    .collect()
            });

        Self {
            reachable,
            requested: request
                .repository_list
                .as_ref()
                .map(|labels| labels.iter().map(String::as_str).collect()),
            releasever: request.releasever.as_deref(),
            basearch: request.basearch.as_deref(),
        }
    }

    fn is_restricted(&self) -> bool {
        self.reachable.is_some() || self.requested.is_some()
    }

    fn allows(&self, repo: &Repository) -> bool {
        let label = repo.content_set.as_str();
        self.reachable.as_ref().is_none_or(|set| set.contains(label))
            && self.requested.as_ref().is_none_or(|set| set.contains(label))
            && attribute_matches(self.releasever, repo.releasever.as_deref())
            && attribute_matches(self.basearch, repo.basearch.as_deref())
    }
}

/// Unset on either side matches anything
fn attribute_matches(wanted: Option<&str>, actual: Option<&str>) -> bool {
    match (wanted, actual) {
        (Some(wanted), Some(actual)) => wanted == actual,
        _ => true,
    }
}

/// Errata through which `build` may be offered; `None` stands for "no
/// advisory". Returns an empty list when the build must not be offered.
fn applicable_errata<'a>(
    snapshot: &'a Snapshot,
    build: &'a PackageBuild,
    request: &UpdatesRequest,
) -> Vec<Option<&'a str>> {
    if build.errata.is_empty() {
        return if request.security_only {
            Vec::new()
        } else {
            vec![None]
        };
    }

    build
        .errata
        .iter()
        .filter_map(|id| snapshot.erratum(id))
        .filter(|erratum| erratum.applies_to(&request.modules_list))
        .filter(|erratum| !request.security_only || erratum.is_security())
        .map(|erratum| Some(erratum.id.as_str()))
        .collect()
}

fn updates_for(snapshot: &Snapshot, nevra: &Nevra, request: &UpdatesRequest) -> Vec<UpdateEntry> {
    let filter = RepositoryFilter::new(snapshot, nevra, request);
    let mut updates = Vec::new();

    for &candidate in snapshot.newer_builds(nevra) {
        let build = snapshot.package(candidate);

        let repositories: Vec<Option<&Repository>> = if build.repositories.is_empty() {
            if filter.is_restricted() {
                continue;
            }
            vec![None]
        } else {
            build
                .repositories
                .iter()
                .map(|&id| snapshot.repository(id))
                .filter(|repo| filter.allows(repo))
                .map(Some)
                .collect()
        };
        if repositories.is_empty() {
            continue;
        }

        let errata = applicable_errata(snapshot, build, request);
        if errata.is_empty() {
            continue;
        }

        let package = build.nevra.to_string();
        let mut entries = Vec::with_capacity(repositories.len() * errata.len());
        for &repo in &repositories {
            for &erratum in &errata {
                entries.push(UpdateEntry {
                    package: package.clone(),
                    erratum: erratum.map(str::to_string),
                    repository: repo.map(|r| r.content_set.clone()),
                    basearch: repo.and_then(|r| r.basearch.clone()),
                    releasever: repo.and_then(|r| r.releasever.clone()),
                });
            }
        }
        // candidates arrive in EVR order; only order within one build
        entries.sort();
        entries.dedup();
        updates.extend(entries);
    }

    updates
}

/// Resolve available updates for every requested build.
///
/// All identifiers are parsed before any lookup, so a malformed entry fails
/// the whole request.
pub fn updates(snapshot: &Snapshot, request: &UpdatesRequest) -> Result<UpdatesResponse> {
    let parsed = request
        .package_list
        .iter()
        .map(|input| Ok((percent_decode(input.trim()).into_owned(), Nevra::parse(input)?)))
        .collect::<Result<Vec<_>>>()?;

    let mut update_list = BTreeMap::new();
    for (key, nevra) in parsed {
        let available_updates = updates_for(snapshot, &nevra, request);
        debug!("{} has {} available updates", key, available_updates.len());
        update_list.insert(key, PackageUpdates { available_updates });
    }

    Ok(UpdatesResponse {
        update_list,
        repository_list: request.repository_list.clone(),
        modules_list: request.modules_list.clone(),
        releasever: request.releasever.clone(),
        basearch: request.basearch.clone(),
        last_change: snapshot.last_change(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SnapshotBuilder;
    use crate::cache::models::{
        ContentSetRecord, ErratumRecord, ErratumType, PackageRecord, RepositoryRecord,
    };
    use crate::error::Error;

    fn content_set(label: &str) -> ContentSetRecord {
        ContentSetRecord {
            label: label.to_string(),
            name: label.to_string(),
            product: None,
        }
    }

    fn repo(id: &str, content_set: &str, releasever: &str) -> RepositoryRecord {
        RepositoryRecord {
            id: id.to_string(),
            content_set: content_set.to_string(),
            basearch: Some("x86_64".to_string()),
            releasever: Some(releasever.to_string()),
            url: None,
            revision: None,
            last_change: None,
            third_party: false,
        }
    }

    fn build(version: &str, repos: &[&str]) -> PackageRecord {
        let mut record = PackageRecord::new("bash", "", version, "1.el7", "x86_64");
        record.repositories = repos.iter().map(|r| r.to_string()).collect();
        record
    }

    fn erratum(id: &str, kind: ErratumType, packages: &[&str]) -> ErratumRecord {
        let mut record = ErratumRecord::new(id, kind);
        record.package_list = packages.iter().map(|p| p.to_string()).collect();
        record
    }

    fn snapshot() -> Snapshot {
        let mut modular = erratum(
            "RHEA-2020:0001",
            ErratumType::Enhancement,
            &["bash-4.5-1.el7.x86_64"],
        );
        modular.modules = vec![ModuleStream::new("bash", "devel")];

        SnapshotBuilder::new()
            .content_set(content_set("rhel-7-server-rpms"))
            .content_set(content_set("rhel-7-server-extras-rpms"))
            .content_set(content_set("other-rpms"))
            .repository(repo("server-7.5", "rhel-7-server-rpms", "7.5"))
            .repository(repo("server-7.6", "rhel-7-server-rpms", "7.6"))
            .repository(repo("extras", "rhel-7-server-extras-rpms", "7Server"))
            .repository(repo("other", "other-rpms", "7Server"))
            .package(build("4.1", &["server-7.5"]))
            .package(build("4.2", &["server-7.5", "server-7.6"]))
            .package(build("4.3", &["server-7.6"]))
            .package(build("4.4", &["other"]))
            .package(build("4.5", &["server-7.6"]))
            .package(build("4.6", &["extras"]))
            .erratum(erratum(
                "RHBA-2019:0001",
                ErratumType::Bugfix,
                &["bash-4.2-1.el7.x86_64"],
            ))
            .erratum(erratum(
                "RHSA-2019:0002",
                ErratumType::Security,
                &["bash-4.3-1.el7.x86_64"],
            ))
            .erratum(modular)
            .build()
            .unwrap()
    }

    fn packages(response: &UpdatesResponse, key: &str) -> Vec<String> {
        response.update_list[key]
            .available_updates
            .iter()
            .map(|u| format!("{}@{}", u.package, u.releasever.as_deref().unwrap_or("-")))
            .collect()
    }

    #[test]
    fn test_updates_follow_content_sets() {
        let snapshot = snapshot();
        let request = UpdatesRequest::new(vec!["bash-4.1-1.el7.x86_64".to_string()]);
        let response = updates(&snapshot, &request).unwrap();

        // 4.4 lives only in an unrelated content set, 4.5 only in a
        // non-applicable modular erratum
        assert_eq!(
            packages(&response, "bash-4.1-1.el7.x86_64"),
            vec![
                "bash-4.2-1.el7.x86_64@7.5",
                "bash-4.2-1.el7.x86_64@7.6",
                "bash-4.3-1.el7.x86_64@7.6",
            ]
        );
    }

    #[test]
    fn test_unknown_build_sees_every_repository() {
        let snapshot = snapshot();
        let request = UpdatesRequest::new(vec!["bash-4.0-1.el7.x86_64".to_string()]);
        let response = updates(&snapshot, &request).unwrap();
        let found = packages(&response, "bash-4.0-1.el7.x86_64");

        assert!(found.contains(&"bash-4.4-1.el7.x86_64@7Server".to_string()));
        assert!(found.contains(&"bash-4.6-1.el7.x86_64@7Server".to_string()));
        assert!(!found.iter().any(|p| p.starts_with("bash-4.5")));
    }

    #[test]
    fn test_modular_errata_need_enabled_stream() {
        let snapshot = snapshot();
        let mut request = UpdatesRequest::new(vec!["bash-4.3-1.el7.x86_64".to_string()]);
        request.modules_list = vec![ModuleStream::new("bash", "devel")];
        let response = updates(&snapshot, &request).unwrap();

        let entries = &response.update_list["bash-4.3-1.el7.x86_64"].available_updates;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].package, "bash-4.5-1.el7.x86_64");
        assert_eq!(entries[0].erratum.as_deref(), Some("RHEA-2020:0001"));
        assert_eq!(entries[0].repository.as_deref(), Some("rhel-7-server-rpms"));
    }

    #[test]
    fn test_security_only_and_filters() {
        let snapshot = snapshot();
        let mut request = UpdatesRequest::new(vec!["bash-4.1-1.el7.x86_64".to_string()]);
        request.security_only = true;
        let response = updates(&snapshot, &request).unwrap();
        assert_eq!(
            packages(&response, "bash-4.1-1.el7.x86_64"),
            vec!["bash-4.3-1.el7.x86_64@7.6"]
        );

        let mut request = UpdatesRequest::new(vec!["bash-4.1-1.el7.x86_64".to_string()]);
        request.releasever = Some("7.5".to_string());
        let response = updates(&snapshot, &request).unwrap();
        assert_eq!(
            packages(&response, "bash-4.1-1.el7.x86_64"),
            vec!["bash-4.2-1.el7.x86_64@7.5"]
        );
        assert_eq!(response.releasever.as_deref(), Some("7.5"));
    }

    #[test]
    fn test_repository_list_restricts_candidates() {
        let snapshot = snapshot();
        let mut request = UpdatesRequest::new(vec!["bash-4.0-1.el7.x86_64".to_string()]);
        request.repository_list = Some(vec!["rhel-7-server-extras-rpms".to_string()]);
        let response = updates(&snapshot, &request).unwrap();
        assert_eq!(
            packages(&response, "bash-4.0-1.el7.x86_64"),
            vec!["bash-4.6-1.el7.x86_64@7Server"]
        );
    }

    #[test]
    fn test_newest_build_has_no_updates() {
        let snapshot = snapshot();
        let request = UpdatesRequest::new(vec!["bash-4.6-1.el7.x86_64".to_string()]);
        let response = updates(&snapshot, &request).unwrap();
        assert!(response.update_list["bash-4.6-1.el7.x86_64"].available_updates.is_empty());

        let request = UpdatesRequest::new(vec!["zsh-5.0-1.el7.x86_64".to_string()]);
        let response = updates(&snapshot, &request).unwrap();
        assert!(response.update_list["zsh-5.0-1.el7.x86_64"].available_updates.is_empty());
    }

    #[test]
    fn test_malformed_entry_fails_whole_batch() {
        let snapshot = snapshot();
        let request = UpdatesRequest::new(vec![
            "bash-4.1-1.el7.x86_64".to_string(),
            "not-a-nevra".to_string(),
        ]);
        assert!(matches!(updates(&snapshot, &request), Err(Error::MalformedNevra(_))));
    }
}
