// src/query/packages.rs

//! Package-centric queries: build metadata, per-name release history and
//! content-set membership

use crate::cache::models::rfc3339;
use crate::cache::snapshot::PackageBuild;
use crate::cache::{PackageId, RepositoryId, Snapshot};
use crate::error::Result;
use crate::version::{Nevra, percent_decode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackagesRequest {
    pub package_list: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageTreeRequest {
    pub package_name_list: Vec<String>,
}

/// Repository membership of a build
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct RepositoryRef {
    pub label: String,
    pub name: String,
    pub basearch: Option<String>,
    pub releasever: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PackageDetail {
    pub summary: Option<String>,
    pub description: Option<String>,
    pub source_package: Option<String>,
    pub repositories: Vec<RepositoryRef>,
    pub errata: Vec<String>,
}

/// Serializes to `{}` for builds the snapshot does not know
#[derive(Debug, Clone, Default, Serialize)]
pub struct PackageInfo {
    #[serde(flatten)]
    pub detail: Option<PackageDetail>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PackagesResponse {
    pub package_list: BTreeMap<String, PackageInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TreeErratum {
    pub name: String,
    #[serde(serialize_with = "rfc3339::serialize_option")]
    pub issued: Option<DateTime<Utc>>,
    pub cve_list: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TreeEntry {
    pub nevra: String,
    #[serde(serialize_with = "rfc3339::serialize_option")]
    pub first_published: Option<DateTime<Utc>>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub repositories: Vec<RepositoryRef>,
    pub errata: Vec<TreeErratum>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PackageTreeResponse {
    pub package_name_list: BTreeMap<String, Vec<TreeEntry>>,
    #[serde(serialize_with = "rfc3339::serialize_option")]
    pub last_change: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ContentSetRef {
    pub repo_name: String,
    pub repo_label: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PackageRepositoriesResponse {
    pub data: BTreeMap<String, Vec<ContentSetRef>>,
}

fn repository_refs(snapshot: &Snapshot, repositories: &[RepositoryId]) -> Vec<RepositoryRef> {
    let mut refs: Vec<RepositoryRef> = repositories
        .iter()
        .map(|&id| {
            let repo = snapshot.repository(id);
            RepositoryRef {
                label: repo.content_set.clone(),
                name: snapshot
                    .content_set_of(id)
                    .map(|cs| cs.name.clone())
                    .unwrap_or_default(),
                basearch: repo.basearch.clone(),
                releasever: repo.releasever.clone(),
            }
        })
        .collect();
    refs.sort();
    refs
}

/// Parse every identifier up front; keys are the decoded input strings
fn parse_all(inputs: &[String]) -> Result<Vec<(String, Nevra)>> {
    inputs
        .iter()
        .map(|input| Ok((percent_decode(input.trim()).into_owned(), Nevra::parse(input)?)))
        .collect()
}

fn package_detail(snapshot: &Snapshot, build: &PackageBuild) -> PackageDetail {
    PackageDetail {
        summary: build.summary.clone(),
        description: build.description.clone(),
        source_package: build.source_package.clone(),
        repositories: repository_refs(snapshot, &build.repositories),
        errata: build.errata.clone(),
    }
}

/// Metadata and repository membership of each requested build
pub fn package_info(snapshot: &Snapshot, request: &PackagesRequest) -> Result<PackagesResponse> {
    let package_list = parse_all(&request.package_list)?
        .into_iter()
        .map(|(key, nevra)| {
            let detail = snapshot
                .find_build(&nevra)
                .map(|id| package_detail(snapshot, snapshot.package(id)));
            (key, PackageInfo { detail })
        })
        .collect();

    Ok(PackagesResponse { package_list })
}

fn tree_entry(snapshot: &Snapshot, id: PackageId) -> TreeEntry {
    let build = snapshot.package(id);
    TreeEntry {
        nevra: build.nevra.to_string(),
        first_published: build.first_published,
        summary: build.summary.clone(),
        description: build.description.clone(),
        repositories: repository_refs(snapshot, &build.repositories),
        errata: build
            .errata
            .iter()
            .filter_map(|id| snapshot.erratum(id))
            .map(|erratum| TreeErratum {
                name: erratum.id.clone(),
                issued: erratum.issued,
                cve_list: erratum.cves.clone(),
            })
            .collect(),
    }
}

/// Release history of each requested package name, oldest first
pub fn package_tree(
    snapshot: &Snapshot,
    request: &PackageTreeRequest,
) -> Result<PackageTreeResponse> {
    let package_name_list = request
        .package_name_list
        .iter()
        .map(|name| {
            let entries = snapshot
                .builds_of(name)
                .iter()
                .map(|&id| tree_entry(snapshot, id))
                .collect();
            (name.clone(), entries)
        })
        .collect();

    Ok(PackageTreeResponse {
        package_name_list,
        last_change: snapshot.last_change(),
    })
}

/// Distinct content sets shipping each requested build
pub fn package_repositories(
    snapshot: &Snapshot,
    request: &PackagesRequest,
) -> Result<PackageRepositoriesResponse> {
    let data = parse_all(&request.package_list)?
        .into_iter()
        .map(|(key, nevra)| {
            let content_sets: BTreeSet<ContentSetRef> = snapshot
                .find_build(&nevra)
                .map(|id| snapshot.package(id).repositories.as_slice())
                .unwrap_or_default()
                .iter()
                .filter_map(|&repo| snapshot.content_set_of(repo))
                .map(|cs| ContentSetRef {
                    repo_name: cs.name.clone(),
                    repo_label: cs.label.clone(),
                })
                .collect();
            (key, content_sets.into_iter().collect())
        })
        .collect();

    Ok(PackageRepositoriesResponse { data })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SnapshotBuilder;
    use crate::cache::models::{
        ContentSetRecord, CveRecord, ErratumRecord, ErratumType, PackageRecord, RepositoryRecord,
    };
    use crate::error::Error;
    use chrono::TimeZone;

    fn repository(id: &str, content_set: &str, releasever: &str) -> RepositoryRecord {
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

    fn snapshot() -> Snapshot {
        let mut published =
            PackageRecord::new("kernel-rt", "", "2.6.33.9", "rt31.66.el6rt", "x86_64");
        published.summary = Some("The Linux kernel".to_string());
        published.source_package = Some("kernel-rt-2.6.33.9-rt31.66.el6rt.src".to_string());
        published.first_published = Some(Utc.with_ymd_and_hms(2011, 6, 1, 0, 0, 0).unwrap());
        published.repositories = vec!["mrg-6.0".to_string(), "mrg-6.1".to_string()];

        let mut newer = PackageRecord::new("kernel-rt", "", "3.10.0", "1.el6rt", "x86_64");
        newer.repositories = vec!["mrg-6.1".to_string()];

        let mut cve = CveRecord::new("CVE-2018-10126");
        cve.affected_packages = vec!["kernel-rt-2.6.33.9-rt31.66.el6rt.x86_64".to_string()];

        let mut erratum = ErratumRecord::new("RHSA-2018:0001", ErratumType::Security);
        erratum.issued = Some(Utc.with_ymd_and_hms(2018, 1, 2, 0, 0, 0).unwrap());
        erratum.cve_list = vec!["CVE-2018-10126".to_string()];
        erratum.package_list = vec!["kernel-rt-3.10.0-1.el6rt.x86_64".to_string()];

        SnapshotBuilder::new()
            .content_set(ContentSetRecord {
                label: "rhel-6-server-realtime-rpms".to_string(),
                name: "Red Hat MRG Realtime".to_string(),
                product: None,
            })
            .repository(repository("mrg-6.0", "rhel-6-server-realtime-rpms", "6.0"))
            .repository(repository("mrg-6.1", "rhel-6-server-realtime-rpms", "6.1"))
            .package(published)
            .package(newer)
            .package(PackageRecord::new("kernel-rt", "", "2.6.33.9", "rt31.66.el6rt", "i686"))
            .cve(cve)
            .erratum(erratum)
            .build()
            .unwrap()
    }

    fn packages(list: &[&str]) -> PackagesRequest {
        PackagesRequest {
            package_list: list.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn test_package_info_known_and_unknown() {
        let snapshot = snapshot();
        let response = package_info(
            &snapshot,
            &packages(&["kernel-rt-2.6.33.9-rt31.66.el6rt.x86_64", "kernel-rt-9-9.x86_64"]),
        )
        .unwrap();

        let known = response.package_list["kernel-rt-2.6.33.9-rt31.66.el6rt.x86_64"]
            .detail
            .as_ref()
            .unwrap();
        assert_eq!(known.summary.as_deref(), Some("The Linux kernel"));
        assert_eq!(known.repositories.len(), 2);
        assert_eq!(known.repositories[0].releasever.as_deref(), Some("6.0"));

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["package_list"]["kernel-rt-9-9.x86_64"], serde_json::json!({}));
    }

    #[test]
    fn test_package_tree_orders_history() {
        let snapshot = snapshot();
        let request = PackageTreeRequest {
            package_name_list: vec!["kernel-rt".to_string(), "missing".to_string()],
        };
        let response = package_tree(&snapshot, &request).unwrap();

        let nevras: Vec<_> = response.package_name_list["kernel-rt"]
            .iter()
            .map(|entry| entry.nevra.as_str())
            .collect();
        assert_eq!(
            nevras,
            vec![
                "kernel-rt-2.6.33.9-rt31.66.el6rt.i686",
                "kernel-rt-2.6.33.9-rt31.66.el6rt.x86_64",
                "kernel-rt-3.10.0-1.el6rt.x86_64",
            ]
        );
        assert!(response.package_name_list["missing"].is_empty());

        let newest = &response.package_name_list["kernel-rt"][2];
        assert_eq!(newest.errata[0].name, "RHSA-2018:0001");
        assert_eq!(newest.errata[0].cve_list, vec!["CVE-2018-10126"]);

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(
            value["package_name_list"]["kernel-rt"][1]["first_published"],
            "2011-06-01T00:00:00+00:00"
        );
    }

    #[test]
    fn test_package_repositories_are_distinct_content_sets() {
        let snapshot = snapshot();
        let response = package_repositories(
            &snapshot,
            &packages(&[
                "kernel-rt-2.6.33.9-rt31.66.el6rt.x86_64",
                "kernel-rt-2.6.33.9-rt31.66.el6rt.i686",
            ]),
        )
        .unwrap();

        assert_eq!(
            response.data["kernel-rt-2.6.33.9-rt31.66.el6rt.x86_64"],
            vec![ContentSetRef {
                repo_name: "Red Hat MRG Realtime".to_string(),
                repo_label: "rhel-6-server-realtime-rpms".to_string(),
            }]
        );
        assert!(response.data["kernel-rt-2.6.33.9-rt31.66.el6rt.i686"].is_empty());
    }

    #[test]
    fn test_malformed_identifier_rejected() {
        let snapshot = snapshot();
        assert!(matches!(
            package_info(&snapshot, &packages(&["kernel-rt"])),
            Err(Error::MalformedNevra(_))
        ));
        assert!(matches!(
            package_repositories(&snapshot, &packages(&["kernel-rt"])),
            Err(Error::MalformedNevra(_))
        ));
    }
}
