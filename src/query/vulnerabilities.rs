// src/query/vulnerabilities.rs

//! Vulnerability classification
//!
//! A CVE affects a queried build when one of its affected builds has the
//! same name and arch with an EVR at or below the queried one, unless an
//! applicable erratum fixing it ships a build newer than the newest affected
//! build, yet still at or below the query.
//! It is manually fixable when an applicable erratum ships a strictly newer
//! build of that name and arch, and unpatched otherwise.

use crate::cache::models::rfc3339;
use crate::cache::snapshot::Cve;
use crate::cache::{ModuleStream, PackageId, Snapshot};
use crate::error::Result;
use crate::version::Nevra;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VulnerabilitiesRequest {
    pub package_list: Vec<String>,
    #[serde(default)]
    pub modules_list: Vec<ModuleStream>,
}

impl VulnerabilitiesRequest {
    pub fn new(package_list: Vec<String>) -> Self {
        Self {
            package_list,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VulnerabilitiesResponse {
    pub cve_list: Vec<String>,
    pub manually_fixable_cve_list: Vec<String>,
    pub unpatched_cve_list: Vec<String>,
    #[serde(serialize_with = "rfc3339::serialize_option")]
    pub last_change: Option<DateTime<Utc>>,
}

/// Where the fixes for a CVE stand relative to one queried build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FixState {
    /// A fixing build sits above the newest affected build, at or below the query
    Applied,
    Available,
    Missing,
}

/// Builds of one name and arch around a queried EVR
struct Lineage {
    /// Position of each build at or below the query, ascending by EVR
    installed: HashMap<PackageId, usize>,
    newer: HashSet<PackageId>,
}

impl Lineage {
    fn fix_state(
        &self,
        snapshot: &Snapshot,
        cve: &Cve,
        newest_affected: usize,
        modules: &[ModuleStream],
    ) -> FixState {
        let mut state = FixState::Missing;
        let fixes = cve
            .errata
            .iter()
            .filter_map(|id| snapshot.erratum(id))
            .filter(|erratum| erratum.applies_to(modules))
            .flat_map(|erratum| erratum.packages.iter());
        for id in fixes {
            match self.installed.get(id) {
                Some(&pos) if pos > newest_affected => return FixState::Applied,
                Some(_) => {}
                None if self.newer.contains(id) => state = FixState::Available,
                None => {}
            }
        }
        state
    }
}

/// CVE id -> fixable, for one queried build
fn vulnerabilities_for<'a>(
    snapshot: &'a Snapshot,
    nevra: &Nevra,
    modules: &[ModuleStream],
) -> BTreeMap<&'a str, bool> {
    let up_to = snapshot.builds_up_to(nevra);

    // Ascending order leaves the newest affected position per CVE
    let mut newest_affected: BTreeMap<&str, usize> = BTreeMap::new();
    for (pos, &id) in up_to.iter().enumerate() {
        for cve in &snapshot.package(id).cves {
            newest_affected.insert(cve.as_str(), pos);
        }
    }
    if newest_affected.is_empty() {
        return BTreeMap::new();
    }

    let lineage = Lineage {
        installed: up_to.iter().enumerate().map(|(pos, &id)| (id, pos)).collect(),
        newer: snapshot.newer_builds(nevra).iter().copied().collect(),
    };
    newest_affected
        .into_iter()
        .filter_map(|(id, pos)| snapshot.cve(id).map(|cve| (cve, pos)))
        .filter_map(|(cve, pos)| match lineage.fix_state(snapshot, cve, pos, modules) {
            FixState::Applied => None,
            FixState::Available => Some((cve.id.as_str(), true)),
            FixState::Missing => Some((cve.id.as_str(), false)),
        })
        .collect()
}

/// Classify the CVEs affecting every requested build.
///
/// Results over several builds are merged; a CVE fixable for any of them is
/// reported as manually fixable.
pub fn vulnerabilities(
    snapshot: &Snapshot,
    request: &VulnerabilitiesRequest,
) -> Result<VulnerabilitiesResponse> {
    let parsed = request
        .package_list
        .iter()
        .map(|input| Nevra::parse(input))
        .collect::<Result<Vec<_>>>()?;

    let mut merged: BTreeMap<&str, bool> = BTreeMap::new();
    for nevra in &parsed {
        for (cve, fixable) in vulnerabilities_for(snapshot, nevra, &request.modules_list) {
            *merged.entry(cve).or_default() |= fixable;
        }
    }

    let (fixable, unpatched): (Vec<_>, Vec<_>) = merged.iter().partition(|(_, fixable)| **fixable);
    Ok(VulnerabilitiesResponse {
        cve_list: merged.keys().map(|id| id.to_string()).collect(),
        manually_fixable_cve_list: fixable.into_iter().map(|(id, _)| id.to_string()).collect(),
        unpatched_cve_list: unpatched.into_iter().map(|(id, _)| id.to_string()).collect(),
        last_change: snapshot.last_change(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SnapshotBuilder;
    use crate::cache::models::{CveRecord, ErratumRecord, ErratumType, PackageRecord};
    use crate::error::Error;

    fn cve(id: &str, affected: &[&str]) -> CveRecord {
        let mut record = CveRecord::new(id);
        record.affected_packages = affected.iter().map(|p| p.to_string()).collect();
        record
    }

    fn snapshot() -> Snapshot {
        let mut fix = ErratumRecord::new("RHSA-2018:0001", ErratumType::Security);
        fix.cve_list = vec!["CVE-2018-0001".to_string()];
        fix.package_list = vec!["openssl-1.0.2-2.el7.x86_64".to_string()];

        let mut modular_fix = ErratumRecord::new("RHSA-2018:0003", ErratumType::Security);
        modular_fix.cve_list = vec!["CVE-2018-0003".to_string()];
        modular_fix.package_list = vec!["openssl-1.0.2-3.el7.x86_64".to_string()];
        modular_fix.modules = vec![ModuleStream::new("openssl", "1.0")];

        SnapshotBuilder::new()
            .package(PackageRecord::new("openssl", "", "1.0.2", "1.el7", "x86_64"))
            .package(PackageRecord::new("openssl", "", "1.0.2", "2.el7", "x86_64"))
            .package(PackageRecord::new("openssl", "", "1.0.2", "3.el7", "x86_64"))
            .package(PackageRecord::new("openssl", "", "1.0.2", "1.el7", "i686"))
            .cve(cve("CVE-2018-0001", &["openssl-1.0.2-1.el7.x86_64"]))
            .cve(cve("CVE-2018-0002", &["openssl-1.0.2-1.el7.x86_64"]))
            .cve(cve("CVE-2018-0003", &["openssl-1.0.2-2.el7.x86_64"]))
            .cve(cve("CVE-2018-0004", &["openssl-1.0.2-1.el7.i686"]))
            .erratum(fix)
            .erratum(modular_fix)
            .build()
            .unwrap()
    }

    fn request(packages: &[&str]) -> VulnerabilitiesRequest {
        VulnerabilitiesRequest::new(packages.iter().map(|p| p.to_string()).collect())
    }

    #[test]
    fn test_partition_into_fixable_and_unpatched() {
        let snapshot = snapshot();
        let response =
            vulnerabilities(&snapshot, &request(&["openssl-1.0.2-1.el7.x86_64"])).unwrap();

        assert_eq!(response.cve_list, vec!["CVE-2018-0001", "CVE-2018-0002"]);
        assert_eq!(response.manually_fixable_cve_list, vec!["CVE-2018-0001"]);
        assert_eq!(response.unpatched_cve_list, vec!["CVE-2018-0002"]);
    }

    #[test]
    fn test_fix_at_or_below_query_resolves_cve() {
        let snapshot = snapshot();
        let response =
            vulnerabilities(&snapshot, &request(&["openssl-1.0.2-2.el7.x86_64"])).unwrap();

        // RHSA-2018:0001 shipped exactly this build
        assert_eq!(response.cve_list, vec!["CVE-2018-0002", "CVE-2018-0003"]);
        assert!(response.manually_fixable_cve_list.is_empty());
        assert_eq!(response.unpatched_cve_list, response.cve_list);
    }

    #[test]
    fn test_affected_again_after_fix() {
        let mut fix = ErratumRecord::new("RHSA-2020:0001", ErratumType::Security);
        fix.cve_list = vec!["CVE-2020-0001".to_string()];
        fix.package_list = vec!["foo-1.0-2.x86_64".to_string()];

        let snapshot = SnapshotBuilder::new()
            .package(PackageRecord::new("foo", "", "1.0", "1", "x86_64"))
            .package(PackageRecord::new("foo", "", "1.0", "2", "x86_64"))
            .package(PackageRecord::new("foo", "", "1.0", "3", "x86_64"))
            .cve(cve("CVE-2020-0001", &["foo-1.0-1.x86_64", "foo-1.0-3.x86_64"]))
            .erratum(fix)
            .build()
            .unwrap();

        // The fix predates the regression in -3
        let response = vulnerabilities(&snapshot, &request(&["foo-1.0-3.x86_64"])).unwrap();
        assert_eq!(response.cve_list, vec!["CVE-2020-0001"]);
        assert_eq!(response.unpatched_cve_list, vec!["CVE-2020-0001"]);

        let response = vulnerabilities(&snapshot, &request(&["foo-1.0-2.x86_64"])).unwrap();
        assert!(response.cve_list.is_empty());

        let response = vulnerabilities(&snapshot, &request(&["foo-1.0-1.x86_64"])).unwrap();
        assert_eq!(response.manually_fixable_cve_list, vec!["CVE-2020-0001"]);
    }

    #[test]
    fn test_modular_fix_needs_enabled_stream() {
        let snapshot = snapshot();
        let mut req = request(&["openssl-1.0.2-2.el7.x86_64"]);
        let response = vulnerabilities(&snapshot, &req).unwrap();
        assert!(response.unpatched_cve_list.contains(&"CVE-2018-0003".to_string()));

        req.modules_list = vec![ModuleStream::new("openssl", "1.0")];
        let response = vulnerabilities(&snapshot, &req).unwrap();
        assert_eq!(response.manually_fixable_cve_list, vec!["CVE-2018-0003"]);
    }

    #[test]
    fn test_arch_scoping_and_merge() {
        let snapshot = snapshot();
        let response = vulnerabilities(&snapshot, &request(&["openssl-1.0.2-1.el7.i686"])).unwrap();
        assert_eq!(response.cve_list, vec!["CVE-2018-0004"]);

        let response = vulnerabilities(
            &snapshot,
            &request(&["openssl-1.0.2-1.el7.i686", "openssl-1.0.2-1.el7.x86_64"]),
        )
        .unwrap();
        assert_eq!(response.cve_list.len(), 3);
        assert_eq!(
            response.manually_fixable_cve_list.len() + response.unpatched_cve_list.len(),
            response.cve_list.len()
        );
    }

    #[test]
    fn test_older_unknown_build_is_clean() {
        let snapshot = snapshot();
        let response =
            vulnerabilities(&snapshot, &request(&["openssl-1.0.1-9.el7.x86_64"])).unwrap();
        assert!(response.cve_list.is_empty());
        assert!(response.manually_fixable_cve_list.is_empty());
        assert!(response.unpatched_cve_list.is_empty());
    }

    #[test]
    fn test_malformed_package() {
        let snapshot = snapshot();
        assert!(matches!(
            vulnerabilities(&snapshot, &request(&["openssl"])),
            Err(Error::MalformedNevra(_))
        ));
    }
}
