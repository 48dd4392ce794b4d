// src/cache/builder.rs

//! Snapshot construction
//!
//! Resolves the flat records of a [`RawDataset`] into a [`Snapshot`] and
//! builds every index once. The build either yields a complete, consistent
//! snapshot or fails with [`Error::InvalidDataset`]; it never touches a
//! snapshot that has already been published.

use super::models::{
    ContentSetRecord, CveRecord, DbChange, ErratumRecord, PackageRecord, RawDataset,
    RepositoryRecord,
};
use super::snapshot::{
    ContentSet, Cve, Erratum, PackageBuild, PackageId, Repository, Snapshot,
};
use crate::error::{Error, Result};
use crate::version::Nevra;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;
use tracing::{debug, info};

/// Collects raw records and turns them into a [`Snapshot`]
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    dataset: RawDataset,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_dataset(dataset: RawDataset) -> Self {
        Self { dataset }
    }

    pub fn content_set(mut self, record: ContentSetRecord) -> Self {
        self.dataset.content_sets.push(record);
        self
    }

    pub fn repository(mut self, record: RepositoryRecord) -> Self {
        self.dataset.repositories.push(record);
        self
    }

    pub fn package(mut self, record: PackageRecord) -> Self {
        self.dataset.packages.push(record);
        self
    }

    pub fn cve(mut self, record: CveRecord) -> Self {
        self.dataset.cves.push(record);
        self
    }

    pub fn erratum(mut self, record: ErratumRecord) -> Self {
        self.dataset.errata.push(record);
        self
    }

    pub fn changes(mut self, changes: DbChange) -> Self {
        self.dataset.changes = changes;
        self
    }

    /// Resolve all references and build the indices
    pub fn build(self) -> Result<Snapshot> {
        let started = Instant::now();
        let RawDataset {
            content_sets,
            repositories,
            packages,
            cves,
            errata,
            changes,
        } = self.dataset;

        debug!(
            "Building snapshot from {} packages, {} repositories, {} CVEs, {} errata",
            packages.len(),
            repositories.len(),
            cves.len(),
            errata.len()
        );

        let mut snapshot = Snapshot {
            changes,
            ..Snapshot::default()
        };

        add_content_sets(&mut snapshot, content_sets)?;
        add_repositories(&mut snapshot, repositories)?;
        add_packages(&mut snapshot, packages)?;
        index_packages(&mut snapshot)?;
        add_cves(&mut snapshot, cves)?;
        add_errata(&mut snapshot, errata)?;
        finalize_links(&mut snapshot);

        let stats = snapshot.stats();
        info!(
            "Snapshot built in {:?}: {} packages ({} names), {} CVEs, {} errata",
            started.elapsed(),
            stats.packages,
            stats.package_names,
            stats.cves,
            stats.errata
        );
        debug!(
            "Snapshot spans {} repositories in {} content sets",
            stats.repositories, stats.content_sets
        );

        Ok(snapshot)
    }
}

fn add_content_sets(snapshot: &mut Snapshot, records: Vec<ContentSetRecord>) -> Result<()> {
    for record in records {
        if snapshot.content_sets.contains_key(&record.label) {
            return Err(Error::InvalidDataset(format!(
                "duplicate content set '{}'",
                record.label
            )));
        }
        snapshot.content_sets.insert(
            record.label.clone(),
            ContentSet {
                label: record.label,
                name: record.name,
                product: record.product,
                repositories: Vec::new(),
            },
        );
    }
    Ok(())
}

fn add_repositories(snapshot: &mut Snapshot, records: Vec<RepositoryRecord>) -> Result<()> {
    for record in records {
        if snapshot.repository_index.contains_key(&record.id) {
            return Err(Error::InvalidDataset(format!(
                "duplicate repository '{}'",
                record.id
            )));
        }

        let repo_id = snapshot.repositories.len();
        let content_set = snapshot
            .content_sets
            .get_mut(&record.content_set)
            .ok_or_else(|| {
                Error::InvalidDataset(format!(
                    "repository '{}' references unknown content set '{}'",
                    record.id, record.content_set
                ))
            })?;
        content_set.repositories.push(repo_id);

        snapshot.repository_index.insert(record.id.clone(), repo_id);
        snapshot.repositories.push(Repository {
            id: record.id,
            content_set: record.content_set,
            basearch: record.basearch,
            releasever: record.releasever,
            url: record.url,
            revision: record.revision,
            last_change: record.last_change,
            third_party: record.third_party,
        });
    }
    Ok(())
}

fn add_packages(snapshot: &mut Snapshot, records: Vec<PackageRecord>) -> Result<()> {
    snapshot.packages.reserve(records.len());

    for record in records {
        if record.name.is_empty() || record.version.is_empty() || record.arch.is_empty() {
            return Err(Error::InvalidDataset(format!(
                "package record '{}-{}-{}.{}' is incomplete",
                record.name, record.version, record.release, record.arch
            )));
        }

        let nevra = Nevra::new(
            record.name,
            record.epoch,
            record.version,
            record.release,
            record.arch,
        );

        let repositories = record
            .repositories
            .iter()
            .map(|repo| {
                snapshot.repository_index.get(repo).copied().ok_or_else(|| {
                    Error::InvalidDataset(format!(
                        "package '{}' references unknown repository '{}'",
                        nevra, repo
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let id = snapshot.packages.len();
        snapshot
            .by_name_arch
            .entry(nevra.name().to_string())
            .or_default()
            .entry(nevra.arch().to_string())
            .or_default()
            .push(id);

        snapshot.packages.push(PackageBuild {
            nevra,
            summary: record.summary,
            description: record.description,
            source_package: record.source_package,
            first_published: record.first_published,
            repositories,
            errata: Vec::new(),
            cves: Vec::new(),
        });
    }
    Ok(())
}

/// Sort the per-name indices by EVR and reject duplicate builds
fn index_packages(snapshot: &mut Snapshot) -> Result<()> {
    let packages = &snapshot.packages;

    snapshot
        .by_name_arch
        .par_iter_mut()
        .try_for_each(|(_, arches)| -> Result<()> {
            for ids in arches.values_mut() {
                ids.sort_by(|&a, &b| packages[a].nevra.evr().cmp(packages[b].nevra.evr()));
                if let Some(pair) = ids
                    .windows(2)
                    .find(|pair| packages[pair[0]].nevra.evr() == packages[pair[1]].nevra.evr())
                {
                    return Err(Error::InvalidDataset(format!(
                        "duplicate package build '{}' (also listed as '{}')",
                        packages[pair[1]].nevra, packages[pair[0]].nevra
                    )));
                }
            }
            Ok(())
        })?;

    snapshot.by_name = snapshot
        .by_name_arch
        .par_iter()
        .map(|(name, arches)| {
            let mut ids: Vec<PackageId> = arches.values().flatten().copied().collect();
            ids.sort_by(|&a, &b| {
                let (a, b) = (&packages[a].nevra, &packages[b].nevra);
                a.evr().cmp(b.evr()).then_with(|| a.arch().cmp(b.arch()))
            });
            (name.clone(), ids)
        })
        .collect::<HashMap<_, _>>();

    Ok(())
}

fn resolve_package(snapshot: &Snapshot, nevra: &str, referenced_by: &str) -> Result<PackageId> {
    let parsed = Nevra::parse(nevra).map_err(|_| {
        Error::InvalidDataset(format!(
            "{} references malformed package '{}'",
            referenced_by, nevra
        ))
    })?;
    snapshot.find_build(&parsed).ok_or_else(|| {
        Error::InvalidDataset(format!(
            "{} references unknown package '{}'",
            referenced_by, nevra
        ))
    })
}

fn add_cves(snapshot: &mut Snapshot, records: Vec<CveRecord>) -> Result<()> {
    let mut cves = BTreeMap::new();

    for record in records {
        if cves.contains_key(&record.id) {
            return Err(Error::InvalidDataset(format!("duplicate CVE '{}'", record.id)));
        }

        let mut affected = record
            .affected_packages
            .iter()
            .map(|nevra| resolve_package(snapshot, nevra, &record.id))
            .collect::<Result<Vec<_>>>()?;
        affected.sort_unstable();
        affected.dedup();

        for &id in &affected {
            snapshot.packages[id].cves.push(record.id.clone());
        }

        cves.insert(
            record.id.clone(),
            Cve {
                id: record.id,
                description: record.description,
                impact: record.impact,
                cvss3_score: record.cvss3_score,
                cwe_list: record.cwe_list,
                public_date: record.public_date,
                modified_date: record.modified_date,
                redhat_url: record.redhat_url,
                secondary_url: record.secondary_url,
                affected_packages: affected,
                errata: Vec::new(),
            },
        );
    }

    snapshot.cves = cves;
    Ok(())
}

fn add_errata(snapshot: &mut Snapshot, records: Vec<ErratumRecord>) -> Result<()> {
    let mut errata = BTreeMap::new();

    for record in records {
        if errata.contains_key(&record.id) {
            return Err(Error::InvalidDataset(format!(
                "duplicate erratum '{}'",
                record.id
            )));
        }

        let mut packages = record
            .package_list
            .iter()
            .map(|nevra| resolve_package(snapshot, nevra, &record.id))
            .collect::<Result<Vec<_>>>()?;
        packages.sort_unstable();
        packages.dedup();

        let mut cves = record.cve_list;
        cves.sort();
        cves.dedup();
        for cve_id in &cves {
            let cve = snapshot.cves.get_mut(cve_id).ok_or_else(|| {
                Error::InvalidDataset(format!(
                    "erratum '{}' references unknown CVE '{}'",
                    record.id, cve_id
                ))
            })?;
            cve.errata.push(record.id.clone());
        }

        for &id in &packages {
            snapshot.packages[id].errata.push(record.id.clone());
        }

        errata.insert(
            record.id.clone(),
            Erratum {
                id: record.id,
                synopsis: record.synopsis,
                summary: record.summary,
                description: record.description,
                severity: record.severity,
                errata_type: record.errata_type,
                issued: record.issued,
                updated: record.updated,
                solution: record.solution,
                url: record.url,
                references: record.references,
                cves,
                packages,
                modules: record.modules,
            },
        );
    }

    snapshot.errata = errata;
    Ok(())
}

/// Sort and deduplicate the back-references collected while resolving
fn finalize_links(snapshot: &mut Snapshot) {
    snapshot.packages.par_iter_mut().for_each(|package| {
        package.repositories.sort_unstable();
        package.repositories.dedup();
        package.errata.sort();
        package.errata.dedup();
        package.cves.sort();
        package.cves.dedup();
    });

    for cve in snapshot.cves.values_mut() {
        cve.errata.sort();
        cve.errata.dedup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::models::{ErratumType, ModuleStream};

    fn content_set(label: &str) -> ContentSetRecord {
        ContentSetRecord {
            label: label.to_string(),
            name: format!("{} name", label),
            product: None,
        }
    }

    fn repository(id: &str, content_set: &str) -> RepositoryRecord {
        RepositoryRecord {
            id: id.to_string(),
            content_set: content_set.to_string(),
            basearch: Some("x86_64".to_string()),
            releasever: Some("8".to_string()),
            url: None,
            revision: None,
            last_change: None,
            third_party: false,
        }
    }

    fn package_in(repo: &str, version: &str) -> PackageRecord {
        let mut record = PackageRecord::new("bash", "", version, "1.el8", "x86_64");
        record.repositories.push(repo.to_string());
        record
    }

    #[test]
    fn test_build_links_everything() {
        let mut cve = CveRecord::new("CVE-2020-0001");
        cve.affected_packages.push("bash-1.0-1.el8.x86_64".to_string());

        let mut erratum = ErratumRecord::new("RHSA-2020:0001", ErratumType::Security);
        erratum.cve_list.push("CVE-2020-0001".to_string());
        erratum.package_list.push("bash-1.1-1.el8.x86_64".to_string());
        erratum.modules.push(ModuleStream::new("bash", "1"));

        let snapshot = SnapshotBuilder::new()
            .content_set(content_set("rhel-8-baseos"))
            .repository(repository("baseos-8-x86_64", "rhel-8-baseos"))
            .package(package_in("baseos-8-x86_64", "1.0"))
            .package(package_in("baseos-8-x86_64", "1.1"))
            .cve(cve)
            .erratum(erratum)
            .build()
            .unwrap();

        let old = Nevra::parse("bash-1.0-1.el8.x86_64").unwrap();
        let new = Nevra::parse("bash-1.1-1.el8.x86_64").unwrap();
        let old = snapshot.package(snapshot.find_build(&old).unwrap());
        let new = snapshot.package(snapshot.find_build(&new).unwrap());

        assert_eq!(old.cves, vec!["CVE-2020-0001"]);
        assert!(old.errata.is_empty());
        assert_eq!(new.errata, vec!["RHSA-2020:0001"]);
        assert_eq!(
            snapshot.cve("CVE-2020-0001").unwrap().errata,
            vec!["RHSA-2020:0001"]
        );
        assert_eq!(
            snapshot.content_set("rhel-8-baseos").unwrap().repositories,
            vec![0]
        );
        assert!(snapshot.erratum("RHSA-2020:0001").unwrap().is_security());
    }

    #[test]
    fn test_duplicate_build_rejected() {
        let result = SnapshotBuilder::new()
            .package(PackageRecord::new("bash", "", "1.0", "1", "x86_64"))
            .package(PackageRecord::new("bash", "0", "1.00", "1", "x86_64"))
            .build();
        assert!(matches!(result, Err(Error::InvalidDataset(_))));
    }

    #[test]
    fn test_same_evr_different_arch_is_fine() {
        let snapshot = SnapshotBuilder::new()
            .package(PackageRecord::new("bash", "", "1.0", "1", "x86_64"))
            .package(PackageRecord::new("bash", "", "1.0", "1", "i686"))
            .build()
            .unwrap();
        assert_eq!(snapshot.builds_of("bash").len(), 2);
    }

    #[test]
    fn test_dangling_references_rejected() {
        let unknown_repo = SnapshotBuilder::new()
            .package(package_in("missing-repo", "1.0"))
            .build();
        assert!(matches!(unknown_repo, Err(Error::InvalidDataset(_))));

        let unknown_content_set = SnapshotBuilder::new()
            .repository(repository("baseos", "missing-cs"))
            .build();
        assert!(matches!(unknown_content_set, Err(Error::InvalidDataset(_))));

        let mut cve = CveRecord::new("CVE-2020-0002");
        cve.affected_packages.push("zsh-1.0-1.x86_64".to_string());
        let unknown_package = SnapshotBuilder::new().cve(cve).build();
        assert!(matches!(unknown_package, Err(Error::InvalidDataset(_))));

        let mut erratum = ErratumRecord::new("RHSA-2020:0002", ErratumType::Security);
        erratum.cve_list.push("CVE-1999-0001".to_string());
        let unknown_cve = SnapshotBuilder::new().erratum(erratum).build();
        assert!(matches!(unknown_cve, Err(Error::InvalidDataset(_))));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let result = SnapshotBuilder::new()
            .cve(CveRecord::new("CVE-2020-0001"))
            .cve(CveRecord::new("CVE-2020-0001"))
            .build();
        assert!(matches!(result, Err(Error::InvalidDataset(_))));

        let result = SnapshotBuilder::new()
            .content_set(content_set("rhel-8-baseos"))
            .content_set(content_set("rhel-8-baseos"))
            .build();
        assert!(matches!(result, Err(Error::InvalidDataset(_))));
    }
}
