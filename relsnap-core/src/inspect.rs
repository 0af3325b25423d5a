/*!
Read-only inspection of stored snapshots: listing and checksum verification.
*/

use std::fmt;

use tracing::{debug, warn};

use crate::manifest::Manifest;
use crate::storage::{join_path, BlobStore};
use crate::{Result, SnapshotError};

/// One snapshot directory found under the storage root
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotSummary {
    /// Directory name, the snapshot timestamp
    pub name: String,
    pub prefix: String,
    /// `None` when the backup run never finished
    pub manifest: Option<Manifest>,
}

/// How much of the catalog a snapshot directory holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotStatus {
    /// A full backup run finished and wrote its manifest
    Complete,
    /// Single-entity backups, recorded in a partial manifest
    Partial,
    /// No manifest: the run was interrupted
    Incomplete,
}

impl fmt::Display for SnapshotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotStatus::Complete => write!(f, "complete"),
            SnapshotStatus::Partial => write!(f, "partial"),
            SnapshotStatus::Incomplete => write!(f, "incomplete"),
        }
    }
}

impl SnapshotSummary {
    pub fn status(&self) -> SnapshotStatus {
        match &self.manifest {
            Some(manifest) if manifest.partial => SnapshotStatus::Partial,
            Some(_) => SnapshotStatus::Complete,
            None => SnapshotStatus::Incomplete,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status() == SnapshotStatus::Complete
    }
}

/// State of one entity file against its manifest entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    Intact,
    Missing,
    Mismatch { expected: String, actual: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCheck {
    pub entity: String,
    pub path: String,
    pub records: u64,
    pub status: FileStatus,
}

/// Checksum results for every file a manifest lists
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    pub prefix: String,
    pub checks: Vec<FileCheck>,
}

impl VerifyReport {
    pub fn is_intact(&self) -> bool {
        self.checks
            .iter()
            .all(|check| check.status == FileStatus::Intact)
    }

    /// Convert the first failed check into an error
    pub fn into_result(self) -> Result<Self> {
        let failure = self.checks.iter().find_map(|check| match &check.status {
            FileStatus::Intact => None,
            FileStatus::Missing => Some(SnapshotError::NotFound {
                entity: check.entity.clone(),
                path: check.path.clone(),
            }),
            FileStatus::Mismatch { expected, actual } => {
                Some(SnapshotError::IntegrityCheckFailed {
                    path: check.path.clone(),
                    expected: expected.clone(),
                    actual: actual.clone(),
                })
            }
        });

        match failure {
            Some(e) => Err(e),
            None => Ok(self),
        }
    }
}

/// Lists and verifies snapshots held in a blob store
pub struct SnapshotInspector<'a, B: BlobStore> {
    blobs: &'a B,
}

impl<'a, B: BlobStore> SnapshotInspector<'a, B> {
    pub fn new(blobs: &'a B) -> Self {
        Self { blobs }
    }

    /// Snapshot directories under `root`, oldest first
    ///
    /// A directory whose manifest cannot be parsed is reported as incomplete.
    pub fn list(&self, root: &str) -> Result<Vec<SnapshotSummary>> {
        let mut snapshots = Vec::new();
        for name in self.blobs.list_dirs(root)? {
            let prefix = join_path(root, &name);
            let manifest = match Manifest::read(self.blobs, &prefix) {
                Ok(manifest) => manifest,
                Err(e) => {
                    warn!(prefix = %prefix, error = %e, "unreadable manifest");
                    None
                }
            };
            snapshots.push(SnapshotSummary {
                name,
                prefix,
                manifest,
            });
        }
        Ok(snapshots)
    }

    /// Most recent complete snapshot under `root`, ignoring partial ones
    pub fn latest_complete(&self, root: &str) -> Result<Option<SnapshotSummary>> {
        Ok(self
            .list(root)?
            .into_iter()
            .rev()
            .find(SnapshotSummary::is_complete))
    }

    /// Recompute the checksum of every file the manifest lists
    ///
    /// # Errors
    /// * `SnapshotError::Validation` - If the snapshot has no manifest
    /// * `SnapshotError::InvalidFormat` - If the manifest is from a newer version
    pub fn verify(&self, prefix: &str) -> Result<VerifyReport> {
        let manifest = Manifest::read(self.blobs, prefix)?.ok_or_else(|| {
            SnapshotError::validation(format!("{prefix} has no manifest, the snapshot is incomplete"))
        })?;

        let mut checks = Vec::with_capacity(manifest.files.len());
        for entry in &manifest.files {
            let path = join_path(prefix, &entry.file);
            let status = if !self.blobs.exists(&path) {
                FileStatus::Missing
            } else {
                let actual = Manifest::compute_hash(&self.blobs.read(&path)?);
                if actual == entry.sha256 {
                    FileStatus::Intact
                } else {
                    FileStatus::Mismatch {
                        expected: entry.sha256.clone(),
                        actual,
                    }
                }
            };

            debug!(entity = %entry.entity, path = %path, status = ?status, "checked");
            checks.push(FileCheck {
                entity: entry.entity.clone(),
                path,
                records: entry.records,
                status,
            });
        }

        Ok(VerifyReport {
            prefix: prefix.to_string(),
            checks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::SnapshotFormat;
    use crate::manifest::ManifestEntry;
    use crate::storage::MemoryStorage;
    use chrono::Utc;

    fn store_snapshot(storage: &MemoryStorage, prefix: &str, with_manifest: bool) -> Option<Manifest> {
        let payload = br#"[{"id":1,"name":"rust"}]"#;
        storage.write(&join_path(prefix, "tags.json"), payload).unwrap();

        if with_manifest {
            let entry = ManifestEntry {
                entity: "tags".to_string(),
                file: "tags.json".to_string(),
                records: 1,
                sha256: Manifest::compute_hash(payload),
                primary: false,
            };
            let manifest = Manifest::new(prefix, SnapshotFormat::Json, Utc::now(), vec![entry]);
            manifest.write(storage).unwrap();
            return Some(manifest);
        }
        None
    }

    #[test]
    fn test_list_marks_incomplete_snapshots() {
        let storage = MemoryStorage::new();
        store_snapshot(&storage, "backups/2024-03-09_14-05-00", true);
        store_snapshot(&storage, "backups/2024-03-10_09-00-00", false);

        let inspector = SnapshotInspector::new(&storage);
        let snapshots = inspector.list("backups").unwrap();

        assert_eq!(snapshots.len(), 2);
        assert!(snapshots[0].is_complete());
        assert!(!snapshots[1].is_complete());

        let latest = inspector.latest_complete("backups").unwrap().unwrap();
        assert_eq!(latest.name, "2024-03-09_14-05-00");
    }

    #[test]
    fn test_partial_snapshots_are_labelled_and_not_latest() {
        let storage = MemoryStorage::new();
        store_snapshot(&storage, "backups/2024-03-09_14-05-00", true);
        let partial = store_snapshot(&storage, "backups/2024-03-10_09-00-00", true).unwrap();
        partial.into_partial().write(&storage).unwrap();
        store_snapshot(&storage, "backups/2024-03-11_09-00-00", false);

        let inspector = SnapshotInspector::new(&storage);
        let statuses: Vec<SnapshotStatus> = inspector
            .list("backups")
            .unwrap()
            .iter()
            .map(SnapshotSummary::status)
            .collect();
        assert_eq!(
            statuses,
            vec![
                SnapshotStatus::Complete,
                SnapshotStatus::Partial,
                SnapshotStatus::Incomplete
            ]
        );
        assert_eq!(SnapshotStatus::Partial.to_string(), "partial");

        let latest = inspector.latest_complete("backups").unwrap().unwrap();
        assert_eq!(latest.name, "2024-03-09_14-05-00");
    }

    #[test]
    fn test_verify_intact_snapshot() {
        let storage = MemoryStorage::new();
        store_snapshot(&storage, "backups/a", true);

        let report = SnapshotInspector::new(&storage).verify("backups/a").unwrap();
        assert!(report.is_intact());
        assert_eq!(report.checks[0].records, 1);
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn test_verify_detects_tampering() {
        let storage = MemoryStorage::new();
        store_snapshot(&storage, "backups/a", true);
        storage.write("backups/a/tags.json", b"[]").unwrap();

        let report = SnapshotInspector::new(&storage).verify("backups/a").unwrap();
        assert!(!report.is_intact());
        assert!(matches!(
            report.into_result(),
            Err(SnapshotError::IntegrityCheckFailed { .. })
        ));
    }

    #[test]
    fn test_verify_detects_missing_file() {
        let storage = MemoryStorage::new();
        store_snapshot(&storage, "backups/a", true);
        storage.delete("backups/a/tags.json").unwrap();

        let report = SnapshotInspector::new(&storage).verify("backups/a").unwrap();
        assert_eq!(report.checks[0].status, FileStatus::Missing);
        assert!(matches!(
            report.into_result(),
            Err(SnapshotError::NotFound { .. })
        ));
    }

    #[test]
    fn test_verify_requires_manifest() {
        let storage = MemoryStorage::new();
        store_snapshot(&storage, "backups/a", false);

        let err = SnapshotInspector::new(&storage).verify("backups/a").unwrap_err();
        assert!(matches!(err, SnapshotError::Validation(_)));
    }
}
