/*!
Snapshot manifest: the summary written at the end of a backup run.

The manifest is written after every entity file, so its presence marks a
snapshot as finished. A full run writes it once and never touches it again. A
single-entity run writes a manifest flagged `partial`, and further
single-entity runs into the same directory add their entries to it.
*/

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::codec::SnapshotFormat;
use crate::storage::{join_path, BlobStore};
use crate::{Result, SnapshotError};

/// Current manifest format version for compatibility tracking
pub const MANIFEST_FORMAT_VERSION: u8 = 1;

/// File name of the manifest inside a snapshot directory
pub const MANIFEST_FILE: &str = "manifest";

/// One entity file recorded in the manifest
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ManifestEntry {
    pub entity: String,
    /// File name relative to the snapshot directory
    pub file: String,
    pub records: u64,
    /// SHA-256 of the file contents, hex encoded
    pub sha256: String,
    /// Whether the entity counts toward `total_records`
    pub primary: bool,
}

/// Summary of one full snapshot run
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Manifest {
    /// Format version for compatibility (current: 1)
    pub format_version: u8,

    /// Unique identifier for this snapshot
    pub snapshot_id: String,

    /// When the backup run started
    pub created_at: DateTime<Utc>,

    /// Storage prefix of the snapshot directory
    pub path: String,

    /// Codec used for every entity file
    pub format: SnapshotFormat,

    /// Entity names included, in the order they were written
    pub entities: Vec<String>,

    /// Record count summed over the primary entities
    pub total_records: u64,

    pub files: Vec<ManifestEntry>,

    /// Set when the snapshot holds only the entities backed up one at a time
    #[serde(default)]
    pub partial: bool,
}

impl Manifest {
    /// Build a manifest from the files written by one run
    pub fn new<S: Into<String>>(
        path: S,
        format: SnapshotFormat,
        created_at: DateTime<Utc>,
        files: Vec<ManifestEntry>,
    ) -> Self {
        let total_records = files
            .iter()
            .filter(|entry| entry.primary)
            .map(|entry| entry.records)
            .sum();

        Self {
            format_version: MANIFEST_FORMAT_VERSION,
            snapshot_id: Uuid::new_v4().to_string(),
            created_at,
            path: path.into(),
            format,
            entities: files.iter().map(|entry| entry.entity.clone()).collect(),
            total_records,
            files,
            partial: false,
        }
    }

    /// Flag the manifest as covering a single-entity run
    pub fn into_partial(mut self) -> Self {
        self.partial = true;
        self
    }

    /// Add an entity file, replacing any earlier entry for the same entity
    pub fn with_entry(mut self, entry: ManifestEntry) -> Self {
        match self.files.iter_mut().find(|file| file.entity == entry.entity) {
            Some(existing) => *existing = entry,
            None => self.files.push(entry),
        }
        self.entities = self.files.iter().map(|file| file.entity.clone()).collect();
        self.total_records = self
            .files
            .iter()
            .filter(|file| file.primary)
            .map(|file| file.records)
            .sum();
        self
    }

    /// Fail unless the snapshot's files can be read back by the restorer
    ///
    /// Only structured (JSON) snapshots are restorable.
    pub fn ensure_restorable(&self) -> Result<()> {
        if self.format == SnapshotFormat::Json {
            return Ok(());
        }
        Err(SnapshotError::UnsupportedFormat(format!(
            "{} is a {} snapshot, only json snapshots can be restored",
            self.path, self.format
        )))
    }

    /// Storage path of the manifest for a snapshot prefix
    pub fn location(prefix: &str) -> String {
        join_path(prefix, MANIFEST_FILE)
    }

    /// Compute SHA-256 hash of the provided data
    ///
    /// # Returns
    /// Hexadecimal string representation of the SHA-256 hash
    pub fn compute_hash(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        format!("{:x}", hasher.finalize())
    }

    pub fn entry(&self, entity: &str) -> Option<&ManifestEntry> {
        self.files.iter().find(|entry| entry.entity == entity)
    }

    /// Validate that all required fields are properly set
    pub fn validate(&self) -> Result<()> {
        if self.snapshot_id.is_empty() {
            return Err(SnapshotError::validation("snapshot_id cannot be empty"));
        }
        if self.path.is_empty() {
            return Err(SnapshotError::validation("path cannot be empty"));
        }
        if let Some(entry) = self.files.iter().find(|entry| entry.sha256.is_empty()) {
            return Err(SnapshotError::validation(format!(
                "file entry for '{}' has no checksum",
                entry.entity
            )));
        }
        Ok(())
    }

    /// Check if this manifest is compatible with the current format version
    pub fn is_compatible(&self) -> bool {
        self.format_version <= MANIFEST_FORMAT_VERSION
    }

    /// Serialize and store the manifest under `self.path`
    pub fn write(&self, blobs: &impl BlobStore) -> Result<()> {
        self.validate()?;
        let payload = serde_json::to_vec_pretty(self)?;
        blobs.write(&Self::location(&self.path), &payload)
    }

    /// Load the manifest of a snapshot, `None` if the snapshot has none
    pub fn read(blobs: &impl BlobStore, prefix: &str) -> Result<Option<Self>> {
        let location = Self::location(prefix);
        if !blobs.exists(&location) {
            return Ok(None);
        }

        let manifest: Manifest = serde_json::from_slice(&blobs.read(&location)?)?;
        if !manifest.is_compatible() {
            return Err(SnapshotError::invalid_format(format!(
                "Incompatible manifest format version: {} (current: {})",
                manifest.format_version, MANIFEST_FORMAT_VERSION
            )));
        }
        Ok(Some(manifest))
    }
}
