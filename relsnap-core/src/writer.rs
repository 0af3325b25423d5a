/*!
Snapshot writer: reads entities from the live store and writes snapshot files.
*/

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::catalog::{EntityCatalog, EntityDef};
use crate::codec::SnapshotFormat;
use crate::crypto::Encrypter;
use crate::manifest::{Manifest, ManifestEntry};
use crate::protector::SensitiveFieldProtector;
use crate::storage::{join_path, BlobStore};
use crate::store::RecordStore;
use crate::{Result, SnapshotError};

/// Directory name format of a snapshot taken at a given instant
pub const SNAPSHOT_DIR_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Storage prefix of a snapshot: `<root>/<YYYY-MM-DD_HH-mm-ss>`
pub fn snapshot_prefix(root: &str, taken_at: DateTime<Utc>) -> String {
    join_path(root, &taken_at.format(SNAPSHOT_DIR_FORMAT).to_string())
}

/// Writes entity snapshots
///
/// The writer orchestrates query, protection, encoding and storage for each
/// entity. It only reads from the record store.
///
/// # Example
/// ```rust,no_run
/// use relsnap_core::{
///     AesGcmEncrypter, EncryptionKey, EntityCatalog, LocalFileStorage, SnapshotFormat,
///     SnapshotWriter, SqliteStore,
/// };
///
/// let store = SqliteStore::open("app.sqlite")?;
/// let storage = LocalFileStorage::with_base_dir("storage");
/// let encrypter = AesGcmEncrypter::new(&EncryptionKey::parse("app key")?);
/// let catalog = EntityCatalog::standard();
///
/// let writer = SnapshotWriter::new(&store, &storage, &encrypter, &catalog);
/// let manifest = writer.write_all("backups/2024-03-09_14-05-00", SnapshotFormat::Json)?;
/// println!("{} records", manifest.total_records);
/// # Ok::<(), relsnap_core::SnapshotError>(())
/// ```
pub struct SnapshotWriter<'a, S, B>
where
    S: RecordStore,
    B: BlobStore,
{
    store: &'a S,
    blobs: &'a B,
    protector: SensitiveFieldProtector<'a>,
    catalog: &'a EntityCatalog,
}

impl<'a, S, B> SnapshotWriter<'a, S, B>
where
    S: RecordStore,
    B: BlobStore,
{
    pub fn new(
        store: &'a S,
        blobs: &'a B,
        encrypter: &'a dyn Encrypter,
        catalog: &'a EntityCatalog,
    ) -> Self {
        Self {
            store,
            blobs,
            protector: SensitiveFieldProtector::new(encrypter),
            catalog,
        }
    }

    /// Write one entity's snapshot file and record it in the manifest
    ///
    /// A directory without a manifest gets a new one flagged `partial`. An
    /// existing manifest of the same format gains (or replaces) the entry; one
    /// of another format is left as it is.
    ///
    /// # Arguments
    /// * `entity` - Catalog name of the entity
    /// * `prefix` - Snapshot directory the file is written under
    /// * `format` - Codec to encode with
    ///
    /// # Returns
    /// The number of records written
    ///
    /// # Errors
    /// * `SnapshotError::UnknownEntity` - If the entity is not in the catalog
    /// * `SnapshotError::Database` - If the entity query fails
    /// * `SnapshotError::Storage` - If the file cannot be written
    pub fn write(&self, entity: &str, prefix: &str, format: SnapshotFormat) -> Result<usize> {
        let def = self.catalog.require(entity)?;
        let written = self.write_entity(def, prefix, format)?;
        let records = written.records as usize;

        let manifest = match Manifest::read(self.blobs, prefix)? {
            Some(existing) if existing.format == format => existing.with_entry(written),
            Some(existing) => {
                warn!(
                    prefix,
                    manifest_format = %existing.format,
                    format = %format,
                    "manifest left unchanged, the snapshot already holds another format"
                );
                return Ok(records);
            }
            None => Manifest::new(prefix, format, Utc::now(), vec![written]).into_partial(),
        };
        manifest.write(self.blobs)?;
        Ok(records)
    }

    /// Like [`SnapshotWriter::write`], but takes the format by name
    ///
    /// An unknown format is rejected with `SnapshotError::UnsupportedFormat`
    /// before the store or storage is touched.
    pub fn write_named(&self, entity: &str, prefix: &str, format: &str) -> Result<usize> {
        let format: SnapshotFormat = format.parse()?;
        self.write(entity, prefix, format)
    }

    /// Write every catalog entity, then the manifest
    ///
    /// The first failure aborts the run. Because the manifest is written last,
    /// an aborted run leaves a snapshot without one, which readers treat as
    /// incomplete.
    pub fn write_all(&self, prefix: &str, format: SnapshotFormat) -> Result<Manifest> {
        let started_at = Utc::now();
        info!(prefix, format = %format, entities = self.catalog.len(), "starting full backup");

        let mut files = Vec::with_capacity(self.catalog.len());
        for def in self.catalog.iter() {
            files.push(self.write_entity(def, prefix, format)?);
        }

        let manifest = Manifest::new(prefix, format, started_at, files);
        manifest.write(self.blobs)?;
        info!(
            prefix,
            total_records = manifest.total_records,
            "backup complete, manifest written"
        );
        Ok(manifest)
    }

    fn write_entity(
        &self,
        def: &EntityDef,
        prefix: &str,
        format: SnapshotFormat,
    ) -> Result<ManifestEntry> {
        let mut records = self.store.query(&def.query)?;
        self.protector.protect_all(def, &mut records)?;

        let payload = format.codec().encode(def.name, &records)?;
        let file = format.file_name(def.name);
        let path = join_path(prefix, &file);

        self.blobs.write(&path, &payload).map_err(|e| match e {
            SnapshotError::Storage(msg) => SnapshotError::storage(format!(
                "Failed to write {} snapshot: {msg}",
                def.name
            )),
            other => other,
        })?;

        debug!(entity = def.name, path = %path, bytes = payload.len(), "snapshot file written");
        info!(entity = def.name, records = records.len(), "✓ backed up");

        Ok(ManifestEntry {
            entity: def.name.to_string(),
            file,
            records: records.len() as u64,
            sha256: Manifest::compute_hash(&payload),
            primary: def.primary,
        })
    }
}
