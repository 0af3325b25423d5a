/*!
# relsnap Core Engine

Entity-aware snapshot and restore of a relational database.

This crate exports every registered entity of an application database to
per-entity files and replays them back into the live schema with:

- A single entity catalog driving both export and FK-safe restore order
- Pluggable format codecs (JSON, CSV, SQL INSERT scripts)
- Encryption of credential and token fields inside snapshot files
- Schema-drift tolerant restore (display-only and removed columns are dropped)
- A manifest with per-file checksums, written last as the completeness marker

## Architecture

The engine talks to the outside world through three narrow traits:
- [`RecordStore`]: the live relational database ([`SqliteStore`])
- [`BlobStore`]: where snapshot files live ([`LocalFileStorage`], [`MemoryStorage`])
- [`Encrypter`] / [`PasswordHasher`]: secret handling ([`AesGcmEncrypter`])

## Usage

```rust,no_run
use relsnap_core::{
    snapshot_prefix, AesGcmEncrypter, EncryptionKey, EntityCatalog, LocalFileStorage,
    Sha256PasswordHasher, SnapshotFormat, SnapshotRestorer, SnapshotWriter, SqliteStore,
};

let mut store = SqliteStore::open("database.sqlite")?;
let storage = LocalFileStorage::with_base_dir("storage");
let encrypter = AesGcmEncrypter::new(&EncryptionKey::parse("app key")?);
let catalog = EntityCatalog::standard();

// Back up every entity
let prefix = snapshot_prefix("backups", chrono::Utc::now());
SnapshotWriter::new(&store, &storage, &encrypter, &catalog)
    .write_all(&prefix, SnapshotFormat::Json)?;

// Restore them
let report = SnapshotRestorer::new(&mut store, &storage, &encrypter, &Sha256PasswordHasher, &catalog)
    .restore_all(&prefix)?;
println!("{} records restored", report.restored_records());
# Ok::<(), relsnap_core::SnapshotError>(())
```
*/

pub mod catalog;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod error;
pub mod inspect;
pub mod manifest;
pub mod observability;
pub mod protector;
pub mod record;
pub mod restore;
pub mod storage;
pub mod store;
pub mod writer;

pub use catalog::{EntityCatalog, EntityDef, SecretKind, STANDARD_ENTITIES};
pub use codec::{CsvCodec, FormatCodec, JsonCodec, SnapshotFormat, SqlCodec};
pub use config::SnapshotConfig;
pub use crypto::{
    AesGcmEncrypter, EncryptionKey, Encrypter, KeylessEncrypter, PasswordHasher, Sha256PasswordHasher,
};
pub use error::{Result, SnapshotError};
pub use inspect::{SnapshotInspector, SnapshotStatus, SnapshotSummary, VerifyReport};
pub use manifest::{Manifest, ManifestEntry};
pub use record::Record;
pub use restore::{RestoreOutcome, RestoreReport, SkipReason, SnapshotRestorer};
pub use storage::{BlobStore, LocalFileStorage, MemoryStorage};
pub use store::RecordStore;
#[cfg(feature = "sqlite")]
pub use store::SqliteStore;
pub use writer::{snapshot_prefix, SnapshotWriter};
