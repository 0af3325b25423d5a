/*!
Snapshot restorer: replays snapshot files into the live store.

Restoring an entity replaces its table contents. Each call runs in a single
store transaction, so a failure part-way leaves the table as it was:

1. read and decode `<prefix>/<entity>.json`
2. strip display-only join fields, then drop fields the live table lacks
3. apply the entity policy (transient skip, secret recovery)
4. truncate the table and insert every record, then commit

[`SnapshotRestorer::restore_all`] prepares every entity before touching the
store, truncates children before parents and inserts parents before children.
*/

pub mod policy;
pub mod reconcile;

use std::fmt;

use tracing::{debug, info, warn};

use crate::catalog::{EntityCatalog, EntityDef};
use crate::codec::{FormatCodec, JsonCodec, SnapshotFormat};
use crate::crypto::{Encrypter, PasswordHasher};
use crate::manifest::Manifest;
use crate::storage::{join_path, BlobStore};
use crate::store::RecordStore;
use crate::{Record, Result, SnapshotError};

pub use policy::{RestorePolicy, SecretRecovery, SkipReason, RESET_REQUIRED_PASSWORD};

/// Result of restoring one entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// Number of records inserted
    Restored(usize),
    Skipped(SkipReason),
}

impl fmt::Display for RestoreOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestoreOutcome::Restored(count) => write!(f, "restored {count} records"),
            RestoreOutcome::Skipped(reason) => write!(f, "skipped ({reason})"),
        }
    }
}

/// Per-entity outcomes of a restore-all run, in restore order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub entries: Vec<(String, RestoreOutcome)>,
}

impl RestoreReport {
    pub fn outcome(&self, entity: &str) -> Option<&RestoreOutcome> {
        self.entries
            .iter()
            .find(|(name, _)| name == entity)
            .map(|(_, outcome)| outcome)
    }

    /// Records inserted across every restored entity
    pub fn restored_records(&self) -> usize {
        self.entries
            .iter()
            .map(|(_, outcome)| match outcome {
                RestoreOutcome::Restored(count) => *count,
                RestoreOutcome::Skipped(_) => 0,
            })
            .sum()
    }

    pub fn skipped(&self) -> impl Iterator<Item = (&str, &SkipReason)> {
        self.entries.iter().filter_map(|(name, outcome)| match outcome {
            RestoreOutcome::Skipped(reason) => Some((name.as_str(), reason)),
            RestoreOutcome::Restored(_) => None,
        })
    }
}

/// Records ready to insert for one entity
struct PreparedEntity<'c> {
    def: &'c EntityDef,
    records: Vec<Record>,
}

/// Restores entity snapshots into the live store
pub struct SnapshotRestorer<'a, S, B>
where
    S: RecordStore,
    B: BlobStore,
{
    store: &'a mut S,
    blobs: &'a B,
    policy: RestorePolicy<'a>,
    catalog: &'a EntityCatalog,
    codec: JsonCodec,
}

impl<'a, S, B> SnapshotRestorer<'a, S, B>
where
    S: RecordStore,
    B: BlobStore,
{
    pub fn new(
        store: &'a mut S,
        blobs: &'a B,
        encrypter: &'a dyn Encrypter,
        hasher: &'a dyn PasswordHasher,
        catalog: &'a EntityCatalog,
    ) -> Self {
        Self {
            store,
            blobs,
            policy: RestorePolicy::new(encrypter, hasher),
            catalog,
            codec: JsonCodec,
        }
    }

    /// Restore one entity from a snapshot directory
    ///
    /// Transient entities are skipped whether or not a file exists.
    ///
    /// # Errors
    /// * `SnapshotError::UnknownEntity` - If the entity is not in the catalog
    /// * `SnapshotError::UnsupportedFormat` - If the manifest records a format
    ///   other than JSON
    /// * `SnapshotError::NotFound` - If the snapshot has no file for the entity
    /// * `SnapshotError::Database` - If the live table is missing or an insert
    ///   is rejected; the table keeps its previous contents
    pub fn restore(&mut self, entity: &str, prefix: &str) -> Result<RestoreOutcome> {
        let catalog = self.catalog;
        let def = catalog.require(entity)?;
        self.ensure_restorable(prefix)?;

        if let Some(reason) = self.policy.skip_reason(def) {
            info!(entity = def.name, "skipping {reason}");
            return Ok(RestoreOutcome::Skipped(reason));
        }

        let path = snapshot_file(prefix, def);
        if !self.blobs.exists(&path) {
            return Err(SnapshotError::NotFound {
                entity: def.name.to_string(),
                path,
            });
        }

        let prepared = self.prepare(def, &path)?;
        let restored = self.in_transaction(|store| {
            store.truncate(prepared.def.table())?;
            insert_records(store, &prepared)
        })?;

        info!(entity = def.name, records = restored, "✓ restored");
        Ok(RestoreOutcome::Restored(restored))
    }

    /// Restore every catalog entity in dependency order
    ///
    /// Entities without a snapshot file are reported as skipped. Any other
    /// failure rolls back the whole run. A snapshot whose manifest records a
    /// non-JSON format is rejected before the store is touched.
    pub fn restore_all(&mut self, prefix: &str) -> Result<RestoreReport> {
        self.ensure_restorable(prefix)?;
        let catalog = self.catalog;
        let order = catalog.restore_order();
        info!(prefix, entities = order.len(), "starting full restore");

        // `None` marks an entity whose outcome depends on the transaction.
        let mut pending: Vec<(&EntityDef, Option<SkipReason>)> = Vec::with_capacity(order.len());
        let mut plan = Vec::with_capacity(order.len());

        for def in order {
            if let Some(reason) = self.policy.skip_reason(def) {
                debug!(entity = def.name, "skipping {reason}");
                pending.push((def, Some(reason)));
                continue;
            }

            let path = snapshot_file(prefix, def);
            if !self.blobs.exists(&path) {
                warn!(entity = def.name, path = %path, "no snapshot file, skipping");
                pending.push((def, Some(SkipReason::MissingFile { path })));
                continue;
            }

            plan.push(self.prepare(def, &path)?);
            pending.push((def, None));
        }

        let counts = self.in_transaction(|store| {
            for prepared in plan.iter().rev() {
                store.truncate(prepared.def.table())?;
            }
            plan.iter()
                .map(|prepared| insert_records(&mut *store, prepared))
                .collect::<Result<Vec<_>>>()
        })?;

        let mut counts = counts.into_iter();
        let mut report = RestoreReport::default();
        for (def, reason) in pending {
            let outcome = match reason {
                Some(reason) => RestoreOutcome::Skipped(reason),
                None => {
                    let count = counts.next().unwrap_or_default();
                    info!(entity = def.name, records = count, "✓ restored");
                    RestoreOutcome::Restored(count)
                }
            };
            report.entries.push((def.name.to_string(), outcome));
        }

        info!(
            prefix,
            records = report.restored_records(),
            skipped = report.skipped().count(),
            "restore complete"
        );
        Ok(report)
    }

    /// Snapshots without a manifest are assumed to hold JSON files
    fn ensure_restorable(&self, prefix: &str) -> Result<()> {
        match Manifest::read(self.blobs, prefix)? {
            Some(manifest) => manifest.ensure_restorable(),
            None => Ok(()),
        }
    }

    /// Read, reconcile and apply the policy to one entity's snapshot file
    fn prepare<'c>(&self, def: &'c EntityDef, path: &str) -> Result<PreparedEntity<'c>> {
        let payload = self.blobs.read(path)?;
        let mut records = self.codec.decode(&payload).map_err(|e| {
            SnapshotError::invalid_format(format!("{} snapshot at {path}: {e}", def.name))
        })?;

        let live_columns = self.store.columns(def.table())?;
        let dropped = reconcile::reconcile(def, &mut records, &live_columns);
        if !dropped.is_empty() {
            warn!(
                entity = def.name,
                columns = ?dropped,
                "snapshot fields not present in the live table were omitted"
            );
        }

        let recovery = self.policy.recover_secrets(def, &mut records);
        if recovery != SecretRecovery::default() {
            debug!(
                entity = def.name,
                decrypted = recovery.decrypted,
                placeholders = recovery.placeholders,
                cleared = recovery.cleared,
                "sensitive fields recovered"
            );
        }

        Ok(PreparedEntity { def, records })
    }

    fn in_transaction<T>(&mut self, apply: impl FnOnce(&mut S) -> Result<T>) -> Result<T> {
        self.store.begin()?;
        let result = apply(&mut *self.store).and_then(|value| {
            self.store.commit()?;
            Ok(value)
        });

        if result.is_err() {
            if let Err(rollback_err) = self.store.rollback() {
                warn!(error = %rollback_err, "rollback failed");
            }
        }
        result
    }
}

fn snapshot_file(prefix: &str, def: &EntityDef) -> String {
    join_path(prefix, &SnapshotFormat::Json.file_name(def.name))
}

fn insert_records<S: RecordStore>(store: &mut S, prepared: &PreparedEntity<'_>) -> Result<usize> {
    let table = prepared.def.table();
    for (index, record) in prepared.records.iter().enumerate() {
        store.insert(table, record).map_err(|e| match e {
            SnapshotError::Database(msg) => SnapshotError::database(format!(
                "{} record #{index} (id {}): {msg}",
                prepared.def.name,
                record
                    .get("id")
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "?".to_string())
            )),
            other => other,
        })?;
    }
    Ok(prepared.records.len())
}
