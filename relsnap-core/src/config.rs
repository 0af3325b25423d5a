//! Configuration for backup and restore runs
//!
//! [`SnapshotConfig`] gathers where the live database is, where snapshots are
//! stored, and the application key protecting sensitive fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::catalog::EntityDef;
use crate::crypto::{AesGcmEncrypter, Encrypter, EncryptionKey, KeylessEncrypter};
use crate::writer::snapshot_prefix;
use crate::{Result, SnapshotError};

/// Default directory, under the storage root, holding snapshot directories
pub const DEFAULT_BACKUP_DIR: &str = "backups";

/// Settings shared by the backup and restore commands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// SQLite database file holding the live data
    pub database_path: PathBuf,
    /// Base directory of the snapshot storage
    pub storage_root: PathBuf,
    /// Directory under `storage_root` holding one directory per snapshot
    pub backup_dir: String,
    /// Application key; `base64:`-prefixed raw key or a passphrase
    #[serde(skip_serializing)]
    pub app_key: Option<String>,
}

impl SnapshotConfig {
    /// Configuration for a database and storage in the current directory
    pub fn default_local() -> Self {
        SnapshotConfig {
            database_path: PathBuf::from("database.sqlite"),
            storage_root: PathBuf::from("storage"),
            backup_dir: DEFAULT_BACKUP_DIR.to_string(),
            app_key: None,
        }
    }

    pub fn with_database<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = path.into();
        self
    }

    pub fn with_storage_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.storage_root = root.into();
        self
    }

    pub fn with_backup_dir<S: Into<String>>(mut self, dir: S) -> Self {
        self.backup_dir = dir.into();
        self
    }

    pub fn with_app_key<S: Into<String>>(mut self, key: S) -> Self {
        self.app_key = Some(key.into());
        self
    }

    /// Parse the configured application key
    ///
    /// # Errors
    /// * `SnapshotError::Validation` - If no key is configured or a `base64:` key
    ///   is malformed
    pub fn encryption_key(&self) -> Result<EncryptionKey> {
        match self.app_key.as_deref() {
            Some(raw) if !raw.is_empty() => EncryptionKey::parse(raw),
            _ => Err(SnapshotError::validation(
                "An application key is required to protect sensitive fields",
            )),
        }
    }

    /// Encrypter for a run over `entities`
    ///
    /// The application key is only required when one of the entities has
    /// sensitive fields.
    ///
    /// # Errors
    /// * `SnapshotError::Validation` - If the key is needed but missing or malformed
    pub fn encrypter_for<'e>(
        &self,
        entities: impl IntoIterator<Item = &'e EntityDef>,
    ) -> Result<Box<dyn Encrypter>> {
        if entities.into_iter().any(|def| !def.sensitive.is_empty()) {
            Ok(Box::new(AesGcmEncrypter::new(&self.encryption_key()?)))
        } else {
            Ok(Box::new(KeylessEncrypter))
        }
    }

    /// Storage prefix for a snapshot taken at `taken_at`
    pub fn snapshot_prefix(&self, taken_at: DateTime<Utc>) -> String {
        snapshot_prefix(&self.backup_dir, taken_at)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(SnapshotError::validation("database path cannot be empty"));
        }
        if self.backup_dir.trim_matches('/').is_empty() {
            return Err(SnapshotError::validation("backup directory cannot be empty"));
        }
        Ok(())
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self::default_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_default_local_config() {
        let config = SnapshotConfig::default_local();
        assert_eq!(config.backup_dir, "backups");
        assert!(config.app_key.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_setters() {
        let config = SnapshotConfig::default_local()
            .with_database("/var/app/db.sqlite")
            .with_storage_root("/var/app/storage")
            .with_backup_dir("snapshots")
            .with_app_key("secret");

        assert_eq!(config.database_path, PathBuf::from("/var/app/db.sqlite"));
        assert_eq!(config.storage_root, PathBuf::from("/var/app/storage"));
        let taken_at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).unwrap();
        assert_eq!(config.snapshot_prefix(taken_at), "snapshots/2024-03-09_14-05-00");
    }

    #[test]
    fn test_missing_key_is_rejected() {
        let config = SnapshotConfig::default_local();
        assert!(matches!(
            config.encryption_key(),
            Err(SnapshotError::Validation(_))
        ));
        assert!(config.with_app_key("passphrase").encryption_key().is_ok());
    }

    #[test]
    fn test_key_only_required_for_sensitive_entities() {
        use crate::catalog::EntityCatalog;

        let catalog = EntityCatalog::standard();
        let config = SnapshotConfig::default_local();

        let cities = catalog.require("cities").unwrap();
        assert!(config.encrypter_for([cities]).is_ok());

        let users = catalog.require("users").unwrap();
        assert!(matches!(
            config.encrypter_for([users]),
            Err(SnapshotError::Validation(_))
        ));
        assert!(config.encrypter_for(catalog.iter()).is_err());

        let keyed = config.with_app_key("passphrase");
        let encrypter = keyed.encrypter_for(catalog.iter()).unwrap();
        let envelope = encrypter.encrypt("secret123").unwrap();
        assert_eq!(encrypter.decrypt(&envelope).unwrap(), "secret123");
    }

    #[test]
    fn test_validate_rejects_empty_values() {
        let config = SnapshotConfig::default_local().with_backup_dir("/");
        assert!(config.validate().is_err());

        let config = SnapshotConfig::default_local().with_database("");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_key_is_not_serialized() {
        let config = SnapshotConfig::default_local().with_app_key("secret");
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}
