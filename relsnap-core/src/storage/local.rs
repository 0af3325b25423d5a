/*!
Local filesystem storage adapter implementation.
*/

use std::fs;
use std::path::{Path, PathBuf};

use super::BlobStore;
use crate::{Result, SnapshotError};

/// Local filesystem storage adapter
///
/// This implementation stores snapshot files under a root directory.
/// It automatically creates parent directories if they don't exist.
///
/// # Example
/// ```rust
/// use relsnap_core::storage::{BlobStore, LocalFileStorage};
///
/// # let dir = std::env::temp_dir().join("relsnap-doc");
/// let storage = LocalFileStorage::with_base_dir(&dir);
/// // Will create any missing directories
/// storage.write("backups/2024-03-09_14-05-00/tags.json", b"[]")?;
/// # Ok::<(), relsnap_core::SnapshotError>(())
/// ```
#[derive(Debug, Clone)]
pub struct LocalFileStorage {
    /// Optional root directory for all snapshot paths
    base_dir: Option<PathBuf>,
}

impl LocalFileStorage {
    /// Create a local storage adapter without a base directory
    ///
    /// Paths provided to write/read will be used as-is.
    pub fn new() -> Self {
        Self { base_dir: None }
    }

    /// Create a local storage adapter rooted at `base_dir`
    ///
    /// All paths will be resolved relative to the base directory.
    pub fn with_base_dir<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: Some(base_dir.as_ref().to_path_buf()),
        }
    }

    /// Resolve the full path for a given storage path
    fn resolve_path(&self, path: &str) -> PathBuf {
        match &self.base_dir {
            Some(base) => base.join(path),
            None => PathBuf::from(path),
        }
    }

    /// Ensure the parent directory exists, creating it if necessary
    fn ensure_parent_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    SnapshotError::storage(format!(
                        "Failed to create directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }
        Ok(())
    }
}

impl Default for LocalFileStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobStore for LocalFileStorage {
    fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.resolve_path(path);

        self.ensure_parent_dir(&full_path)?;

        fs::write(&full_path, data).map_err(|e| {
            SnapshotError::storage(format!(
                "Failed to write snapshot file {}: {}",
                full_path.display(),
                e
            ))
        })
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.resolve_path(path);

        fs::read(&full_path).map_err(|e| {
            SnapshotError::storage(format!(
                "Failed to read snapshot file {}: {}",
                full_path.display(),
                e
            ))
        })
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve_path(path).is_file()
    }

    fn delete(&self, path: &str) -> Result<()> {
        let full_path = self.resolve_path(path);

        if full_path.exists() {
            fs::remove_file(&full_path).map_err(|e| {
                SnapshotError::storage(format!(
                    "Failed to delete snapshot file {}: {}",
                    full_path.display(),
                    e
                ))
            })?;
        }

        Ok(())
    }

    fn list_dirs(&self, prefix: &str) -> Result<Vec<String>> {
        let dir = self.resolve_path(prefix);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_local_file_storage_basic_operations() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalFileStorage::with_base_dir(temp_dir.path());

        let test_data = b"[{\"id\": 1}]";
        let path = "countries.json";

        // Test write
        assert!(storage.write(path, test_data).is_ok());

        // Test exists
        assert!(storage.exists(path));

        // Test read
        let loaded_data = storage.read(path).unwrap();
        assert_eq!(loaded_data, test_data);

        // Test delete
        assert!(storage.delete(path).is_ok());
        assert!(!storage.exists(path));
    }

    #[test]
    fn test_local_file_storage_nested_directories() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalFileStorage::with_base_dir(temp_dir.path());

        let path = "backups/2024-03-09_14-05-00/cities.json";

        // Should create nested directories automatically
        assert!(storage.write(path, b"[]").is_ok());
        assert!(storage.exists(path));
        assert_eq!(
            storage.list_dirs("backups").unwrap(),
            vec!["2024-03-09_14-05-00"]
        );
    }

    #[test]
    fn test_directories_are_not_files() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalFileStorage::with_base_dir(temp_dir.path());
        storage.write("backups/x/manifest", b"{}").unwrap();

        assert!(!storage.exists("backups/x"));
        assert!(storage.list_dirs("nowhere").unwrap().is_empty());
    }

    #[test]
    fn test_read_nonexistent_file() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalFileStorage::with_base_dir(temp_dir.path());

        let result = storage.read("nonexistent.json");
        assert!(matches!(result, Err(SnapshotError::Storage(_))));
    }
}
