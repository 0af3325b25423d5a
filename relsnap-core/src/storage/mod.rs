/*!
Storage adapters for snapshot files.

This module defines the blob storage abstraction (port) and its implementations
(adapters). The writer and restorer only ever see [`BlobStore`], so snapshot
logic is independent of where the files physically live.

Paths are `/`-separated strings relative to the adapter's root, for example
`backups/2024-03-09_14-05-00/cities.json`.
*/

pub mod local;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use crate::{Result, SnapshotError};

pub use local::LocalFileStorage;

/// Storage abstraction for snapshot files
///
/// This trait defines the interface that all storage implementations must provide.
pub trait BlobStore {
    /// Write a file, replacing any previous content
    ///
    /// # Arguments
    /// * `path` - The storage location (interpretation depends on implementation)
    /// * `data` - The encoded snapshot bytes
    fn write(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Read a whole file
    ///
    /// # Returns
    /// The stored bytes or a storage error if the file is missing or unreadable
    fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Check if a file exists at the specified location
    fn exists(&self, path: &str) -> bool;

    /// Delete a file; deleting a missing file is not an error
    fn delete(&self, path: &str) -> Result<()>;

    /// Names of the directories directly under `prefix`, sorted
    fn list_dirs(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Join path segments with `/`, ignoring empty segments and stray separators
pub fn join_path(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let name = name.trim_start_matches('/');
    match (prefix.is_empty(), name.is_empty()) {
        (true, _) => name.to_string(),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{prefix}/{name}"),
    }
}

/// Memory-based storage adapter
///
/// Stores files in a map keyed by path. Clones share the same contents, which
/// lets tests hand one clone to the writer and inspect another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    data: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored paths, sorted
    pub fn paths(&self) -> Vec<String> {
        self.lock().map(|data| data.keys().cloned().collect()).unwrap_or_default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>>> {
        self.data
            .lock()
            .map_err(|_| SnapshotError::storage("memory storage lock poisoned"))
    }
}

impl BlobStore for MemoryStorage {
    fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        self.lock()?.insert(path.to_string(), data.to_vec());
        Ok(())
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.lock()?
            .get(path)
            .cloned()
            .ok_or_else(|| SnapshotError::storage(format!("File not found: {path}")))
    }

    fn exists(&self, path: &str) -> bool {
        self.lock().map(|data| data.contains_key(path)).unwrap_or(false)
    }

    fn delete(&self, path: &str) -> Result<()> {
        self.lock()?.remove(path);
        Ok(())
    }

    fn list_dirs(&self, prefix: &str) -> Result<Vec<String>> {
        let root = join_path(prefix, "");
        let dirs: BTreeSet<String> = self
            .lock()?
            .keys()
            .filter_map(|path| {
                let rest = if root.is_empty() {
                    path.as_str()
                } else {
                    path.strip_prefix(&root)?.strip_prefix('/')?
                };
                let (dir, _) = rest.split_once('/')?;
                Some(dir.to_string())
            })
            .collect();
        Ok(dirs.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("backups/x", "cities.json"), "backups/x/cities.json");
        assert_eq!(join_path("backups/x/", "/cities.json"), "backups/x/cities.json");
        assert_eq!(join_path("", "manifest"), "manifest");
        assert_eq!(join_path("backups", ""), "backups");
    }

    #[test]
    fn test_memory_storage_basic_operations() {
        let storage = MemoryStorage::new();
        let path = "backups/a/cities.json";

        storage.write(path, b"[]").unwrap();
        assert!(storage.exists(path));
        assert_eq!(storage.read(path).unwrap(), b"[]");

        storage.delete(path).unwrap();
        assert!(!storage.exists(path));
        assert!(storage.read(path).is_err());
    }

    #[test]
    fn test_memory_storage_lists_child_directories() {
        let storage = MemoryStorage::new();
        storage.write("backups/2024-01-02_00-00-00/users.json", b"[]").unwrap();
        storage.write("backups/2024-01-01_00-00-00/manifest", b"{}").unwrap();
        storage.write("backups/2024-01-01_00-00-00/users.json", b"[]").unwrap();
        storage.write("backups/loose-file", b"x").unwrap();

        assert_eq!(
            storage.list_dirs("backups").unwrap(),
            vec!["2024-01-01_00-00-00", "2024-01-02_00-00-00"]
        );
        assert_eq!(storage.list_dirs("").unwrap(), vec!["backups"]);
    }

    #[test]
    fn test_clones_share_contents() {
        let storage = MemoryStorage::new();
        let clone = storage.clone();
        storage.write("a/b", b"1").unwrap();
        assert!(clone.exists("a/b"));
    }
}
