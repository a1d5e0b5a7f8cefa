use crate::StoreError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::RwLock;

/// Namespaced key-value storage underneath the document store.
///
/// A namespace holds one collection (`database/collection`); keys are
/// document ids and values are encoded documents. Scans visit keys in
/// ascending order.
pub trait StorageBackend: Send + Sync {
    /// Retrieve a value by key.
    fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    /// Insert every entry, or none of them if any key already exists.
    fn insert_new(&self, namespace: &str, entries: Vec<(String, Vec<u8>)>)
        -> Result<(), StoreError>;
    /// Overwrite an existing key. Returns `false` when the key is absent.
    fn replace(&self, namespace: &str, key: &str, value: &[u8]) -> Result<bool, StoreError>;
    /// Delete a key. Returns `false` when the key is absent.
    fn delete(&self, namespace: &str, key: &str) -> Result<bool, StoreError>;
    /// Visit every value in a namespace.
    fn scan(
        &self,
        namespace: &str,
        visitor: &mut dyn FnMut(&[u8]) -> Result<(), StoreError>,
    ) -> Result<(), StoreError>;
    /// All non-empty namespaces, sorted.
    fn namespaces(&self) -> Result<Vec<String>, StoreError>;
    /// Whether a namespace holds at least one key.
    fn contains_namespace(&self, namespace: &str) -> Result<bool, StoreError> {
        Ok(self.namespaces()?.iter().any(|ns| ns == namespace))
    }
    /// Remove a namespace and everything in it. Returns `false` when empty.
    fn drop_namespace(&self, namespace: &str) -> Result<bool, StoreError>;
    /// Flush any buffered writes to the backend.
    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Configuration for selecting and building a backend.
///
/// # Example
/// ```
/// use store::BackendConfig;
///
/// // In-memory (for testing)
/// let config = BackendConfig::in_memory();
///
/// // Redb (pure Rust, persistent)
/// let config = BackendConfig::redb("/data/objgate.redb");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Use Redb for storage. The `path` is the file path for the database.
    ///
    /// Requires the `backend-redb` feature (enabled by default).
    Redb { path: String },
    /// Use an in-memory map for storage. Contents are lost on restart.
    #[default]
    InMemory,
}

impl BackendConfig {
    /// Create an in-memory backend configuration.
    pub fn in_memory() -> Self {
        BackendConfig::InMemory
    }

    /// Create a Redb backend configuration.
    pub fn redb<P: Into<String>>(path: P) -> Self {
        BackendConfig::Redb { path: path.into() }
    }

    /// Build the backend based on the configuration.
    ///
    /// Fails when the selected backend is disabled at compile time or
    /// cannot be opened.
    pub fn build(&self) -> Result<Box<dyn StorageBackend>, StoreError> {
        match self {
            BackendConfig::InMemory => Ok(Box::new(InMemoryBackend::new())),
            BackendConfig::Redb { path } => {
                #[cfg(feature = "backend-redb")]
                {
                    Ok(Box::new(RedbBackend::open(path)?))
                }
                #[cfg(not(feature = "backend-redb"))]
                {
                    let _ = path;
                    Err(StoreError::backend("redb backend disabled at compile time"))
                }
            }
        }
    }
}

type Namespaces = BTreeMap<String, BTreeMap<String, Vec<u8>>>;

/// An in-memory backend using a `RwLock` around nested ordered maps.
pub struct InMemoryBackend {
    records: RwLock<Namespaces>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Namespaces>, StoreError> {
        self.records
            .read()
            .map_err(|_| StoreError::backend("poisoned lock"))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Namespaces>, StoreError> {
        self.records
            .write()
            .map_err(|_| StoreError::backend("poisoned lock"))
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for InMemoryBackend {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let guard = self.read()?;
        Ok(guard.get(namespace).and_then(|ns| ns.get(key)).cloned())
    }

    fn insert_new(
        &self,
        namespace: &str,
        entries: Vec<(String, Vec<u8>)>,
    ) -> Result<(), StoreError> {
        // One write lock covers the existence checks and the inserts.
        let mut guard = self.write()?;
        if let Some(ns) = guard.get(namespace) {
            if let Some((key, _)) = entries.iter().find(|(key, _)| ns.contains_key(key)) {
                return Err(duplicate(namespace, key));
            }
        }
        let ns = guard.entry(namespace.to_string()).or_default();
        for (key, value) in entries {
            ns.insert(key, value);
        }
        Ok(())
    }

    fn replace(&self, namespace: &str, key: &str, value: &[u8]) -> Result<bool, StoreError> {
        let mut guard = self.write()?;
        match guard.get_mut(namespace).and_then(|ns| ns.get_mut(key)) {
            Some(slot) => {
                *slot = value.to_vec();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete(&self, namespace: &str, key: &str) -> Result<bool, StoreError> {
        let mut guard = self.write()?;
        let Some(ns) = guard.get_mut(namespace) else {
            return Ok(false);
        };
        let removed = ns.remove(key).is_some();
        if ns.is_empty() {
            guard.remove(namespace);
        }
        Ok(removed)
    }

    fn scan(
        &self,
        namespace: &str,
        visitor: &mut dyn FnMut(&[u8]) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        // A read lock is held for the duration of the scan.
        let guard = self.read()?;
        if let Some(ns) = guard.get(namespace) {
            for value in ns.values() {
                visitor(value)?;
            }
        }
        Ok(())
    }

    fn namespaces(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.read()?.keys().cloned().collect())
    }

    fn contains_namespace(&self, namespace: &str) -> Result<bool, StoreError> {
        Ok(self.read()?.contains_key(namespace))
    }

    fn drop_namespace(&self, namespace: &str) -> Result<bool, StoreError> {
        Ok(self.write()?.remove(namespace).is_some())
    }
}

/// Error for an id that is already taken in `namespace`.
pub(crate) fn duplicate(namespace: &str, key: &str) -> StoreError {
    let collection = namespace
        .split_once('/')
        .map_or(namespace, |(_, collection)| collection);
    StoreError::DuplicateId {
        id: key.to_string(),
        collection: collection.to_string(),
    }
}

/// The Redb backend implementation.
#[cfg(feature = "backend-redb")]
pub mod redb;

#[cfg(feature = "backend-redb")]
pub use self::redb::RedbBackend;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_insert_get_delete() {
        let backend = InMemoryBackend::new();
        backend
            .insert_new("db/c", vec![("a".into(), b"1".to_vec())])
            .unwrap();
        assert_eq!(backend.get("db/c", "a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(backend.get("db/other", "a").unwrap(), None);
        assert!(backend.delete("db/c", "a").unwrap());
        assert!(!backend.delete("db/c", "a").unwrap());
        assert!(backend.namespaces().unwrap().is_empty());
    }

    #[test]
    fn in_memory_insert_new_is_all_or_nothing() {
        let backend = InMemoryBackend::new();
        backend
            .insert_new("db/c", vec![("a".into(), b"1".to_vec())])
            .unwrap();
        let err = backend
            .insert_new(
                "db/c",
                vec![("b".into(), b"2".to_vec()), ("a".into(), b"3".to_vec())],
            )
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::DuplicateId {
                id: "a".into(),
                collection: "c".into()
            }
        );
        assert_eq!(backend.get("db/c", "b").unwrap(), None);
        assert_eq!(backend.get("db/c", "a").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn in_memory_replace_requires_existing_key() {
        let backend = InMemoryBackend::new();
        assert!(!backend.replace("db/c", "a", b"x").unwrap());
        backend
            .insert_new("db/c", vec![("a".into(), b"1".to_vec())])
            .unwrap();
        assert!(backend.replace("db/c", "a", b"2").unwrap());
        assert_eq!(backend.get("db/c", "a").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn in_memory_scan_visits_keys_in_order() {
        let backend = InMemoryBackend::new();
        backend
            .insert_new(
                "db/c",
                vec![("b".into(), b"2".to_vec()), ("a".into(), b"1".to_vec())],
            )
            .unwrap();
        let mut seen = Vec::new();
        backend
            .scan("db/c", &mut |v| {
                seen.push(v.to_vec());
                Ok(())
            })
            .unwrap();
        assert_eq!(seen, vec![b"1".to_vec(), b"2".to_vec()]);
    }

    #[test]
    fn in_memory_drop_namespace() {
        let backend = InMemoryBackend::new();
        backend
            .insert_new("db/a", vec![("1".into(), b"x".to_vec())])
            .unwrap();
        backend
            .insert_new("db/b", vec![("1".into(), b"y".to_vec())])
            .unwrap();
        assert_eq!(backend.namespaces().unwrap(), vec!["db/a", "db/b"]);
        assert!(backend.drop_namespace("db/a").unwrap());
        assert!(!backend.drop_namespace("db/a").unwrap());
        assert_eq!(backend.namespaces().unwrap(), vec!["db/b"]);
    }

    #[test]
    fn backend_config_builds_in_memory() {
        let backend = BackendConfig::in_memory().build().unwrap();
        assert!(backend.namespaces().unwrap().is_empty());
    }
}
