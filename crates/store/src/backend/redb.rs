//! Redb (Rust embedded database) backend for the document store.
//!
//! Every collection lives in one table. Keys are `namespace\0id`, so a
//! collection is the contiguous key range `namespace\0 .. namespace\x01`
//! and scans come back in id order.
//!
//! # Configuration Example
//! ```yaml
//! store:
//!   backend:
//!     kind: redb
//!     path: "/data/objgate.redb"
//! ```

use crate::backend::duplicate;
use crate::{StorageBackend, StoreError};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;

/// Table holding every document of every collection.
const DOCUMENTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("objgate_documents");

const SEPARATOR: char = '\0';

fn record_key(namespace: &str, key: &str) -> String {
    format!("{namespace}{SEPARATOR}{key}")
}

/// Half-open key range covering one namespace.
fn namespace_bounds(namespace: &str) -> (String, String) {
    (format!("{namespace}\u{0}"), format!("{namespace}\u{1}"))
}

/// Redb backend implementation for persistent storage.
///
/// Each mutating call runs in its own write transaction, so batch inserts
/// either land completely or not at all.
pub struct RedbBackend {
    db: Arc<Database>,
}

impl RedbBackend {
    /// Open or create a Redb database at the given path.
    ///
    /// # Example
    /// ```no_run
    /// use store::RedbBackend;
    ///
    /// let backend = RedbBackend::open("/tmp/objgate.redb").unwrap();
    /// ```
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = Database::create(path).map_err(StoreError::backend)?;

        let write_txn = db.begin_write().map_err(StoreError::backend)?;
        {
            // Accessing the table creates it if it doesn't exist
            let _table = write_txn
                .open_table(DOCUMENTS_TABLE)
                .map_err(StoreError::backend)?;
        }
        write_txn.commit().map_err(StoreError::backend)?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl StorageBackend for RedbBackend {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let read_txn = self.db.begin_read().map_err(StoreError::backend)?;
        let table = read_txn
            .open_table(DOCUMENTS_TABLE)
            .map_err(StoreError::backend)?;

        let value = table
            .get(record_key(namespace, key).as_str())
            .map_err(StoreError::backend)?;
        Ok(value.map(|v| v.value().to_vec()))
    }

    fn insert_new(
        &self,
        namespace: &str,
        entries: Vec<(String, Vec<u8>)>,
    ) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write().map_err(StoreError::backend)?;
        {
            let mut table = write_txn
                .open_table(DOCUMENTS_TABLE)
                .map_err(StoreError::backend)?;

            for (key, value) in &entries {
                let full = record_key(namespace, key);
                let exists = table
                    .get(full.as_str())
                    .map_err(StoreError::backend)?
                    .is_some();
                if exists {
                    // Dropping the transaction without commit aborts it.
                    return Err(duplicate(namespace, key));
                }
                table
                    .insert(full.as_str(), value.as_slice())
                    .map_err(StoreError::backend)?;
            }
        }
        write_txn.commit().map_err(StoreError::backend)?;
        Ok(())
    }

    fn replace(&self, namespace: &str, key: &str, value: &[u8]) -> Result<bool, StoreError> {
        let full = record_key(namespace, key);
        let write_txn = self.db.begin_write().map_err(StoreError::backend)?;
        let replaced = {
            let mut table = write_txn
                .open_table(DOCUMENTS_TABLE)
                .map_err(StoreError::backend)?;
            let exists = table
                .get(full.as_str())
                .map_err(StoreError::backend)?
                .is_some();
            if exists {
                table
                    .insert(full.as_str(), value)
                    .map_err(StoreError::backend)?;
            }
            exists
        };
        if replaced {
            write_txn.commit().map_err(StoreError::backend)?;
        } else {
            write_txn.abort().map_err(StoreError::backend)?;
        }
        Ok(replaced)
    }

    fn delete(&self, namespace: &str, key: &str) -> Result<bool, StoreError> {
        let full = record_key(namespace, key);
        let write_txn = self.db.begin_write().map_err(StoreError::backend)?;
        let removed = {
            let mut table = write_txn
                .open_table(DOCUMENTS_TABLE)
                .map_err(StoreError::backend)?;
            let removed = table
                .remove(full.as_str())
                .map_err(StoreError::backend)?
                .is_some();
            removed
        };
        write_txn.commit().map_err(StoreError::backend)?;
        Ok(removed)
    }

    fn scan(
        &self,
        namespace: &str,
        visitor: &mut dyn FnMut(&[u8]) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let read_txn = self.db.begin_read().map_err(StoreError::backend)?;
        let table = read_txn
            .open_table(DOCUMENTS_TABLE)
            .map_err(StoreError::backend)?;

        let (start, end) = namespace_bounds(namespace);
        for item in table
            .range(start.as_str()..end.as_str())
            .map_err(StoreError::backend)?
        {
            let (_, value) = item.map_err(StoreError::backend)?;
            visitor(value.value())?;
        }
        Ok(())
    }

    fn namespaces(&self) -> Result<Vec<String>, StoreError> {
        let read_txn = self.db.begin_read().map_err(StoreError::backend)?;
        let table = read_txn
            .open_table(DOCUMENTS_TABLE)
            .map_err(StoreError::backend)?;

        let mut namespaces: Vec<String> = Vec::new();
        for item in table.iter().map_err(StoreError::backend)? {
            let (key, _) = item.map_err(StoreError::backend)?;
            let Some((namespace, _)) = key.value().split_once(SEPARATOR) else {
                continue;
            };
            // Keys are sorted, so one namespace is always contiguous.
            if namespaces.last().map(String::as_str) != Some(namespace) {
                namespaces.push(namespace.to_string());
            }
        }
        Ok(namespaces)
    }

    fn contains_namespace(&self, namespace: &str) -> Result<bool, StoreError> {
        let read_txn = self.db.begin_read().map_err(StoreError::backend)?;
        let table = read_txn
            .open_table(DOCUMENTS_TABLE)
            .map_err(StoreError::backend)?;

        let (start, end) = namespace_bounds(namespace);
        let mut range = table
            .range(start.as_str()..end.as_str())
            .map_err(StoreError::backend)?;
        Ok(range.next().is_some())
    }

    fn drop_namespace(&self, namespace: &str) -> Result<bool, StoreError> {
        let (start, end) = namespace_bounds(namespace);
        let write_txn = self.db.begin_write().map_err(StoreError::backend)?;
        let dropped = {
            let mut table = write_txn
                .open_table(DOCUMENTS_TABLE)
                .map_err(StoreError::backend)?;
            let mut keys = Vec::new();
            for item in table
                .range(start.as_str()..end.as_str())
                .map_err(StoreError::backend)?
            {
                let (key, _) = item.map_err(StoreError::backend)?;
                keys.push(key.value().to_string());
            }
            for key in &keys {
                table.remove(key.as_str()).map_err(StoreError::backend)?;
            }
            !keys.is_empty()
        };
        write_txn.commit().map_err(StoreError::backend)?;
        Ok(dropped)
    }

    fn flush(&self) -> Result<(), StoreError> {
        // Redb commits are synchronous, every write is already durable.
        Ok(())
    }
}
