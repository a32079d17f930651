use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use redb::{Database, ReadableTable, TableDefinition};

use super::QueueError;

const TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("kv");

/// Device-local durable key-value storage.
pub trait KvStore: Send + Sync {
    /// Get the value for a key. Returns None if the key does not exist.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, QueueError>;

    /// Replace the value for `key` with `new` only if it currently equals
    /// `expected` (`None` meaning absent). Returns whether the swap happened.
    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: &[u8],
    ) -> Result<bool, QueueError>;
}

/// KvStore backed by a redb file. redb holds an exclusive lock on the file,
/// so a second process opening the same queue fails instead of racing.
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open or create a redb database at the given path.
    pub fn open(path: &Path) -> Result<Self, QueueError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| QueueError::Storage(e.to_string()))?;
            }
        }
        let db = Database::create(path).map_err(|e| QueueError::Storage(e.to_string()))?;

        // Ensure the table exists by doing a write transaction.
        let write_txn = db
            .begin_write()
            .map_err(|e| QueueError::Storage(e.to_string()))?;
        {
            let _table = write_txn
                .open_table(TABLE)
                .map_err(|e| QueueError::Storage(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| QueueError::Storage(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl KvStore for RedbStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, QueueError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| QueueError::Storage(e.to_string()))?;
        let table = read_txn
            .open_table(TABLE)
            .map_err(|e| QueueError::Storage(e.to_string()))?;

        match table.get(key) {
            Ok(Some(val)) => Ok(Some(val.value().to_vec())),
            Ok(None) => Ok(None),
            Err(e) => Err(QueueError::Storage(e.to_string())),
        }
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: &[u8],
    ) -> Result<bool, QueueError> {
        // redb allows one write transaction at a time, which makes the
        // compare and the write atomic.
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| QueueError::Storage(e.to_string()))?;
        let swapped = {
            let mut table = write_txn
                .open_table(TABLE)
                .map_err(|e| QueueError::Storage(e.to_string()))?;
            let current = table
                .get(key)
                .map_err(|e| QueueError::Storage(e.to_string()))?
                .map(|v| v.value().to_vec());
            if current.as_deref() == expected {
                table
                    .insert(key, new)
                    .map_err(|e| QueueError::Storage(e.to_string()))?;
                true
            } else {
                false
            }
        };

        if swapped {
            write_txn
                .commit()
                .map_err(|e| QueueError::Storage(e.to_string()))?;
        } else {
            write_txn
                .abort()
                .map_err(|e| QueueError::Storage(e.to_string()))?;
        }
        Ok(swapped)
    }
}

/// KvStore held in memory; lost on restart.
#[derive(Default)]
pub struct MemoryKv {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, QueueError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| QueueError::Storage("store lock poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: &[u8],
    ) -> Result<bool, QueueError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| QueueError::Storage("store lock poisoned".to_string()))?;
        if entries.get(key).map(|v| v.as_slice()) != expected {
            return Ok(false);
        }
        entries.insert(key.to_string(), new.to_vec());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(store: &dyn KvStore) {
        assert_eq!(store.get("k").unwrap(), None);
        assert!(store.compare_and_swap("k", None, b"one").unwrap());
        assert!(!store.compare_and_swap("k", None, b"two").unwrap());
        assert!(!store.compare_and_swap("k", Some(b"zzz"), b"two").unwrap());
        assert!(store.compare_and_swap("k", Some(b"one"), b"two").unwrap());
        assert_eq!(store.get("k").unwrap().as_deref(), Some(&b"two"[..]));
    }

    #[test]
    fn memory_compare_and_swap() {
        exercise(&MemoryKv::new());
    }

    #[test]
    fn redb_compare_and_swap_and_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.redb");
        {
            let store = RedbStore::open(&path).unwrap();
            exercise(&store);
        }
        let reopened = RedbStore::open(&path).unwrap();
        assert_eq!(reopened.get("k").unwrap().as_deref(), Some(&b"two"[..]));
    }
}
