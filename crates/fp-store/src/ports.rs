//! # Outbound Port (Driven Port)
//!
//! The key-value database interface the provider store requires.
//!
//! Production: `RocksDbStore` (`adapters/rocksdb.rs`, behind the
//! `rocksdb-store` feature). Testing: `InMemoryKvStore` (below).

use crate::error::StoreResult;

/// Abstract interface for key-value database operations.
pub trait KeyValueStore: Send + Sync {
    /// Get a value by key.
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>>;

    /// Put a single key-value pair.
    fn put(&mut self, key: &[u8], value: &[u8]) -> StoreResult<()>;

    /// Delete a key.
    fn delete(&mut self, key: &[u8]) -> StoreResult<()>;

    /// Execute an atomic batch write.
    ///
    /// Either ALL operations in the batch succeed, or NONE are applied.
    /// Bookmark advances and vote records ride the same batch.
    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> StoreResult<()>;

    /// Check if a key exists.
    fn exists(&self, key: &[u8]) -> StoreResult<bool>;

    /// Iterate over keys with a prefix, in key order.
    fn prefix_scan(&self, prefix: &[u8]) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>>;
}

/// Batch operation for atomic writes.
#[derive(Debug, Clone)]
pub enum BatchOperation {
    /// Put a key-value pair.
    Put { key: Vec<u8>, value: Vec<u8> },
    /// Delete a key.
    Delete { key: Vec<u8> },
}

impl BatchOperation {
    /// Create a Put operation.
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Create a Delete operation.
    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Delete { key: key.into() }
    }
}

/// In-memory key-value store for unit tests.
///
/// A `BTreeMap` keeps prefix scans in key order, matching the RocksDB
/// iterator behavior the service relies on.
#[derive(Default)]
pub struct InMemoryKvStore {
    data: std::collections::BTreeMap<Vec<u8>, Vec<u8>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for InMemoryKvStore {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.data.get(key).cloned())
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.data.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> StoreResult<()> {
        self.data.remove(key);
        Ok(())
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> StoreResult<()> {
        // Single-threaded map; applying in order is atomic enough for tests.
        for op in operations {
            match op {
                BatchOperation::Put { key, value } => {
                    self.data.insert(key, value);
                }
                BatchOperation::Delete { key } => {
                    self.data.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn exists(&self, key: &[u8]) -> StoreResult<bool> {
        Ok(self.data.contains_key(key))
    }

    fn prefix_scan(&self, prefix: &[u8]) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(self
            .data
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_basic_operations() {
        let mut store = InMemoryKvStore::new();

        store.put(b"key1", b"value1").unwrap();
        assert_eq!(store.get(b"key1").unwrap(), Some(b"value1".to_vec()));
        assert!(store.exists(b"key1").unwrap());
        assert!(!store.exists(b"missing").unwrap());

        store.delete(b"key1").unwrap();
        assert!(!store.exists(b"key1").unwrap());
    }

    #[test]
    fn test_in_memory_batch_write() {
        let mut store = InMemoryKvStore::new();
        store
            .atomic_batch_write(vec![
                BatchOperation::put(b"a".as_slice(), b"1".as_slice()),
                BatchOperation::put(b"b".as_slice(), b"2".as_slice()),
                BatchOperation::delete(b"missing".as_slice()),
            ])
            .unwrap();

        assert!(store.exists(b"a").unwrap());
        assert!(store.exists(b"b").unwrap());
    }

    #[test]
    fn test_in_memory_prefix_scan_ordered() {
        let mut store = InMemoryKvStore::new();
        store.put(b"fp/v/x/2", b"b").unwrap();
        store.put(b"fp/v/x/1", b"a").unwrap();
        store.put(b"fp/p/x", b"p").unwrap();

        let results = store.prefix_scan(b"fp/v/").unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].1, b"a".to_vec());
        assert_eq!(results[1].1, b"b".to_vec());
    }
}
