//! # RocksDB Storage Adapter
//!
//! Production implementation of the `KeyValueStore` port.
//!
//! - Atomic batch writes (WriteBatch)
//! - Snappy compression
//! - fsync on write for durability (configurable)

use crate::error::{StoreError, StoreResult};
use crate::ports::{BatchOperation, KeyValueStore};
use parking_lot::RwLock;
use rocksdb::{IteratorMode, Options, WriteBatch, DB};
use std::path::Path;
use std::sync::Arc;

/// RocksDB configuration for the provider store.
#[derive(Debug, Clone)]
pub struct RocksDbConfig {
    /// Path to the database directory.
    pub path: String,
    /// Write buffer size in bytes (default: 16MB; the store is tiny).
    pub write_buffer_size: usize,
    /// Enable fsync after each write (default: true for durability).
    pub sync_writes: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            path: "./data/fp-store".to_string(),
            write_buffer_size: 16 * 1024 * 1024,
            sync_writes: true,
        }
    }
}

impl RocksDbConfig {
    /// Create config for testing (smaller buffers, no sync).
    pub fn for_testing(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            write_buffer_size: 4 * 1024 * 1024,
            sync_writes: false,
        }
    }
}

/// RocksDB-backed key-value store implementing the `KeyValueStore` port.
pub struct RocksDbStore {
    db: Arc<RwLock<DB>>,
    config: RocksDbConfig,
}

impl RocksDbStore {
    /// Open or create a RocksDB database.
    pub fn open(config: RocksDbConfig) -> StoreResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_write_buffer_size(config.write_buffer_size);
        opts.set_compression_type(rocksdb::DBCompressionType::Snappy);

        let db = DB::open(&opts, &config.path).map_err(|e| StoreError::Backend {
            reason: format!("failed to open RocksDB: {e}"),
        })?;

        Ok(Self {
            db: Arc::new(RwLock::new(db)),
            config,
        })
    }

    /// Open with defaults at a path.
    pub fn open_default(path: impl AsRef<Path>) -> StoreResult<Self> {
        let config = RocksDbConfig {
            path: path.as_ref().to_string_lossy().to_string(),
            ..Default::default()
        };
        Self::open(config)
    }

    fn write_opts(&self) -> rocksdb::WriteOptions {
        let mut write_opts = rocksdb::WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        write_opts
    }
}

impl KeyValueStore for RocksDbStore {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        let db = self.db.read();
        db.get(key).map_err(|e| StoreError::Backend {
            reason: format!("RocksDB get failed: {e}"),
        })
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        let db = self.db.write();
        db.put_opt(key, value, &self.write_opts())
            .map_err(|e| StoreError::Backend {
                reason: format!("RocksDB put failed: {e}"),
            })
    }

    fn delete(&mut self, key: &[u8]) -> StoreResult<()> {
        let db = self.db.write();
        db.delete_opt(key, &self.write_opts())
            .map_err(|e| StoreError::Backend {
                reason: format!("RocksDB delete failed: {e}"),
            })
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> StoreResult<()> {
        let db = self.db.write();
        let mut batch = WriteBatch::default();

        for op in operations {
            match op {
                BatchOperation::Put { key, value } => batch.put(&key, &value),
                BatchOperation::Delete { key } => batch.delete(&key),
            }
        }

        db.write_opt(batch, &self.write_opts())
            .map_err(|e| StoreError::Backend {
                reason: format!("RocksDB batch write failed: {e}"),
            })
    }

    fn exists(&self, key: &[u8]) -> StoreResult<bool> {
        let db = self.db.read();
        db.get_pinned(key)
            .map(|v| v.is_some())
            .map_err(|e| StoreError::Backend {
                reason: format!("RocksDB exists check failed: {e}"),
            })
    }

    fn prefix_scan(&self, prefix: &[u8]) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let db = self.db.read();
        let mut results = Vec::new();

        let iter = db.iterator(IteratorMode::From(prefix, rocksdb::Direction::Forward));
        for item in iter {
            match item {
                Ok((key, value)) => {
                    if !key.starts_with(prefix) {
                        break;
                    }
                    results.push((key.to_vec(), value.to_vec()));
                }
                Err(e) => {
                    return Err(StoreError::Backend {
                        reason: format!("RocksDB scan failed: {e}"),
                    });
                }
            }
        }

        Ok(results)
    }
}
