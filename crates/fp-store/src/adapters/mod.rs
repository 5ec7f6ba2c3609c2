//! Adapter implementations of the key-value port.

#[cfg(feature = "rocksdb-store")]
pub mod rocksdb;
