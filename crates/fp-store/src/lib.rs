//! # fp-store
//!
//! Durable registry of finality providers.
//!
//! ## Overview
//!
//! This crate persists one record per finality provider: its identity keys,
//! its status state machine, and its three voting bookmarks
//! (`last_voted_height`, `last_processed_height`, `last_committed_height`).
//! It also persists one vote record per (provider, height).
//!
//! Two guarantees matter to callers:
//!
//! - Bookmark updates are atomic read-modify-write operations and may never
//!   move a bookmark backwards or break the ordering
//!   `last_voted <= last_processed <= last_committed`.
//! - A vote record is written in the same atomic batch as the bookmark
//!   advance, and a second record with a different hash at the same height
//!   is rejected.
//!
//! ## Architecture
//!
//! ```text
//! ProviderStore ──KeyValueStore port──→ RocksDbStore (production)
//!                                   └──→ InMemoryKvStore (tests)
//! ```

pub mod adapters;
pub mod entities;
pub mod error;
pub mod ports;
pub mod schema;
pub mod service;

pub use entities::{Bookmarks, ProviderStatus, StoredFinalityProvider, StoredVoteRecord};
pub use error::{StoreError, StoreResult};
pub use ports::{BatchOperation, InMemoryKvStore, KeyValueStore};
pub use schema::KeyPrefix;
pub use service::ProviderStore;

#[cfg(feature = "rocksdb-store")]
pub use adapters::rocksdb::{RocksDbConfig, RocksDbStore};
