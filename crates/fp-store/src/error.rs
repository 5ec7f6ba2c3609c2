//! Error types for the provider store.

use thiserror::Error;

/// Provider store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record exists for the given provider key.
    #[error("finality provider not found: {btc_pk}")]
    ProviderNotFound { btc_pk: String },

    /// A record already exists for the given provider key.
    #[error("finality provider already exists: {btc_pk}")]
    ProviderExists { btc_pk: String },

    /// A status change outside the closed transition table.
    #[error("invalid status transition: {from:?} -> {to:?}")]
    InvalidStatusTransition { from: String, to: String },

    /// A bookmark update tried to move a high-water mark backwards.
    #[error("bookmark regression on {field}: stored {stored}, requested {requested}")]
    BookmarkRegression {
        field: &'static str,
        stored: u64,
        requested: u64,
    },

    /// A bookmark update violated `voted <= processed <= committed`.
    #[error(
        "bookmark ordering violated: voted {voted}, processed {processed}, committed {committed}"
    )]
    BookmarkOrder {
        voted: u64,
        processed: u64,
        committed: u64,
    },

    /// A second vote record with a different hash at an already-voted height.
    #[error("conflicting vote record at height {height}")]
    ConflictingVoteRecord { height: u64 },

    /// A persisted record failed to decode.
    #[error("corrupted record under key {key}: {reason}")]
    CorruptedRecord { key: String, reason: String },

    /// Record encoding failed.
    #[error("serialization failure: {reason}")]
    Serialization { reason: String },

    /// Key-value backend I/O failure.
    #[error("storage backend failure: {reason}")]
    Backend { reason: String },
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
