//! Error types for the finality-provider service.
//!
//! Every error carries a classification used by the run loop:
//! transient errors are retried without advancing any bookmark,
//! safety-critical errors halt the instance and cross the critical-error
//! channel, everything else is a configuration or sequencing fault that is
//! surfaced immediately and never retried.

use fp_store::StoreError;
use fp_types::BtcPublicKey;
use thiserror::Error;

/// Finality-provider service errors.
#[derive(Debug, Error)]
pub enum ProviderError {
    // --- transient: retried at the caller's cadence ---
    /// A chain read query failed.
    #[error("chain query failed: {reason}")]
    ChainQuery { reason: String },

    /// A transaction submission failed before acceptance.
    #[error("transaction submission failed: {reason}")]
    ChainSubmission { reason: String },

    /// The signing backend is temporarily unavailable.
    #[error("signer backend unavailable: {reason}")]
    SignerUnavailable { reason: String },

    /// No randomness is committed yet for the height; the vote is deferred.
    #[error("no committed randomness covers height {height}")]
    MissingRandomness { height: u64 },

    // --- safety-critical: halt the instance, never retry ---
    /// A block at an already-voted height carries a different hash.
    #[error(
        "conflicting block at voted height {height}: recorded {recorded}, received {received}"
    )]
    DuplicateVote {
        height: u64,
        recorded: String,
        received: String,
    },

    /// The signer detected reuse of one-time randomness with a new message.
    #[error("randomness reuse detected at height {height}")]
    RandomnessReuse { height: u64 },

    /// Persistence failure or inconsistency.
    #[error("provider store failure: {0}")]
    Store(#[from] StoreError),

    // --- configuration / validation: fatal at startup, never retried ---
    /// The provider has no confirmed registration.
    #[error("finality provider not registered: {btc_pk}")]
    NotRegistered { btc_pk: String },

    /// The provider was slashed and must never sign again.
    #[error("finality provider slashed: {btc_pk}")]
    Slashed { btc_pk: String },

    /// The provider already has a registration record on chain or in store.
    #[error("finality provider already registered: {btc_pk}")]
    AlreadyRegistered { btc_pk: String },

    /// An instance is already running for the key.
    #[error("finality provider instance already running: {btc_pk}")]
    AlreadyStarted { btc_pk: String },

    /// No instance is running for the key.
    #[error("no running instance for finality provider: {btc_pk}")]
    NotStarted { btc_pk: String },

    /// A component received an out-of-sequence height from upstream.
    #[error("height sequence violated: expected {expected}, got {got}")]
    HeightSequence { expected: u64, got: u64 },

    /// The poller was started twice without an intervening stop.
    #[error("chain poller already started")]
    PollerAlreadyStarted,

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl ProviderError {
    /// Whether the fault is expected to clear on its own and safe to retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::ChainQuery { .. }
                | ProviderError::ChainSubmission { .. }
                | ProviderError::SignerUnavailable { .. }
                | ProviderError::MissingRandomness { .. }
        )
    }

    /// Whether the fault must halt the instance and reach the operator.
    ///
    /// Retrying any of these could risk an unsafe second signature.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            ProviderError::DuplicateVote { .. }
                | ProviderError::RandomnessReuse { .. }
                | ProviderError::Store(_)
        )
    }
}

/// Result type for service operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// An unrecoverable fault of one provider instance.
///
/// Emitted at most once per fault on the app's bounded channel; the
/// consuming operator decides teardown and alerting.
#[derive(Debug)]
pub struct CriticalError {
    /// Key of the affected provider.
    pub btc_pk: BtcPublicKey,
    /// The underlying fault.
    pub cause: ProviderError,
}

impl std::fmt::Display for CriticalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "critical error for finality provider {}: {}",
            fp_types::short_hex(&self.btc_pk),
            self.cause
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ProviderError::ChainQuery {
            reason: "timeout".into()
        }
        .is_transient());
        assert!(ProviderError::MissingRandomness { height: 5 }.is_transient());
        assert!(!ProviderError::ChainQuery {
            reason: "timeout".into()
        }
        .is_critical());
    }

    #[test]
    fn test_critical_classification() {
        let err = ProviderError::DuplicateVote {
            height: 30,
            recorded: "ab".into(),
            received: "cd".into(),
        };
        assert!(err.is_critical());
        assert!(!err.is_transient());

        assert!(ProviderError::RandomnessReuse { height: 7 }.is_critical());
        assert!(ProviderError::Store(StoreError::ConflictingVoteRecord { height: 7 })
            .is_critical());
    }

    #[test]
    fn test_config_faults_neither_transient_nor_critical() {
        let err = ProviderError::NotRegistered {
            btc_pk: "ab".into(),
        };
        assert!(!err.is_transient());
        assert!(!err.is_critical());
    }
}
