//! Persisted entities: the provider record, its status state machine, and
//! vote records.

use crate::error::{StoreError, StoreResult};
use fp_types::{BtcPublicKey, ChainPublicKey, EotsSignature, Hash};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};

/// Lifecycle status of a finality provider.
///
/// Transitions form a closed table (see [`ProviderStatus::can_transition_to`]):
///
/// ```text
/// Created ──→ Registered ──→ Active ⇄ Inactive
///                  │            │         │
///                  └────────────┴────┬────┘
///                                    ↓
///                                 Slashed (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderStatus {
    /// Record created locally, registration not yet confirmed on chain.
    Created,
    /// Registration transaction accepted by the chain.
    Registered,
    /// Holds voting power at recent heights.
    Active,
    /// Registered but currently without voting power.
    Inactive,
    /// Slashed on chain; must never sign again.
    Slashed,
}

impl ProviderStatus {
    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: ProviderStatus) -> bool {
        use ProviderStatus::*;
        matches!(
            (self, next),
            (Created, Registered)
                | (Registered, Active)
                | (Registered, Inactive)
                | (Registered, Slashed)
                | (Active, Inactive)
                | (Active, Slashed)
                | (Inactive, Active)
                | (Inactive, Slashed)
        )
    }

    /// Whether a provider in this status may run a voting instance.
    pub fn is_startable(self) -> bool {
        matches!(
            self,
            ProviderStatus::Registered | ProviderStatus::Active | ProviderStatus::Inactive
        )
    }
}

/// The three high-water marks tracked per provider.
///
/// Each is monotonically non-decreasing and the ordering
/// `last_voted <= last_processed <= last_committed` holds after every
/// successful update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Bookmarks {
    /// Height of the last submitted finality vote.
    pub last_voted_height: u64,
    /// Height of the last fully processed block (voted or skipped).
    pub last_processed_height: u64,
    /// End of the last confirmed public-randomness commitment.
    pub last_committed_height: u64,
}

impl Bookmarks {
    /// Check the `voted <= processed <= committed` ordering.
    pub fn check_order(&self) -> StoreResult<()> {
        if self.last_voted_height > self.last_processed_height
            || self.last_processed_height > self.last_committed_height
        {
            return Err(StoreError::BookmarkOrder {
                voted: self.last_voted_height,
                processed: self.last_processed_height,
                committed: self.last_committed_height,
            });
        }
        Ok(())
    }

    /// Check that no field of `next` is below the corresponding field here.
    pub fn check_monotonic(&self, next: &Bookmarks) -> StoreResult<()> {
        let fields: [(&'static str, u64, u64); 3] = [
            (
                "last_voted_height",
                self.last_voted_height,
                next.last_voted_height,
            ),
            (
                "last_processed_height",
                self.last_processed_height,
                next.last_processed_height,
            ),
            (
                "last_committed_height",
                self.last_committed_height,
                next.last_committed_height,
            ),
        ];
        for (field, stored, requested) in fields {
            if requested < stored {
                return Err(StoreError::BookmarkRegression {
                    field,
                    stored,
                    requested,
                });
            }
        }
        Ok(())
    }
}

/// Persisted record of a finality provider.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFinalityProvider {
    /// BIP340 x-only public key; the primary key of this record.
    pub btc_pk: BtcPublicKey,
    /// Compressed secp256k1 public key on the consumer chain.
    #[serde_as(as = "Bytes")]
    pub chain_pk: ChainPublicKey,
    /// Operator-chosen label.
    pub description: String,
    /// Lifecycle status.
    pub status: ProviderStatus,
    /// Voting bookmarks.
    pub bookmarks: Bookmarks,
}

impl StoredFinalityProvider {
    /// Create a fresh record in `Created` status with zeroed bookmarks.
    pub fn new(btc_pk: BtcPublicKey, chain_pk: ChainPublicKey, description: String) -> Self {
        Self {
            btc_pk,
            chain_pk,
            description,
            status: ProviderStatus::Created,
            bookmarks: Bookmarks::default(),
        }
    }
}

/// Persisted proof that a vote was submitted at a height.
///
/// At most one record may exist per (provider, height); its presence with a
/// different hash is definitive proof that signing again would be unsafe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredVoteRecord {
    /// Voted height.
    pub height: u64,
    /// Hash of the block the vote signed.
    pub block_hash: Hash,
    /// The EOTS signature that was submitted.
    pub signature: EotsSignature,
}
