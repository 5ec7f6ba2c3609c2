//! Key layout of the provider store.
//!
//! All keys are namespaced so the store can share a key-value database with
//! other components:
//!
//! ```text
//! fp/p/<btc_pk>                 -> StoredFinalityProvider (bincode)
//! fp/v/<btc_pk>/<height BE u64> -> StoredVoteRecord (bincode)
//! ```
//!
//! Vote keys encode the height big-endian so a prefix scan returns records
//! in height order.

use fp_types::BtcPublicKey;

/// Key construction helpers.
pub struct KeyPrefix;

impl KeyPrefix {
    /// Namespace for provider records.
    pub const PROVIDER: &'static [u8] = b"fp/p/";

    /// Namespace for vote records.
    pub const VOTE: &'static [u8] = b"fp/v/";

    /// Key of a provider record.
    pub fn provider_key(btc_pk: &BtcPublicKey) -> Vec<u8> {
        let mut key = Vec::with_capacity(Self::PROVIDER.len() + btc_pk.len());
        key.extend_from_slice(Self::PROVIDER);
        key.extend_from_slice(btc_pk);
        key
    }

    /// Key of a vote record at a height.
    pub fn vote_key(btc_pk: &BtcPublicKey, height: u64) -> Vec<u8> {
        let mut key = Self::vote_prefix(btc_pk);
        key.extend_from_slice(&height.to_be_bytes());
        key
    }

    /// Prefix covering all vote records of one provider.
    pub fn vote_prefix(btc_pk: &BtcPublicKey) -> Vec<u8> {
        let mut key = Vec::with_capacity(Self::VOTE.len() + btc_pk.len() + 1 + 8);
        key.extend_from_slice(Self::VOTE);
        key.extend_from_slice(btc_pk);
        key.push(b'/');
        key
    }
}
