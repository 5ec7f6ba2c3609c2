//! # Core Domain Entities
//!
//! Fixed-size byte primitives and the small value objects shared by the
//! store and the service layer.

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};

/// A 32-byte hash (SHA-256).
pub type Hash = [u8; 32];

/// A 32-byte BIP340 x-only public key identifying a finality provider.
///
/// This is the primary key of every persisted record.
pub type BtcPublicKey = [u8; 32];

/// A 33-byte compressed secp256k1 public key on the consumer chain.
pub type ChainPublicKey = [u8; 33];

/// A 32-byte one-time public randomness value (Schnorr nonce x-coordinate).
pub type PublicRandomness = [u8; 32];

/// A 64-byte Schnorr signature (used for randomness commitments).
pub type SchnorrSignature = [u8; 64];

/// A 32-byte EOTS signature scalar over a block hash.
///
/// Producing two of these for different messages at the same height with the
/// same randomness reveals the signing key.
pub type EotsSignature = [u8; 32];

/// A block observed on the consumer chain.
///
/// Immutable once observed; ordering is by height and exactly one canonical
/// hash exists per height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BlockInfo {
    /// Block height in the chain.
    pub height: u64,
    /// Canonical block hash at this height.
    pub hash: Hash,
}

impl BlockInfo {
    /// Create a new block info.
    pub fn new(height: u64, hash: Hash) -> Self {
        Self { height, hash }
    }
}

/// Response returned for every submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TxResponse {
    /// Hash of the accepted transaction.
    pub tx_hash: Hash,
}

impl TxResponse {
    /// Create a response from a transaction hash.
    pub fn new(tx_hash: Hash) -> Self {
        Self { tx_hash }
    }
}

/// Proof that the operator controls both the BTC key and the chain key.
///
/// Submitted once during registration.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofOfPossession {
    /// Schnorr signature by the BTC key over the chain public key.
    #[serde_as(as = "Bytes")]
    pub btc_sig: SchnorrSignature,
    /// Signature by the chain key over the BTC public key.
    pub chain_sig: Vec<u8>,
}

/// Render the first eight bytes of a byte string as lowercase hex.
///
/// Log-friendly form for keys and hashes.
pub fn short_hex(bytes: &[u8]) -> String {
    let take = bytes.len().min(8);
    hex::encode(&bytes[..take])
}
