//! Outbound ports (driven side - SPI)
//!
//! The two external collaborators of the voting pipeline: the consumer-chain
//! client and the EOTS signing backend. Both hold the complexity this crate
//! deliberately excludes (wire formats, key custody); the pipeline only
//! depends on these interfaces.

use crate::error::ProviderResult;
use async_trait::async_trait;
use fp_types::{
    BlockInfo, BtcPublicKey, ChainPublicKey, EotsSignature, Hash, ProofOfPossession,
    PublicRandomness, SchnorrSignature, TxResponse,
};

/// Port: submit transactions to and query the consumer chain.
#[async_trait]
pub trait ChainController: Send + Sync {
    /// Submit the registration transaction for a new finality provider.
    async fn register_finality_provider(
        &self,
        chain_pk: &ChainPublicKey,
        btc_pk: &BtcPublicKey,
        pop: &ProofOfPossession,
    ) -> ProviderResult<TxResponse>;

    /// Submit a public-randomness commitment covering
    /// `[start_height, start_height + num_pub_rand)`.
    async fn commit_pub_rand(
        &self,
        btc_pk: &BtcPublicKey,
        start_height: u64,
        num_pub_rand: u64,
        commitment: &Hash,
        signature: &SchnorrSignature,
    ) -> ProviderResult<TxResponse>;

    /// Submit a finality vote for the block at `height`.
    async fn submit_finality_sig(
        &self,
        btc_pk: &BtcPublicKey,
        height: u64,
        block_hash: &Hash,
        signature: &EotsSignature,
    ) -> ProviderResult<TxResponse>;

    /// Voting power of the provider at a height.
    async fn query_voting_power(&self, btc_pk: &BtcPublicKey, height: u64)
        -> ProviderResult<u64>;

    /// Highest height covered by a confirmed randomness commitment, if any.
    async fn query_last_committed_pub_rand_height(
        &self,
        btc_pk: &BtcPublicKey,
    ) -> ProviderResult<Option<u64>>;

    /// Latest finalized height, if any block is finalized yet.
    async fn query_latest_finalized_height(&self) -> ProviderResult<Option<u64>>;

    /// Current chain tip.
    async fn query_chain_tip(&self) -> ProviderResult<BlockInfo>;

    /// The block at a height, if the chain has produced it.
    async fn query_block(&self, height: u64) -> ProviderResult<Option<BlockInfo>>;

    /// Blocks in `[start_height, end_height]`, ascending. Used for bulk
    /// catch-up during bootstrap.
    async fn query_blocks(
        &self,
        start_height: u64,
        end_height: u64,
    ) -> ProviderResult<Vec<BlockInfo>>;

    /// The provider's confirmed finality vote at a height, if one exists.
    /// Used during reconciliation after a restart.
    async fn query_finality_vote(
        &self,
        btc_pk: &BtcPublicKey,
        height: u64,
    ) -> ProviderResult<Option<FinalityVote>>;
}

/// A finality vote as recorded on chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalityVote {
    /// Voted height.
    pub height: u64,
    /// Hash of the voted block.
    pub block_hash: Hash,
    /// The submitted EOTS signature.
    pub signature: EotsSignature,
}

/// Port: derive one-time randomness and sign with the provider's keys.
///
/// The backend owns the private material. It must derive deterministically
/// (repeated calls for the same height return the same value) and is
/// expected to refuse signing a second, different message at a height it has
/// already signed, independently of the instance's own bookkeeping.
#[async_trait]
pub trait EotsSigner: Send + Sync {
    /// Derive the public randomness values for `num` consecutive heights
    /// starting at `start_height`. Deterministic and idempotent.
    async fn pub_rand_list(
        &self,
        btc_pk: &BtcPublicKey,
        start_height: u64,
        num: u64,
    ) -> ProviderResult<Vec<PublicRandomness>>;

    /// Produce an EOTS signature over `msg` bound to `height`.
    ///
    /// Fails with `MissingRandomness` if no randomness was derived for the
    /// height, and with `RandomnessReuse` if a different message was already
    /// signed at it.
    async fn sign_eots(
        &self,
        btc_pk: &BtcPublicKey,
        height: u64,
        msg: &[u8],
    ) -> ProviderResult<EotsSignature>;

    /// Produce a plain Schnorr signature (used for commitment batches).
    async fn sign_schnorr(
        &self,
        btc_pk: &BtcPublicKey,
        msg: &[u8],
    ) -> ProviderResult<SchnorrSignature>;
}
