//! Test helpers: scripted mock implementations of the outbound ports and
//! builders for keys, blocks, and registered providers.
//!
//! Used by the in-crate unit tests and the integration scenarios under
//! `tests/`.

use crate::error::{ProviderError, ProviderResult};
use crate::ports::{ChainController, EotsSigner, FinalityVote};
use async_trait::async_trait;
use fp_store::{InMemoryKvStore, ProviderStatus, ProviderStore, StoredFinalityProvider};
use fp_types::{
    BlockInfo, BtcPublicKey, ChainPublicKey, EotsSignature, Hash, ProofOfPossession,
    PublicRandomness, SchnorrSignature, TxResponse,
};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Deterministic test key for a provider.
pub fn test_btc_pk(tag: u8) -> BtcPublicKey {
    [tag; 32]
}

/// Deterministic test chain key for a provider.
pub fn test_chain_pk(tag: u8) -> ChainPublicKey {
    [tag; 33]
}

/// Placeholder proof of possession.
pub fn test_pop() -> ProofOfPossession {
    ProofOfPossession {
        btc_sig: [0x55; 64],
        chain_sig: vec![0x66; 64],
    }
}

/// Deterministic canonical hash for the block at a height.
pub fn test_block_hash(height: u64) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(b"test-block");
    hasher.update(height.to_be_bytes());
    let digest = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&digest);
    hash
}

/// The canonical test block at a height.
pub fn test_block(height: u64) -> BlockInfo {
    BlockInfo::new(height, test_block_hash(height))
}

/// Create a provider record in `Registered` status.
pub fn registered_provider(store: &ProviderStore<InMemoryKvStore>, tag: u8) -> BtcPublicKey {
    let btc_pk = test_btc_pk(tag);
    let record =
        StoredFinalityProvider::new(btc_pk, test_chain_pk(tag), format!("test-provider-{tag}"));
    store.create_provider(&record).unwrap();
    store.set_status(&btc_pk, ProviderStatus::Registered).unwrap();
    btc_pk
}

fn tx_hash(domain: &str, height: u64) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(domain.as_bytes());
    hasher.update(height.to_be_bytes());
    let digest = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&digest);
    hash
}

#[derive(Default)]
struct MockChainState {
    tip: u64,
    blocks: BTreeMap<u64, BlockInfo>,
    default_power: u64,
    power_overrides: HashMap<u64, u64>,
    last_committed: Option<u64>,
    commits: Vec<(u64, u64)>,
    votes: HashMap<u64, FinalityVote>,
    finalized_height: Option<u64>,
    fail_queries: u32,
    fail_submissions: u32,
    corrupt_mapping: bool,
    registered: bool,
}

/// Scripted chain controller.
///
/// Maintains a canonical test chain, records every submission, and supports
/// injected failures for both reads and submissions.
pub struct MockChainController {
    state: Mutex<MockChainState>,
    bulk_queries: AtomicUsize,
    commit_calls: AtomicUsize,
    vote_calls: AtomicUsize,
}

impl Default for MockChainController {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChainController {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockChainState {
                default_power: 1,
                ..Default::default()
            }),
            bulk_queries: AtomicUsize::new(0),
            commit_calls: AtomicUsize::new(0),
            vote_calls: AtomicUsize::new(0),
        }
    }

    /// Produce canonical blocks up to and including `height`.
    pub fn extend_chain_to(&self, height: u64) {
        let mut state = self.state.lock();
        for h in 1..=height {
            state.blocks.entry(h).or_insert_with(|| test_block(h));
        }
        state.tip = state.tip.max(height);
    }

    /// Override the voting power at one height.
    pub fn set_voting_power(&self, height: u64, power: u64) {
        self.state.lock().power_overrides.insert(height, power);
    }

    /// Set the power returned for heights without an override.
    pub fn set_default_power(&self, power: u64) {
        self.state.lock().default_power = power;
    }

    /// Pretend a commitment through `height` is already confirmed on chain.
    pub fn set_last_committed(&self, height: u64) {
        self.state.lock().last_committed = Some(height);
    }

    /// Mark everything through `height` as finalized.
    pub fn set_finalized_height(&self, height: u64) {
        self.state.lock().finalized_height = Some(height);
    }

    /// Record a confirmed vote on chain without going through submission.
    pub fn seed_vote(&self, vote: FinalityVote) {
        self.state.lock().votes.insert(vote.height, vote);
    }

    /// Fail the next `n` read queries with a transient error.
    pub fn fail_next_queries(&self, n: u32) {
        self.state.lock().fail_queries = n;
    }

    /// Fail the next `n` submissions with a transient error.
    pub fn fail_next_submissions(&self, n: u32) {
        self.state.lock().fail_submissions = n;
    }

    /// Make `query_block(h)` answer with the block at `h + 1`.
    pub fn corrupt_height_mapping(&self) {
        self.state.lock().corrupt_mapping = true;
    }

    pub fn bulk_query_count(&self) -> usize {
        self.bulk_queries.load(Ordering::SeqCst)
    }

    pub fn commit_count(&self) -> usize {
        self.commit_calls.load(Ordering::SeqCst)
    }

    pub fn vote_count(&self) -> usize {
        self.vote_calls.load(Ordering::SeqCst)
    }

    /// Committed `(start_height, num_pub_rand)` ranges, in order.
    pub fn committed_ranges(&self) -> Vec<(u64, u64)> {
        self.state.lock().commits.clone()
    }

    /// The vote recorded on chain at a height, if any.
    pub fn recorded_vote(&self, height: u64) -> Option<FinalityVote> {
        self.state.lock().votes.get(&height).copied()
    }

    pub fn is_registered(&self) -> bool {
        self.state.lock().registered
    }

    fn check_query_failure(&self) -> ProviderResult<()> {
        let mut state = self.state.lock();
        if state.fail_queries > 0 {
            state.fail_queries -= 1;
            return Err(ProviderError::ChainQuery {
                reason: "injected query failure".into(),
            });
        }
        Ok(())
    }

    fn check_submission_failure(&self) -> ProviderResult<()> {
        let mut state = self.state.lock();
        if state.fail_submissions > 0 {
            state.fail_submissions -= 1;
            return Err(ProviderError::ChainSubmission {
                reason: "injected submission failure".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ChainController for MockChainController {
    async fn register_finality_provider(
        &self,
        _chain_pk: &ChainPublicKey,
        _btc_pk: &BtcPublicKey,
        _pop: &ProofOfPossession,
    ) -> ProviderResult<TxResponse> {
        self.check_submission_failure()?;
        self.state.lock().registered = true;
        Ok(TxResponse::new(tx_hash("register", 0)))
    }

    async fn commit_pub_rand(
        &self,
        _btc_pk: &BtcPublicKey,
        start_height: u64,
        num_pub_rand: u64,
        _commitment: &Hash,
        _signature: &SchnorrSignature,
    ) -> ProviderResult<TxResponse> {
        self.check_submission_failure()?;
        self.commit_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        state.commits.push((start_height, num_pub_rand));
        let end = start_height + num_pub_rand - 1;
        state.last_committed = Some(state.last_committed.map_or(end, |h| h.max(end)));
        Ok(TxResponse::new(tx_hash("commit", start_height)))
    }

    async fn submit_finality_sig(
        &self,
        _btc_pk: &BtcPublicKey,
        height: u64,
        block_hash: &Hash,
        signature: &EotsSignature,
    ) -> ProviderResult<TxResponse> {
        self.check_submission_failure()?;
        self.vote_calls.fetch_add(1, Ordering::SeqCst);
        self.state.lock().votes.insert(
            height,
            FinalityVote {
                height,
                block_hash: *block_hash,
                signature: *signature,
            },
        );
        Ok(TxResponse::new(tx_hash("vote", height)))
    }

    async fn query_voting_power(
        &self,
        _btc_pk: &BtcPublicKey,
        height: u64,
    ) -> ProviderResult<u64> {
        self.check_query_failure()?;
        let state = self.state.lock();
        Ok(state
            .power_overrides
            .get(&height)
            .copied()
            .unwrap_or(state.default_power))
    }

    async fn query_last_committed_pub_rand_height(
        &self,
        _btc_pk: &BtcPublicKey,
    ) -> ProviderResult<Option<u64>> {
        self.check_query_failure()?;
        Ok(self.state.lock().last_committed)
    }

    async fn query_latest_finalized_height(&self) -> ProviderResult<Option<u64>> {
        self.check_query_failure()?;
        Ok(self.state.lock().finalized_height)
    }

    async fn query_chain_tip(&self) -> ProviderResult<BlockInfo> {
        self.check_query_failure()?;
        let state = self.state.lock();
        Ok(state
            .blocks
            .get(&state.tip)
            .copied()
            .unwrap_or_default())
    }

    async fn query_block(&self, height: u64) -> ProviderResult<Option<BlockInfo>> {
        self.check_query_failure()?;
        let state = self.state.lock();
        let lookup = if state.corrupt_mapping {
            height + 1
        } else {
            height
        };
        Ok(state.blocks.get(&lookup).copied())
    }

    async fn query_blocks(
        &self,
        start_height: u64,
        end_height: u64,
    ) -> ProviderResult<Vec<BlockInfo>> {
        self.check_query_failure()?;
        self.bulk_queries.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock();
        Ok(state
            .blocks
            .range(start_height..=end_height)
            .map(|(_, b)| *b)
            .collect())
    }

    async fn query_finality_vote(
        &self,
        _btc_pk: &BtcPublicKey,
        height: u64,
    ) -> ProviderResult<Option<FinalityVote>> {
        self.check_query_failure()?;
        Ok(self.state.lock().votes.get(&height).copied())
    }
}

#[derive(Default)]
struct MockSignerState {
    derived: HashSet<u64>,
    signed: HashMap<u64, Vec<u8>>,
    fail_next: u32,
}

/// Deterministic EOTS signer with randomness-reuse detection.
///
/// Tracks which heights have derived randomness and which messages were
/// signed, refusing a second, different message at a height exactly as a
/// real backend is expected to.
#[derive(Default)]
pub struct MockEotsSigner {
    state: Mutex<MockSignerState>,
}

impl MockEotsSigner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` signer calls with a transient error.
    pub fn fail_next(&self, n: u32) {
        self.state.lock().fail_next = n;
    }

    /// Heights with derived randomness.
    pub fn derived_heights(&self) -> Vec<u64> {
        let mut heights: Vec<u64> = self.state.lock().derived.iter().copied().collect();
        heights.sort_unstable();
        heights
    }

    fn check_failure(&self) -> ProviderResult<()> {
        let mut state = self.state.lock();
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(ProviderError::SignerUnavailable {
                reason: "injected signer failure".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl EotsSigner for MockEotsSigner {
    async fn pub_rand_list(
        &self,
        btc_pk: &BtcPublicKey,
        start_height: u64,
        num: u64,
    ) -> ProviderResult<Vec<PublicRandomness>> {
        self.check_failure()?;
        let mut state = self.state.lock();
        let mut values = Vec::with_capacity(num as usize);
        for height in start_height..start_height + num {
            state.derived.insert(height);
            let mut hasher = Sha256::new();
            hasher.update(b"pub-rand");
            hasher.update(btc_pk);
            hasher.update(height.to_be_bytes());
            let digest = hasher.finalize();
            let mut value = [0u8; 32];
            value.copy_from_slice(&digest);
            values.push(value);
        }
        Ok(values)
    }

    async fn sign_eots(
        &self,
        btc_pk: &BtcPublicKey,
        height: u64,
        msg: &[u8],
    ) -> ProviderResult<EotsSignature> {
        self.check_failure()?;
        let mut state = self.state.lock();
        if !state.derived.contains(&height) {
            return Err(ProviderError::MissingRandomness { height });
        }
        if let Some(previous) = state.signed.get(&height) {
            if previous != msg {
                return Err(ProviderError::RandomnessReuse { height });
            }
        }
        state.signed.insert(height, msg.to_vec());

        let mut hasher = Sha256::new();
        hasher.update(b"eots-sig");
        hasher.update(btc_pk);
        hasher.update(height.to_be_bytes());
        hasher.update(msg);
        let digest = hasher.finalize();
        let mut sig = [0u8; 32];
        sig.copy_from_slice(&digest);
        Ok(sig)
    }

    async fn sign_schnorr(
        &self,
        btc_pk: &BtcPublicKey,
        msg: &[u8],
    ) -> ProviderResult<SchnorrSignature> {
        self.check_failure()?;
        let mut hasher = Sha256::new();
        hasher.update(b"schnorr-sig");
        hasher.update(btc_pk);
        hasher.update(msg);
        let digest = hasher.finalize();
        let mut sig = [0u8; 64];
        sig[..32].copy_from_slice(&digest);
        sig[32..].copy_from_slice(&digest);
        Ok(sig)
    }
}
