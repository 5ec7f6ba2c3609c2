//! # Finality Provider Instance
//!
//! The per-provider state machine. One instance exists per registered key
//! and runs on its own dedicated task: polling, randomness commitment, and
//! voting for a single provider are strictly serialized, which is what makes
//! the at-most-once-per-height rule enforceable without any locking on the
//! bookmarks.
//!
//! ## Block processing
//!
//! For every polled block, in height order:
//!
//! 1. Ignore heights at or below `last_processed_height` (duplicate
//!    delivery), unless the stored vote at that height carries a different
//!    hash, which is an unrecoverable conflict.
//! 2. Ensure committed randomness reaches `height + min_rand_lookahead`,
//!    committing a new batch first if it does not.
//! 3. Skip voting (but advance `last_processed_height`) when the provider
//!    has no voting power at the height.
//! 4. Treat an existing identical vote record as a completed retry.
//! 5. Sign with the height-bound randomness, submit, then persist the vote
//!    record and bookmark advance in one atomic batch. Persistence never
//!    precedes submission success.
//!
//! Transient failures leave every bookmark untouched and bubble to the run
//! loop for retry of the same block. Safety-critical failures emit one
//! `CriticalError` and halt the loop.

use crate::config::FinalityProviderConfig;
use crate::domain::commitment::{commitment_message, commitment_root};
use crate::domain::entities::{InstanceState, PubRandCommit};
use crate::domain::invariants;
use crate::error::{CriticalError, ProviderError, ProviderResult};
use crate::metrics;
use crate::ports::{ChainController, EotsSigner};
use fp_store::{Bookmarks, KeyValueStore, ProviderStatus, ProviderStore, StoredVoteRecord};
use fp_types::{short_hex, BlockInfo, BtcPublicKey, TxResponse};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// State machine for one finality provider.
pub struct FinalityProviderInstance<C, E, KV>
where
    C: ChainController,
    E: EotsSigner,
    KV: KeyValueStore,
{
    btc_pk: BtcPublicKey,
    config: Arc<FinalityProviderConfig>,
    store: Arc<ProviderStore<KV>>,
    controller: Arc<C>,
    signer: Arc<E>,
    critical_tx: mpsc::Sender<CriticalError>,
    state: InstanceState,
    status: ProviderStatus,
    bookmarks: Bookmarks,
}

impl<C, E, KV> FinalityProviderInstance<C, E, KV>
where
    C: ChainController + 'static,
    E: EotsSigner + 'static,
    KV: KeyValueStore + 'static,
{
    /// Load the instance for a registered provider.
    ///
    /// The persisted record must exist and be in a startable status.
    pub fn new(
        btc_pk: BtcPublicKey,
        config: Arc<FinalityProviderConfig>,
        store: Arc<ProviderStore<KV>>,
        controller: Arc<C>,
        signer: Arc<E>,
        critical_tx: mpsc::Sender<CriticalError>,
    ) -> ProviderResult<Self> {
        config.validate()?;
        let record = store.get_provider(&btc_pk)?;
        match record.status {
            ProviderStatus::Created => {
                return Err(ProviderError::NotRegistered {
                    btc_pk: short_hex(&btc_pk),
                })
            }
            ProviderStatus::Slashed => {
                return Err(ProviderError::Slashed {
                    btc_pk: short_hex(&btc_pk),
                })
            }
            _ => {}
        }
        Ok(Self {
            btc_pk,
            config,
            store,
            controller,
            signer,
            critical_tx,
            state: InstanceState::Stopped,
            status: record.status,
            bookmarks: record.bookmarks,
        })
    }

    pub fn btc_pk(&self) -> &BtcPublicKey {
        &self.btc_pk
    }

    pub fn state(&self) -> InstanceState {
        self.state
    }

    pub fn status(&self) -> ProviderStatus {
        self.status
    }

    pub fn last_voted_height(&self) -> u64 {
        self.bookmarks.last_voted_height
    }

    pub fn last_processed_height(&self) -> u64 {
        self.bookmarks.last_processed_height
    }

    pub fn last_committed_height(&self) -> u64 {
        self.bookmarks.last_committed_height
    }

    /// Resolve divergence between the persisted record and chain state.
    ///
    /// The persisted record is ground truth for what this instance believes;
    /// chain-confirmed facts it is missing (a commitment or vote accepted
    /// right before a crash) are folded back in before processing resumes.
    pub async fn reconcile(&mut self) -> ProviderResult<()> {
        if let Some(chain_committed) = self
            .controller
            .query_last_committed_pub_rand_height(&self.btc_pk)
            .await?
        {
            if chain_committed > self.bookmarks.last_committed_height {
                info!(
                    btc_pk = %short_hex(&self.btc_pk),
                    local = self.bookmarks.last_committed_height,
                    chain = chain_committed,
                    "chain has newer randomness commitment; adopting"
                );
                let next = Bookmarks {
                    last_committed_height: chain_committed,
                    ..self.bookmarks
                };
                self.store.update_bookmarks(&self.btc_pk, next)?;
                self.bookmarks = next;
            }
        }

        // Votes accepted on chain that were lost to a crash before the local
        // record was written.
        loop {
            let height = self.bookmarks.last_voted_height + 1;
            let Some(vote) = self
                .controller
                .query_finality_vote(&self.btc_pk, height)
                .await?
            else {
                break;
            };
            warn!(
                btc_pk = %short_hex(&self.btc_pk),
                height,
                "chain has a confirmed vote missing locally; restoring record"
            );
            let record = StoredVoteRecord {
                height: vote.height,
                block_hash: vote.block_hash,
                signature: vote.signature,
            };
            let next = Bookmarks {
                last_voted_height: vote.height,
                last_processed_height: self.bookmarks.last_processed_height.max(vote.height),
                last_committed_height: self.bookmarks.last_committed_height.max(vote.height),
            };
            self.store.record_vote(&self.btc_pk, &record, next)?;
            self.bookmarks = next;
        }

        Ok(())
    }

    /// Process one polled block. Called in strict height order.
    pub async fn process_block(&mut self, block: &BlockInfo) -> ProviderResult<Option<TxResponse>> {
        if block.height <= self.bookmarks.last_processed_height {
            // Replay of a processed height. Harmless unless it contradicts a
            // vote this provider already signed.
            if let Some(existing) = self.store.vote_record(&self.btc_pk, block.height)? {
                if existing.block_hash != block.hash {
                    return Err(ProviderError::DuplicateVote {
                        height: block.height,
                        recorded: short_hex(&existing.block_hash),
                        received: short_hex(&block.hash),
                    });
                }
            }
            debug!(
                height = block.height,
                last_processed = self.bookmarks.last_processed_height,
                "block at or below last processed height; ignoring"
            );
            return Ok(None);
        }

        if invariants::needs_commit(
            self.bookmarks.last_committed_height,
            block.height,
            self.config.min_rand_lookahead,
        ) {
            self.commit_pub_rand(block.height).await?;
        }

        let power = self
            .controller
            .query_voting_power(&self.btc_pk, block.height)
            .await?;
        self.sync_status_with_power(power)?;
        if power == 0 {
            info!(
                btc_pk = %short_hex(&self.btc_pk),
                height = block.height,
                "zero voting power; advancing without vote"
            );
            self.advance_processed(block.height)?;
            return Ok(None);
        }

        if let Some(existing) = self.store.vote_record(&self.btc_pk, block.height)? {
            if existing.block_hash == block.hash {
                debug!(
                    height = block.height,
                    "vote already recorded for this block; completing as no-op"
                );
                self.advance_processed(block.height)?;
                return Ok(None);
            }
            return Err(ProviderError::DuplicateVote {
                height: block.height,
                recorded: short_hex(&existing.block_hash),
                received: short_hex(&block.hash),
            });
        }

        let res = self.submit_finality_sig(block).await?;
        Ok(Some(res))
    }

    /// Commit the next batch of public randomness if the lookahead rule
    /// requires it before processing `target_height`.
    ///
    /// Bookmarks advance only after the commitment transaction is accepted.
    pub async fn commit_pub_rand(&mut self, target_height: u64) -> ProviderResult<Option<TxResponse>> {
        let committed = self.bookmarks.last_committed_height;
        if !invariants::needs_commit(committed, target_height, self.config.min_rand_lookahead) {
            return Ok(None);
        }

        let start = invariants::next_commit_start(committed, target_height);
        let num = invariants::commit_batch_size(
            self.config.num_pub_rand,
            start,
            target_height,
            self.config.max_committed_gap,
        );
        if num == 0 {
            // Gap cap reached; a validated config keeps this branch from
            // starving a needed commit.
            return Ok(None);
        }

        let values = self.signer.pub_rand_list(&self.btc_pk, start, num).await?;
        let root = commitment_root(&values);
        let msg = commitment_message(start, num, &root);
        let signature = self.signer.sign_schnorr(&self.btc_pk, &msg).await?;
        let commit = PubRandCommit {
            start_height: start,
            num_pub_rand: num,
            commitment: root,
            signature,
        };
        let res = self
            .controller
            .commit_pub_rand(
                &self.btc_pk,
                commit.start_height,
                commit.num_pub_rand,
                &commit.commitment,
                &commit.signature,
            )
            .await?;

        let next = Bookmarks {
            last_committed_height: commit.end_height(),
            ..self.bookmarks
        };
        self.store.update_bookmarks(&self.btc_pk, next)?;
        self.bookmarks = next;
        metrics::record_pub_rand_committed(num);
        info!(
            btc_pk = %short_hex(&self.btc_pk),
            start_height = commit.start_height,
            num_pub_rand = commit.num_pub_rand,
            tx_hash = %short_hex(&res.tx_hash),
            "public randomness committed"
        );
        Ok(Some(res))
    }

    /// Sign the block with its height-bound randomness and submit the vote.
    ///
    /// The vote record and the bookmark advance are persisted in one atomic
    /// batch, strictly after submission success.
    pub async fn submit_finality_sig(&mut self, block: &BlockInfo) -> ProviderResult<TxResponse> {
        if self.bookmarks.last_committed_height < block.height {
            return Err(ProviderError::MissingRandomness {
                height: block.height,
            });
        }

        let signature = self
            .signer
            .sign_eots(&self.btc_pk, block.height, &block.hash)
            .await?;
        let res = self
            .controller
            .submit_finality_sig(&self.btc_pk, block.height, &block.hash, &signature)
            .await?;

        let record = StoredVoteRecord {
            height: block.height,
            block_hash: block.hash,
            signature,
        };
        let next = Bookmarks {
            last_voted_height: block.height,
            last_processed_height: block.height,
            last_committed_height: self.bookmarks.last_committed_height,
        };
        self.store.record_vote(&self.btc_pk, &record, next)?;
        self.bookmarks = next;
        metrics::record_vote_submitted(block.height);
        info!(
            btc_pk = %short_hex(&self.btc_pk),
            height = block.height,
            tx_hash = %short_hex(&res.tx_hash),
            "finality vote submitted"
        );
        Ok(res)
    }

    /// Consume the block stream until shutdown, stream close, or a critical
    /// fault.
    pub async fn run(
        mut self,
        mut blocks: mpsc::Receiver<BlockInfo>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        self.state = InstanceState::Started;
        info!(btc_pk = %short_hex(&self.btc_pk), "finality provider instance started");
        let poll_interval = Duration::from_millis(self.config.poller.poll_interval_ms);
        let mut pending: Option<BlockInfo> = None;

        loop {
            let block = match pending.take() {
                Some(block) => block,
                None => tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                        continue;
                    }
                    maybe = blocks.recv() => match maybe {
                        Some(block) => block,
                        None => {
                            warn!(
                                btc_pk = %short_hex(&self.btc_pk),
                                "block stream closed; instance stopping"
                            );
                            break;
                        }
                    }
                },
            };

            match self.process_block_with_retry(&block).await {
                Ok(_) => {
                    metrics::set_last_processed_height(self.bookmarks.last_processed_height);
                }
                Err(e) if e.is_critical() => {
                    error!(
                        btc_pk = %short_hex(&self.btc_pk),
                        height = block.height,
                        error = %e,
                        "unrecoverable fault; halting instance"
                    );
                    metrics::record_critical_error();
                    let critical = CriticalError {
                        btc_pk: self.btc_pk,
                        cause: e,
                    };
                    if let Err(send_err) = self.critical_tx.try_send(critical) {
                        error!(error = %send_err, "critical-error channel unavailable");
                    }
                    break;
                }
                Err(e) => {
                    warn!(
                        btc_pk = %short_hex(&self.btc_pk),
                        height = block.height,
                        error = %e,
                        "block not processed; retrying at poll cadence"
                    );
                    pending = Some(block);
                    tokio::select! {
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                break;
                            }
                        }
                        _ = tokio::time::sleep(poll_interval) => {}
                    }
                }
            }
        }

        self.state = InstanceState::Stopped;
        info!(btc_pk = %short_hex(&self.btc_pk), "finality provider instance stopped");
    }

    /// Bounded fast retries for transient failures of one block.
    async fn process_block_with_retry(
        &mut self,
        block: &BlockInfo,
    ) -> ProviderResult<Option<TxResponse>> {
        let backoff = Duration::from_millis(self.config.submission_retry_backoff_ms);
        let cap = backoff * 10;
        let mut delay = backoff;
        let mut attempt = 0u32;
        loop {
            match self.process_block(block).await {
                Err(e) if e.is_transient() && attempt < self.config.submission_retries => {
                    attempt += 1;
                    warn!(
                        height = block.height,
                        attempt,
                        error = %e,
                        "transient failure; retrying block"
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(cap);
                }
                other => return other,
            }
        }
    }

    fn advance_processed(&mut self, height: u64) -> ProviderResult<()> {
        let next = Bookmarks {
            last_processed_height: height,
            ..self.bookmarks
        };
        self.store.update_bookmarks(&self.btc_pk, next)?;
        self.bookmarks = next;
        Ok(())
    }

    /// Keep the stored status in step with observed voting power.
    fn sync_status_with_power(&mut self, power: u64) -> ProviderResult<()> {
        let next = match (self.status, power) {
            (ProviderStatus::Registered | ProviderStatus::Inactive, p) if p > 0 => {
                ProviderStatus::Active
            }
            (ProviderStatus::Active, 0) => ProviderStatus::Inactive,
            _ => return Ok(()),
        };
        self.store.set_status(&self.btc_pk, next)?;
        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        registered_provider, test_block, MockChainController, MockEotsSigner,
    };
    use fp_store::InMemoryKvStore;

    type TestInstance =
        FinalityProviderInstance<MockChainController, MockEotsSigner, InMemoryKvStore>;

    struct Harness {
        instance: TestInstance,
        controller: Arc<MockChainController>,
        signer: Arc<MockEotsSigner>,
        store: Arc<ProviderStore<InMemoryKvStore>>,
        critical_rx: mpsc::Receiver<CriticalError>,
    }

    fn harness() -> Harness {
        let store = Arc::new(ProviderStore::new(InMemoryKvStore::new()));
        let btc_pk = registered_provider(&store, 1);
        let controller = Arc::new(MockChainController::new());
        let signer = Arc::new(MockEotsSigner::new());
        let (critical_tx, critical_rx) = mpsc::channel(4);
        let instance = FinalityProviderInstance::new(
            btc_pk,
            Arc::new(FinalityProviderConfig::for_testing()),
            Arc::clone(&store),
            Arc::clone(&controller),
            Arc::clone(&signer),
            critical_tx,
        )
        .unwrap();
        Harness {
            instance,
            controller,
            signer,
            store,
            critical_rx,
        }
    }

    #[tokio::test]
    async fn test_new_rejects_unregistered_provider() {
        let store = Arc::new(ProviderStore::new(InMemoryKvStore::new()));
        let btc_pk = crate::test_utils::test_btc_pk(9);
        let record = fp_store::StoredFinalityProvider::new(
            btc_pk,
            crate::test_utils::test_chain_pk(9),
            "unregistered".into(),
        );
        store.create_provider(&record).unwrap();

        let (critical_tx, _critical_rx) = mpsc::channel(4);
        let result = FinalityProviderInstance::new(
            btc_pk,
            Arc::new(FinalityProviderConfig::for_testing()),
            store,
            Arc::new(MockChainController::new()),
            Arc::new(MockEotsSigner::new()),
            critical_tx,
        );
        assert!(matches!(result, Err(ProviderError::NotRegistered { .. })));
    }

    #[tokio::test]
    async fn test_first_commit_starts_at_block_height() {
        let mut h = harness();
        h.controller.extend_chain_to(15);

        h.instance.commit_pub_rand(11).await.unwrap().unwrap();
        // Batch of num_pub_rand = 5 covering the block itself.
        assert_eq!(h.controller.committed_ranges(), vec![(11, 5)]);
        assert_eq!(h.instance.last_committed_height(), 15);
        assert_eq!(h.signer.derived_heights(), vec![11, 12, 13, 14, 15]);
    }

    #[tokio::test]
    async fn test_commit_is_noop_within_lookahead() {
        let mut h = harness();
        h.instance.commit_pub_rand(11).await.unwrap();
        // Committed through 15, lookahead 2: height 12 needs nothing.
        assert!(h.instance.commit_pub_rand(12).await.unwrap().is_none());
        assert_eq!(h.controller.commit_count(), 1);
    }

    #[tokio::test]
    async fn test_batches_never_overlap() {
        let mut h = harness();
        h.instance.commit_pub_rand(11).await.unwrap();
        // Height 14 breaches the lookahead (14 + 2 > 15); the next batch
        // must start strictly after the previous end.
        h.instance.commit_pub_rand(14).await.unwrap().unwrap();
        assert_eq!(h.controller.committed_ranges(), vec![(11, 5), (16, 5)]);
    }

    #[tokio::test]
    async fn test_commit_failure_leaves_bookmarks_untouched() {
        let mut h = harness();
        h.controller.fail_next_submissions(1);
        let err = h.instance.commit_pub_rand(11).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(h.instance.last_committed_height(), 0);
        // The retry commits the same range.
        h.instance.commit_pub_rand(11).await.unwrap().unwrap();
        assert_eq!(h.instance.last_committed_height(), 15);
    }

    #[tokio::test]
    async fn test_process_block_votes_and_advances() {
        let mut h = harness();
        let block = test_block(11);
        let res = h.instance.process_block(&block).await.unwrap();
        assert!(res.is_some());
        assert_eq!(h.instance.last_voted_height(), 11);
        assert_eq!(h.instance.last_processed_height(), 11);
        assert_eq!(h.controller.vote_count(), 1);
        assert!(h.controller.recorded_vote(11).is_some());

        // Bookmarks persisted.
        let stored = h.store.get_provider(h.instance.btc_pk()).unwrap();
        assert_eq!(stored.bookmarks.last_voted_height, 11);
    }

    #[tokio::test]
    async fn test_zero_power_advances_without_vote() {
        let mut h = harness();
        h.controller.set_voting_power(20, 0);
        // Prior state as if heights below were handled elsewhere.
        h.instance.commit_pub_rand(20).await.unwrap();

        let res = h.instance.process_block(&test_block(20)).await.unwrap();
        assert!(res.is_none());
        assert_eq!(h.instance.last_processed_height(), 20);
        assert_eq!(h.instance.last_voted_height(), 0);
        assert_eq!(h.controller.vote_count(), 0);
    }

    #[tokio::test]
    async fn test_status_follows_voting_power() {
        let mut h = harness();
        assert_eq!(h.instance.status(), ProviderStatus::Registered);

        h.instance.process_block(&test_block(11)).await.unwrap();
        assert_eq!(h.instance.status(), ProviderStatus::Active);

        h.controller.set_voting_power(12, 0);
        h.instance.process_block(&test_block(12)).await.unwrap();
        assert_eq!(h.instance.status(), ProviderStatus::Inactive);

        h.instance.process_block(&test_block(13)).await.unwrap();
        assert_eq!(h.instance.status(), ProviderStatus::Active);
    }

    #[tokio::test]
    async fn test_vote_refused_without_committed_randomness() {
        let mut h = harness();
        let err = h
            .instance
            .submit_finality_sig(&test_block(11))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProviderError::MissingRandomness { height: 11 }
        ));
        assert_eq!(h.controller.vote_count(), 0);
        assert_eq!(h.instance.last_voted_height(), 0);
    }

    #[tokio::test]
    async fn test_submission_failure_keeps_state_retryable() {
        let mut h = harness();
        h.controller.fail_next_submissions(2);

        // Two attempts in a row die at the commit submission; nothing moves.
        let err = h.instance.process_block(&test_block(11)).await.unwrap_err();
        assert!(err.is_transient());
        let err = h.instance.process_block(&test_block(11)).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(h.instance.last_voted_height(), 0);
        assert_eq!(h.instance.last_committed_height(), 0);

        // The next attempt of the same block succeeds end to end.
        h.instance.process_block(&test_block(11)).await.unwrap();
        assert_eq!(h.instance.last_voted_height(), 11);
        assert_eq!(h.controller.vote_count(), 1);
    }

    #[tokio::test]
    async fn test_replay_identical_block_is_noop() {
        let mut h = harness();
        let block = test_block(30);
        h.instance.process_block(&block).await.unwrap();
        assert_eq!(h.controller.vote_count(), 1);

        let res = h.instance.process_block(&block).await.unwrap();
        assert!(res.is_none());
        assert_eq!(h.controller.vote_count(), 1);
    }

    #[tokio::test]
    async fn test_replay_conflicting_hash_is_critical() {
        let mut h = harness();
        h.instance.process_block(&test_block(30)).await.unwrap();

        let conflicting = BlockInfo::new(30, [0xEE; 32]);
        let err = h.instance.process_block(&conflicting).await.unwrap_err();
        assert!(err.is_critical());
        assert!(matches!(err, ProviderError::DuplicateVote { height: 30, .. }));
        // No second signature left the instance.
        assert_eq!(h.controller.vote_count(), 1);
    }

    #[tokio::test]
    async fn test_reconcile_adopts_chain_commitment() {
        let mut h = harness();
        h.controller.set_last_committed(40);
        h.instance.reconcile().await.unwrap();
        assert_eq!(h.instance.last_committed_height(), 40);
        let stored = h.store.get_provider(h.instance.btc_pk()).unwrap();
        assert_eq!(stored.bookmarks.last_committed_height, 40);
    }

    #[tokio::test]
    async fn test_reconcile_restores_lost_vote() {
        let mut h = harness();
        // A vote at height 1 was confirmed on chain, but the local record
        // was lost to a crash before persistence.
        h.controller.set_last_committed(10);
        h.controller.seed_vote(crate::ports::FinalityVote {
            height: 1,
            block_hash: crate::test_utils::test_block_hash(1),
            signature: [0x11; 32],
        });

        h.instance.reconcile().await.unwrap();
        assert_eq!(h.instance.last_voted_height(), 1);
        assert_eq!(h.instance.last_processed_height(), 1);
        assert!(h.store.vote_record(h.instance.btc_pk(), 1).unwrap().is_some());

        // Replaying the block after reconciliation stays a no-op.
        let res = h.instance.process_block(&test_block(1)).await.unwrap();
        assert!(res.is_none());
        assert_eq!(h.controller.vote_count(), 0);
    }

    #[tokio::test]
    async fn test_run_emits_critical_error_and_halts() {
        let mut h = harness();
        h.instance.process_block(&test_block(30)).await.unwrap();

        let (block_tx, block_rx) = mpsc::channel(4);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(h.instance.run(block_rx, shutdown_rx));

        block_tx
            .send(BlockInfo::new(30, [0xEE; 32]))
            .await
            .unwrap();

        let critical = h.critical_rx.recv().await.unwrap();
        assert!(matches!(
            critical.cause,
            ProviderError::DuplicateVote { height: 30, .. }
        ));
        // The loop halts on its own; no shutdown signal needed.
        handle.await.unwrap();
        assert_eq!(h.controller.vote_count(), 1);
    }
}
