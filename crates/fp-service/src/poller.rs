//! # Chain Poller
//!
//! Background task producing an ordered, gapless stream of `BlockInfo` for
//! one provider instance.
//!
//! The poller owns exactly one rule: every emitted height is
//! `last_emitted + 1`. Anything else from upstream is a fault. The stream is
//! a bounded mpsc channel, so a slow consumer backpressures the poller
//! instead of buffering without bound.
//!
//! A chain query that keeps failing past the bounded retries is a poller
//! fault: the task logs it and exits, closing the channel. The consumer sees
//! the closed stream and stops; restarting the poller is the supervisor's
//! call. A poller fault is never a provider CriticalError.

use crate::config::PollerConfig;
use crate::error::{ProviderError, ProviderResult};
use crate::ports::ChainController;
use fp_types::BlockInfo;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Block stream producer for a single instance.
pub struct ChainPoller<C: ChainController> {
    config: PollerConfig,
    controller: Arc<C>,
    shutdown_tx: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl<C: ChainController + 'static> ChainPoller<C> {
    /// Create a poller over a chain controller.
    pub fn new(config: PollerConfig, controller: Arc<C>) -> Self {
        Self {
            config,
            controller,
            shutdown_tx: None,
            handle: None,
        }
    }

    /// Spawn the polling task, emitting blocks from `start_height` upward.
    ///
    /// Returns the receiving end of the block stream. In auto-scan mode the
    /// task bulk-fetches toward the tip before settling into interval
    /// polling; in static mode it polls one by one from the start height.
    pub fn start(&mut self, start_height: u64) -> ProviderResult<mpsc::Receiver<BlockInfo>> {
        if self.handle.is_some() {
            return Err(ProviderError::PollerAlreadyStarted);
        }

        let (block_tx, block_rx) = mpsc::channel(self.config.buffer_size);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let config = self.config.clone();
        let controller = Arc::clone(&self.controller);
        let handle = tokio::spawn(async move {
            info!(start_height, "chain poller started");
            match poll_loop(config, controller, start_height, block_tx, shutdown_rx).await {
                Ok(()) => debug!("chain poller stopped"),
                Err(e) => error!(error = %e, "chain poller failed; block stream closed"),
            }
        });

        self.shutdown_tx = Some(shutdown_tx);
        self.handle = Some(handle);
        Ok(block_rx)
    }

    /// Signal shutdown and wait for the polling task to exit.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }

    /// Whether the polling task has been started and not yet stopped.
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

async fn poll_loop<C: ChainController>(
    config: PollerConfig,
    controller: Arc<C>,
    start_height: u64,
    block_tx: mpsc::Sender<BlockInfo>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> ProviderResult<()> {
    let backoff = Duration::from_millis(config.retry_backoff_ms);
    let mut next_height = start_height;

    // Bootstrap: while far behind the tip, fetch in bulk instead of one
    // height per tick.
    if config.auto_chain_scanning {
        loop {
            if *shutdown_rx.borrow() {
                return Ok(());
            }
            let tip = with_retry("query_chain_tip", config.max_query_retries, backoff, || {
                let c = Arc::clone(&controller);
                async move { c.query_chain_tip().await }
            })
            .await?;

            if tip.height < next_height + config.bootstrap_batch_threshold {
                break;
            }

            let end = (next_height + config.bootstrap_batch_size - 1).min(tip.height);
            let start = next_height;
            let blocks = with_retry("query_blocks", config.max_query_retries, backoff, || {
                let c = Arc::clone(&controller);
                async move { c.query_blocks(start, end).await }
            })
            .await?;
            if blocks.is_empty() {
                // The tip promised these heights exist; an empty range is an
                // upstream fault, not a retryable miss.
                return Err(ProviderError::ChainQuery {
                    reason: format!("empty response for block range {start}..={end}"),
                });
            }

            for block in blocks {
                if !emit(&block_tx, &mut shutdown_rx, &mut next_height, block).await? {
                    return Ok(());
                }
            }
        }
        info!(
            height = next_height,
            "bootstrap complete; switching to steady polling"
        );
    }

    // Steady state: drain whatever the chain has produced, once per tick.
    let mut ticker = tokio::time::interval(Duration::from_millis(config.poll_interval_ms));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    return Ok(());
                }
            }
            _ = ticker.tick() => {
                loop {
                    let height = next_height;
                    let maybe = with_retry("query_block", config.max_query_retries, backoff, || {
                        let c = Arc::clone(&controller);
                        async move { c.query_block(height).await }
                    })
                    .await?;

                    match maybe {
                        Some(block) => {
                            if !emit(&block_tx, &mut shutdown_rx, &mut next_height, block).await? {
                                return Ok(());
                            }
                        }
                        // Not produced yet; wait for the next tick.
                        None => break,
                    }
                }
            }
        }
    }
}

/// Forward one block, enforcing the `last_emitted + 1` sequencing rule.
///
/// Returns `Ok(false)` when the poller should stop (shutdown signaled or
/// consumer gone).
async fn emit(
    block_tx: &mpsc::Sender<BlockInfo>,
    shutdown_rx: &mut watch::Receiver<bool>,
    next_height: &mut u64,
    block: BlockInfo,
) -> ProviderResult<bool> {
    if block.height != *next_height {
        return Err(ProviderError::HeightSequence {
            expected: *next_height,
            got: block.height,
        });
    }

    tokio::select! {
        _ = shutdown_rx.changed() => Ok(false),
        sent = block_tx.send(block) => {
            if sent.is_err() {
                debug!("block consumer dropped; stopping poller");
                return Ok(false);
            }
            *next_height += 1;
            Ok(true)
        }
    }
}

/// Run a chain query with bounded exponential backoff on transient failures.
async fn with_retry<T, F, Fut>(
    what: &'static str,
    max_retries: u32,
    backoff: Duration,
    mut op: F,
) -> ProviderResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProviderResult<T>>,
{
    let cap = backoff * 10;
    let mut delay = backoff;
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < max_retries => {
                attempt += 1;
                warn!(query = what, attempt, error = %e, "chain query failed; retrying");
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(cap);
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockChainController;
    use std::time::Duration;

    fn poller_config() -> PollerConfig {
        PollerConfig::for_testing()
    }

    #[tokio::test]
    async fn test_static_mode_emits_sequential_blocks() {
        let controller = Arc::new(MockChainController::new());
        controller.extend_chain_to(5);

        let mut poller = ChainPoller::new(poller_config(), Arc::clone(&controller));
        let mut rx = poller.start(1).unwrap();

        for expected in 1..=5u64 {
            let block = rx.recv().await.unwrap();
            assert_eq!(block.height, expected);
        }
        poller.stop().await;
    }

    #[tokio::test]
    async fn test_poller_waits_for_new_heights() {
        let controller = Arc::new(MockChainController::new());
        controller.extend_chain_to(2);

        let mut poller = ChainPoller::new(poller_config(), Arc::clone(&controller));
        let mut rx = poller.start(1).unwrap();

        assert_eq!(rx.recv().await.unwrap().height, 1);
        assert_eq!(rx.recv().await.unwrap().height, 2);

        // Nothing beyond the tip yet.
        let pending = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(pending.is_err());

        // The chain advances; the poller picks it up on a later tick.
        controller.extend_chain_to(3);
        assert_eq!(rx.recv().await.unwrap().height, 3);
        poller.stop().await;
    }

    #[tokio::test]
    async fn test_auto_scan_bootstraps_in_bulk() {
        let controller = Arc::new(MockChainController::new());
        controller.extend_chain_to(20);

        let config = PollerConfig {
            auto_chain_scanning: true,
            ..poller_config()
        };
        let mut poller = ChainPoller::new(config, Arc::clone(&controller));
        let mut rx = poller.start(1).unwrap();

        for expected in 1..=20u64 {
            assert_eq!(rx.recv().await.unwrap().height, expected);
        }
        assert!(controller.bulk_query_count() > 0);
        poller.stop().await;
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let controller = Arc::new(MockChainController::new());
        let mut poller = ChainPoller::new(poller_config(), controller);
        let _rx = poller.start(1).unwrap();
        assert!(matches!(
            poller.start(1),
            Err(ProviderError::PollerAlreadyStarted)
        ));
        poller.stop().await;
    }

    #[tokio::test]
    async fn test_query_failures_retried_then_fatal() {
        let controller = Arc::new(MockChainController::new());
        controller.extend_chain_to(3);
        // More consecutive failures than the poller retries.
        controller.fail_next_queries(10);

        let mut poller = ChainPoller::new(poller_config(), Arc::clone(&controller));
        let mut rx = poller.start(1).unwrap();

        // The poller gives up and closes the stream without emitting.
        assert!(rx.recv().await.is_none());
        poller.stop().await;
    }

    #[tokio::test]
    async fn test_transient_failures_within_budget_recover() {
        let controller = Arc::new(MockChainController::new());
        controller.extend_chain_to(2);
        controller.fail_next_queries(1);

        let mut poller = ChainPoller::new(poller_config(), Arc::clone(&controller));
        let mut rx = poller.start(1).unwrap();

        assert_eq!(rx.recv().await.unwrap().height, 1);
        assert_eq!(rx.recv().await.unwrap().height, 2);
        poller.stop().await;
    }

    #[tokio::test]
    async fn test_out_of_sequence_height_is_fatal() {
        let controller = Arc::new(MockChainController::new());
        controller.extend_chain_to(3);
        // Upstream serves height 2 when asked for 1.
        controller.corrupt_height_mapping();

        let mut poller = ChainPoller::new(poller_config(), Arc::clone(&controller));
        let mut rx = poller.start(1).unwrap();

        assert!(rx.recv().await.is_none());
        poller.stop().await;
    }
}
