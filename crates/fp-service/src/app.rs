//! # Finality Provider App
//!
//! Orchestrator owning the set of provider instances. Guarantees at most one
//! running instance per provider key, drives registration, and funnels every
//! instance's unrecoverable faults into a single bounded critical-error
//! channel whose receiving end is handed to the operator exactly once.

use crate::config::FinalityProviderConfig;
use crate::error::{CriticalError, ProviderError, ProviderResult};
use crate::instance::FinalityProviderInstance;
use crate::poller::ChainPoller;
use crate::ports::inbound::FinalityProviderManager;
use crate::ports::{ChainController, EotsSigner};
use async_trait::async_trait;
use fp_store::{KeyValueStore, ProviderStatus, ProviderStore, StoreError, StoredFinalityProvider};
use fp_types::{short_hex, BtcPublicKey, ChainPublicKey, ProofOfPossession, TxResponse};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Handle to one spawned instance and its poller.
struct RunningInstance<C: ChainController> {
    poller: ChainPoller<C>,
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Orchestrator for a set of finality providers sharing one chain
/// connection, one signer backend, and one store.
pub struct FinalityProviderApp<C, E, KV>
where
    C: ChainController,
    E: EotsSigner,
    KV: KeyValueStore,
{
    config: Arc<FinalityProviderConfig>,
    store: Arc<ProviderStore<KV>>,
    controller: Arc<C>,
    signer: Arc<E>,
    instances: Mutex<HashMap<BtcPublicKey, RunningInstance<C>>>,
    critical_tx: mpsc::Sender<CriticalError>,
    critical_rx: parking_lot::Mutex<Option<mpsc::Receiver<CriticalError>>>,
}

impl<C, E, KV> FinalityProviderApp<C, E, KV>
where
    C: ChainController + 'static,
    E: EotsSigner + 'static,
    KV: KeyValueStore + 'static,
{
    /// Create the app. Validates the configuration up front.
    pub fn new(
        config: FinalityProviderConfig,
        store: ProviderStore<KV>,
        controller: Arc<C>,
        signer: Arc<E>,
    ) -> ProviderResult<Self> {
        config.validate()?;
        let (critical_tx, critical_rx) = mpsc::channel(config.critical_error_buffer);
        Ok(Self {
            config: Arc::new(config),
            store: Arc::new(store),
            controller,
            signer,
            instances: Mutex::new(HashMap::new()),
            critical_tx,
            critical_rx: parking_lot::Mutex::new(Some(critical_rx)),
        })
    }

    /// Take the critical-error receiver.
    ///
    /// Returns `Some` exactly once; the supervising caller must consume the
    /// stream promptly, since instances deliver without blocking and drop
    /// faults the channel cannot hold.
    pub fn take_critical_errors(&self) -> Option<mpsc::Receiver<CriticalError>> {
        self.critical_rx.lock().take()
    }

    /// Shared access to the provider store.
    pub fn store(&self) -> &Arc<ProviderStore<KV>> {
        &self.store
    }
}

#[async_trait]
impl<C, E, KV> FinalityProviderManager for FinalityProviderApp<C, E, KV>
where
    C: ChainController + 'static,
    E: EotsSigner + 'static,
    KV: KeyValueStore + 'static,
{
    async fn register_finality_provider(
        &self,
        chain_pk: ChainPublicKey,
        btc_pk: BtcPublicKey,
        description: String,
        pop: ProofOfPossession,
    ) -> ProviderResult<TxResponse> {
        match self.store.get_provider(&btc_pk) {
            // Crash recovery: the record exists but registration never
            // confirmed. Re-submit instead of failing.
            Ok(record) if record.status == ProviderStatus::Created => {}
            Ok(_) => {
                return Err(ProviderError::AlreadyRegistered {
                    btc_pk: short_hex(&btc_pk),
                })
            }
            Err(StoreError::ProviderNotFound { .. }) => {
                let record = StoredFinalityProvider::new(btc_pk, chain_pk, description);
                self.store.create_provider(&record)?;
            }
            Err(e) => return Err(e.into()),
        }

        let res = self
            .controller
            .register_finality_provider(&chain_pk, &btc_pk, &pop)
            .await?;
        self.store.set_status(&btc_pk, ProviderStatus::Registered)?;
        info!(
            btc_pk = %short_hex(&btc_pk),
            tx_hash = %short_hex(&res.tx_hash),
            "finality provider registered"
        );
        Ok(res)
    }

    async fn start_finality_provider(&self, btc_pk: BtcPublicKey) -> ProviderResult<()> {
        // The map lock is held across construction so two concurrent starts
        // for the same key cannot both spawn.
        let mut instances = self.instances.lock().await;
        if instances.contains_key(&btc_pk) {
            return Err(ProviderError::AlreadyStarted {
                btc_pk: short_hex(&btc_pk),
            });
        }

        let mut instance = FinalityProviderInstance::new(
            btc_pk,
            Arc::clone(&self.config),
            Arc::clone(&self.store),
            Arc::clone(&self.controller),
            Arc::clone(&self.signer),
            self.critical_tx.clone(),
        )?;
        instance.reconcile().await?;

        let start_height = if self.config.poller.auto_chain_scanning {
            // Blocks at or below the finalized frontier no longer take
            // votes; resume from whichever is further along.
            let finalized = self
                .controller
                .query_latest_finalized_height()
                .await?
                .unwrap_or(0);
            (instance.last_processed_height() + 1).max(finalized + 1)
        } else {
            self.config.poller.static_start_height
        };
        // Pre-seed randomness so the first vote already has a committed
        // value when the block arrives.
        instance.commit_pub_rand(start_height).await?;

        let mut poller = ChainPoller::new(self.config.poller.clone(), Arc::clone(&self.controller));
        let block_rx = poller.start(start_height)?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(instance.run(block_rx, shutdown_rx));

        instances.insert(
            btc_pk,
            RunningInstance {
                poller,
                shutdown_tx,
                handle,
            },
        );
        info!(
            btc_pk = %short_hex(&btc_pk),
            start_height,
            "finality provider instance spawned"
        );
        Ok(())
    }

    async fn stop_finality_provider(&self, btc_pk: BtcPublicKey) -> ProviderResult<()> {
        let running = self.instances.lock().await.remove(&btc_pk);
        let Some(mut running) = running else {
            return Err(ProviderError::NotStarted {
                btc_pk: short_hex(&btc_pk),
            });
        };

        running.poller.stop().await;
        let _ = running.shutdown_tx.send(true);
        let _ = running.handle.await;
        info!(btc_pk = %short_hex(&btc_pk), "finality provider instance stopped");
        Ok(())
    }

    async fn start_all(&self) -> ProviderResult<usize> {
        let mut started = 0usize;
        for record in self.store.list_providers()? {
            if !record.status.is_startable() {
                continue;
            }
            match self.start_finality_provider(record.btc_pk).await {
                Ok(()) => started += 1,
                Err(ProviderError::AlreadyStarted { .. }) => {}
                Err(e) => {
                    warn!(
                        btc_pk = %short_hex(&record.btc_pk),
                        error = %e,
                        "failed to start finality provider"
                    );
                }
            }
        }
        Ok(started)
    }

    async fn stop_all(&self) -> ProviderResult<()> {
        let drained: Vec<(BtcPublicKey, RunningInstance<C>)> =
            self.instances.lock().await.drain().collect();
        for (btc_pk, mut running) in drained {
            running.poller.stop().await;
            let _ = running.shutdown_tx.send(true);
            let _ = running.handle.await;
            info!(btc_pk = %short_hex(&btc_pk), "finality provider instance stopped");
        }
        Ok(())
    }

    async fn running_providers(&self) -> Vec<BtcPublicKey> {
        self.instances.lock().await.keys().copied().collect()
    }
}
