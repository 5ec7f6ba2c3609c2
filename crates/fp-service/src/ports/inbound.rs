//! Inbound ports (driving side - API)

use crate::error::ProviderResult;
use async_trait::async_trait;
use fp_types::{BtcPublicKey, ChainPublicKey, ProofOfPossession, TxResponse};

/// Port: lifecycle management of finality providers.
///
/// Implemented by `FinalityProviderApp`; this is the surface an RPC layer or
/// CLI drives.
#[async_trait]
pub trait FinalityProviderManager: Send + Sync {
    /// Create and register a new finality provider.
    async fn register_finality_provider(
        &self,
        chain_pk: ChainPublicKey,
        btc_pk: BtcPublicKey,
        description: String,
        pop: ProofOfPossession,
    ) -> ProviderResult<TxResponse>;

    /// Start the voting instance for a registered provider.
    async fn start_finality_provider(&self, btc_pk: BtcPublicKey) -> ProviderResult<()>;

    /// Stop the running instance for a provider.
    async fn stop_finality_provider(&self, btc_pk: BtcPublicKey) -> ProviderResult<()>;

    /// Start instances for every startable stored provider.
    ///
    /// Returns the number of instances started.
    async fn start_all(&self) -> ProviderResult<usize>;

    /// Stop every running instance.
    async fn stop_all(&self) -> ProviderResult<()>;

    /// Keys of currently running instances.
    async fn running_providers(&self) -> Vec<BtcPublicKey>;
}
