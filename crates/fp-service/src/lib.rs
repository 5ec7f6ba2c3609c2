//! # fp-service
//!
//! Core of the finality provider: the per-provider voting state machine and
//! its polling pipeline.
//!
//! ## Overview
//!
//! A finality provider watches a consumer chain, commits batches of one-time
//! public randomness ahead of time, and submits one EOTS-signed finality
//! vote per block. Signing two different messages at the same height under
//! the same randomness leaks the signing key, so everything here is built
//! around one rule: **at most one vote per height, ever**, across crashes,
//! retries, and replays.
//!
//! ## Architecture
//!
//! ```text
//! ChainPoller ──BlockInfo──→ FinalityProviderInstance (one task per key)
//!                                  │        │
//!                EotsSigner ←──────┤        ├──────→ ChainController
//!                (randomness,      │        │        (commitments, votes,
//!                 signatures)      │        │         queries)
//!                                  ▼        ▼
//!                            ProviderStore (bookmarks + vote records,
//!                                           atomic batches)
//!                                  │
//!                        CriticalError channel ──→ FinalityProviderApp
//! ```
//!
//! Each instance runs on its own task; per-provider processing is strictly
//! serial. Transient chain faults are retried in place without advancing any
//! bookmark. Safety-critical faults (a conflicting vote, randomness reuse,
//! store corruption) halt the instance and surface on the app's
//! critical-error channel for the operator.
//!
//! ## Example
//!
//! ```rust,ignore
//! use fp_service::{FinalityProviderApp, FinalityProviderConfig, FinalityProviderManager};
//!
//! let app = FinalityProviderApp::new(config, store, controller, signer)?;
//! let mut critical = app.take_critical_errors().unwrap();
//!
//! app.register_finality_provider(chain_pk, btc_pk, description, pop).await?;
//! app.start_finality_provider(btc_pk).await?;
//!
//! // The operator halts whatever the channel reports.
//! while let Some(fault) = critical.recv().await {
//!     tracing::error!(%fault, "provider halted");
//! }
//! ```

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod instance;
pub mod metrics;
pub mod poller;
pub mod ports;
pub mod test_utils;

pub use app::FinalityProviderApp;
pub use config::{FinalityProviderConfig, PollerConfig};
pub use domain::{commitment_message, commitment_root, InstanceState, PubRandCommit};
pub use error::{CriticalError, ProviderError, ProviderResult};
pub use instance::FinalityProviderInstance;
pub use poller::ChainPoller;
pub use ports::inbound::FinalityProviderManager;
pub use ports::outbound::{ChainController, EotsSigner, FinalityVote};
