//! Configuration for the finality-provider daemon.

use crate::error::{ProviderError, ProviderResult};
use serde::Deserialize;

/// Runtime configuration for a finality provider.
#[derive(Clone, Debug, Deserialize)]
pub struct FinalityProviderConfig {
    /// Number of public randomness values per commitment batch.
    pub num_pub_rand: u64,

    /// Minimum committed lookahead: before processing height H the committed
    /// high-water mark must reach at least `H + min_rand_lookahead`.
    pub min_rand_lookahead: u64,

    /// Maximum distance the committed high-water mark may run ahead of the
    /// height currently being processed. Caps transaction cost wasted on
    /// randomness that is never used if the provider goes inactive.
    pub max_committed_gap: u64,

    /// Bounded fast retries for a transient failure before falling back to
    /// the poll cadence.
    pub submission_retries: u32,

    /// Initial backoff between fast retries, in milliseconds (doubles per
    /// attempt, capped at ten times this value).
    pub submission_retry_backoff_ms: u64,

    /// Capacity of the critical-error channel.
    pub critical_error_buffer: usize,

    /// Chain poller settings.
    pub poller: PollerConfig,
}

impl Default for FinalityProviderConfig {
    fn default() -> Self {
        Self {
            num_pub_rand: 100,
            min_rand_lookahead: 10,
            max_committed_gap: 500,
            submission_retries: 3,
            submission_retry_backoff_ms: 500,
            critical_error_buffer: 16,
            poller: PollerConfig::default(),
        }
    }
}

impl FinalityProviderConfig {
    /// Create a config for testing (small batches, fast cadence).
    pub fn for_testing() -> Self {
        Self {
            num_pub_rand: 5,
            min_rand_lookahead: 2,
            max_committed_gap: 20,
            submission_retries: 1,
            submission_retry_backoff_ms: 10,
            critical_error_buffer: 4,
            poller: PollerConfig::for_testing(),
        }
    }

    /// Validate cross-field constraints.
    pub fn validate(&self) -> ProviderResult<()> {
        if self.num_pub_rand == 0 {
            return Err(ProviderError::InvalidConfig {
                reason: "num_pub_rand must be positive".into(),
            });
        }
        // The lookahead rule must always be satisfiable within the gap cap.
        if self.max_committed_gap < self.min_rand_lookahead + self.num_pub_rand {
            return Err(ProviderError::InvalidConfig {
                reason: format!(
                    "max_committed_gap {} must be at least min_rand_lookahead {} + num_pub_rand {}",
                    self.max_committed_gap, self.min_rand_lookahead, self.num_pub_rand
                ),
            });
        }
        self.poller.validate()
    }
}

/// Chain poller settings.
#[derive(Clone, Debug, Deserialize)]
pub struct PollerConfig {
    /// Auto-scan mode: start from the instance's own bookmark and bulk-fetch
    /// toward the tip. When false, start exactly at `static_start_height`.
    pub auto_chain_scanning: bool,

    /// First height to emit in static mode.
    pub static_start_height: u64,

    /// Steady-state polling interval in milliseconds.
    pub poll_interval_ms: u64,

    /// Capacity of the block channel (pull-based backpressure).
    pub buffer_size: usize,

    /// Tip lag beyond which bootstrap switches to bulk fetching.
    pub bootstrap_batch_threshold: u64,

    /// Number of blocks per bulk fetch during bootstrap.
    pub bootstrap_batch_size: u64,

    /// Bounded retries per chain query before the poller gives up.
    pub max_query_retries: u32,

    /// Initial retry backoff in milliseconds (doubles per attempt, capped at
    /// ten times this value).
    pub retry_backoff_ms: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            auto_chain_scanning: true,
            static_start_height: 1,
            poll_interval_ms: 5_000,
            buffer_size: 1_000,
            bootstrap_batch_threshold: 100,
            bootstrap_batch_size: 100,
            max_query_retries: 5,
            retry_backoff_ms: 500,
        }
    }
}

impl PollerConfig {
    /// Create a config for testing (tiny buffers, millisecond cadence).
    pub fn for_testing() -> Self {
        Self {
            auto_chain_scanning: false,
            static_start_height: 1,
            poll_interval_ms: 10,
            buffer_size: 16,
            bootstrap_batch_threshold: 4,
            bootstrap_batch_size: 4,
            max_query_retries: 2,
            retry_backoff_ms: 5,
        }
    }

    /// Validate field constraints.
    pub fn validate(&self) -> ProviderResult<()> {
        if self.buffer_size == 0 {
            return Err(ProviderError::InvalidConfig {
                reason: "poller buffer_size must be positive".into(),
            });
        }
        if self.bootstrap_batch_size == 0 {
            return Err(ProviderError::InvalidConfig {
                reason: "poller bootstrap_batch_size must be positive".into(),
            });
        }
        Ok(())
    }
}
