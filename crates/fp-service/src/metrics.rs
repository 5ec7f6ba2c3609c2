//! # Finality Provider Metrics
//!
//! Prometheus metrics for monitoring the voting pipeline.
//!
//! ## Usage
//!
//! Enable with the `metrics` feature:
//! ```toml
//! fp-service = { path = "...", features = ["metrics"] }
//! ```
//!
//! ## Metrics Exported
//!
//! - `fp_votes_submitted_total` - Counter of submitted finality votes
//! - `fp_pub_rand_committed_total` - Counter of committed randomness values
//! - `fp_critical_errors_total` - Counter of critical faults
//! - `fp_last_voted_height` - Gauge of the last voted height
//! - `fp_last_processed_height` - Gauge of the last processed height

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{register_gauge, register_int_counter, Gauge, IntCounter};

#[cfg(feature = "metrics")]
lazy_static! {
    /// Total finality votes submitted
    pub static ref VOTES_SUBMITTED: IntCounter = register_int_counter!(
        "fp_votes_submitted_total",
        "Total number of finality votes submitted"
    )
    .expect("Failed to create VOTES_SUBMITTED metric");

    /// Total public randomness values committed
    pub static ref PUB_RAND_COMMITTED: IntCounter = register_int_counter!(
        "fp_pub_rand_committed_total",
        "Total number of public randomness values committed"
    )
    .expect("Failed to create PUB_RAND_COMMITTED metric");

    /// Total critical faults raised
    pub static ref CRITICAL_ERRORS: IntCounter = register_int_counter!(
        "fp_critical_errors_total",
        "Total number of critical faults raised"
    )
    .expect("Failed to create CRITICAL_ERRORS metric");

    /// Last voted height
    pub static ref LAST_VOTED_HEIGHT: Gauge = register_gauge!(
        "fp_last_voted_height",
        "Height of the last submitted finality vote"
    )
    .expect("Failed to create LAST_VOTED_HEIGHT metric");

    /// Last processed height
    pub static ref LAST_PROCESSED_HEIGHT: Gauge = register_gauge!(
        "fp_last_processed_height",
        "Height of the last fully processed block"
    )
    .expect("Failed to create LAST_PROCESSED_HEIGHT metric");
}

/// Record a submitted finality vote
#[cfg(feature = "metrics")]
pub fn record_vote_submitted(height: u64) {
    VOTES_SUBMITTED.inc();
    LAST_VOTED_HEIGHT.set(height as f64);
}

/// Record committed randomness values
#[cfg(feature = "metrics")]
pub fn record_pub_rand_committed(num: u64) {
    PUB_RAND_COMMITTED.inc_by(num);
}

/// Record a critical fault
#[cfg(feature = "metrics")]
pub fn record_critical_error() {
    CRITICAL_ERRORS.inc();
}

/// Update the last processed height gauge
#[cfg(feature = "metrics")]
pub fn set_last_processed_height(height: u64) {
    LAST_PROCESSED_HEIGHT.set(height as f64);
}

// =============================================================================
// NO-OP IMPLEMENTATIONS (when metrics feature disabled)
// =============================================================================

#[cfg(not(feature = "metrics"))]
pub fn record_vote_submitted(_height: u64) {}

#[cfg(not(feature = "metrics"))]
pub fn record_pub_rand_committed(_num: u64) {}

#[cfg(not(feature = "metrics"))]
pub fn record_critical_error() {}

#[cfg(not(feature = "metrics"))]
pub fn set_last_processed_height(_height: u64) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_noop_when_disabled() {
        // These should compile and run without panic even without metrics feature
        record_vote_submitted(11);
        record_pub_rand_committed(100);
        record_critical_error();
        set_last_processed_height(11);
    }
}
