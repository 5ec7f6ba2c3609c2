//! Pure decision logic for randomness lookahead and commitment sizing.
//!
//! These functions keep the rules that protect the signing key out of the
//! async code paths so they can be tested exhaustively.

/// Whether a new commitment is required before processing `height`.
///
/// The committed high-water mark must stay at least `min_lookahead` heights
/// ahead of the block being processed, so a committed value always exists
/// before the vote that needs it.
pub fn needs_commit(last_committed: u64, height: u64, min_lookahead: u64) -> bool {
    last_committed < height + min_lookahead
}

/// First height of the next commitment batch.
///
/// Batches never overlap: the next batch starts after the previous one, and
/// never below the height currently being processed.
pub fn next_commit_start(last_committed: u64, height: u64) -> u64 {
    (last_committed + 1).max(height)
}

/// Size of the next commitment batch.
///
/// The batch is clamped so the committed high-water mark ends at most
/// `max_committed_gap` heights beyond the block being processed, bounding
/// the randomness wasted if the provider goes inactive.
pub fn commit_batch_size(
    num_pub_rand: u64,
    start_height: u64,
    processing_height: u64,
    max_committed_gap: u64,
) -> u64 {
    let allowed_end = processing_height + max_committed_gap;
    if start_height > allowed_end {
        return 0;
    }
    num_pub_rand.min(allowed_end - start_height + 1)
}
