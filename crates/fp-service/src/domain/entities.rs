//! Domain entities of the voting pipeline.

use fp_types::{Hash, SchnorrSignature};

/// Lifecycle state of a provider instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    /// Accepting and processing polled blocks.
    Started,
    /// Not processing. Entered only via an explicit stop or after an
    /// unrecoverable fault.
    Stopped,
}

/// A batch commitment to consecutive one-time public randomness values.
///
/// Built by the instance, submitted once, never mutated afterwards. Batches
/// are monotone and non-overlapping: each starts strictly after the previous
/// batch's end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubRandCommit {
    /// First height the batch covers.
    pub start_height: u64,
    /// Number of covered heights.
    pub num_pub_rand: u64,
    /// Merkle root over the public randomness values.
    pub commitment: Hash,
    /// Schnorr signature over the commitment message.
    pub signature: SchnorrSignature,
}

impl PubRandCommit {
    /// Last height the batch covers.
    pub fn end_height(&self) -> u64 {
        self.start_height + self.num_pub_rand - 1
    }

    /// Whether the batch covers a height.
    pub fn covers(&self, height: u64) -> bool {
        height >= self.start_height && height <= self.end_height()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_coverage() {
        let commit = PubRandCommit {
            start_height: 11,
            num_pub_rand: 5,
            commitment: [0u8; 32],
            signature: [0u8; 64],
        };
        assert_eq!(commit.end_height(), 15);
        assert!(commit.covers(11));
        assert!(commit.covers(15));
        assert!(!commit.covers(10));
        assert!(!commit.covers(16));
    }
}
