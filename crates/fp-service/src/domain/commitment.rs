//! Public-randomness commitment construction.
//!
//! A batch of one-time public randomness values is committed on chain as a
//! single SHA-256 Merkle root, amortizing transaction cost over
//! `num_pub_rand` heights.

use fp_types::{Hash, PublicRandomness};
use sha2::{Digest, Sha256};

/// Compute the Merkle root over a batch of public randomness values.
///
/// Leaves are the values themselves; inner nodes are `SHA256(left || right)`
/// with the last node duplicated on odd levels. An empty batch maps to the
/// zero hash (never submitted; batch sizes are validated positive upstream).
pub fn commitment_root(values: &[PublicRandomness]) -> Hash {
    if values.is_empty() {
        return [0u8; 32];
    }
    if values.len() == 1 {
        return values[0];
    }

    let mut level: Vec<Hash> = values.to_vec();
    while level.len() > 1 {
        let mut next_level = Vec::with_capacity((level.len() + 1) / 2);
        for chunk in level.chunks(2) {
            let left = &chunk[0];
            let right = chunk.get(1).unwrap_or(left); // Duplicate last if odd
            next_level.push(hash_concat(left, right));
        }
        level = next_level;
    }
    level[0]
}

/// The message the provider signs alongside a commitment batch.
///
/// Layout: `start_height BE || num_pub_rand BE || root`.
pub fn commitment_message(start_height: u64, num_pub_rand: u64, root: &Hash) -> Vec<u8> {
    let mut msg = Vec::with_capacity(8 + 8 + 32);
    msg.extend_from_slice(&start_height.to_be_bytes());
    msg.extend_from_slice(&num_pub_rand.to_be_bytes());
    msg.extend_from_slice(root);
    msg
}

fn hash_concat(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(n: u8) -> Vec<PublicRandomness> {
        (0..n).map(|i| [i; 32]).collect()
    }

    #[test]
    fn test_root_single_value_is_the_value() {
        let v = [7u8; 32];
        assert_eq!(commitment_root(&[v]), v);
    }

    #[test]
    fn test_root_deterministic() {
        assert_eq!(commitment_root(&values(5)), commitment_root(&values(5)));
    }

    #[test]
    fn test_root_sensitive_to_content_and_order() {
        let base = values(4);
        let mut reordered = base.clone();
        reordered.swap(0, 1);
        assert_ne!(commitment_root(&base), commitment_root(&reordered));
        assert_ne!(commitment_root(&base), commitment_root(&values(5)));
    }

    #[test]
    fn test_odd_batch_duplicates_last() {
        // A 3-value batch hashes as ((v0,v1),(v2,v2)).
        let v = values(3);
        let left = hash_concat(&v[0], &v[1]);
        let right = hash_concat(&v[2], &v[2]);
        assert_eq!(commitment_root(&v), hash_concat(&left, &right));
    }

    #[test]
    fn test_message_layout() {
        let root = [9u8; 32];
        let msg = commitment_message(11, 5, &root);
        assert_eq!(msg.len(), 48);
        assert_eq!(&msg[..8], &11u64.to_be_bytes());
        assert_eq!(&msg[8..16], &5u64.to_be_bytes());
        assert_eq!(&msg[16..], &root);
    }
}
