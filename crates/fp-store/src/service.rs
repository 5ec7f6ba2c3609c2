//! # Provider Store Service
//!
//! CRUD over provider records plus the two operations with hard guarantees:
//! `update_bookmarks` (atomic, monotonic, order-preserving) and
//! `record_vote` (vote record + bookmark advance in one batch, at most one
//! record per height).

use crate::entities::{Bookmarks, ProviderStatus, StoredFinalityProvider, StoredVoteRecord};
use crate::error::{StoreError, StoreResult};
use crate::ports::{BatchOperation, KeyValueStore};
use crate::schema::KeyPrefix;
use fp_types::{short_hex, BtcPublicKey};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Durable registry of finality providers over an abstract key-value store.
///
/// All methods take `&self`; the backend lives behind an internal lock so
/// read-modify-write updates are serialized per store instance.
pub struct ProviderStore<KV: KeyValueStore> {
    kv: RwLock<KV>,
}

impl<KV: KeyValueStore> ProviderStore<KV> {
    /// Wrap a key-value backend.
    pub fn new(kv: KV) -> Self {
        Self {
            kv: RwLock::new(kv),
        }
    }

    /// Create a fresh provider record.
    ///
    /// Fails with `ProviderExists` if any record is already stored under the
    /// same key.
    pub fn create_provider(&self, record: &StoredFinalityProvider) -> StoreResult<()> {
        let key = KeyPrefix::provider_key(&record.btc_pk);
        let mut kv = self.kv.write();
        if kv.exists(&key)? {
            return Err(StoreError::ProviderExists {
                btc_pk: short_hex(&record.btc_pk),
            });
        }
        kv.put(&key, &encode(record)?)?;
        tracing::info!(
            btc_pk = %short_hex(&record.btc_pk),
            "finality provider record created"
        );
        Ok(())
    }

    /// Load a provider record.
    pub fn get_provider(&self, btc_pk: &BtcPublicKey) -> StoreResult<StoredFinalityProvider> {
        let kv = self.kv.read();
        read_provider(&*kv, btc_pk)
    }

    /// Whether a record exists for the key.
    pub fn has_provider(&self, btc_pk: &BtcPublicKey) -> StoreResult<bool> {
        self.kv.read().exists(&KeyPrefix::provider_key(btc_pk))
    }

    /// List all stored provider records.
    pub fn list_providers(&self) -> StoreResult<Vec<StoredFinalityProvider>> {
        let kv = self.kv.read();
        let entries = kv.prefix_scan(KeyPrefix::PROVIDER)?;
        entries
            .into_iter()
            .map(|(key, value)| decode(&key, &value))
            .collect()
    }

    /// Change a provider's status, enforcing the transition table.
    pub fn set_status(&self, btc_pk: &BtcPublicKey, next: ProviderStatus) -> StoreResult<()> {
        let mut kv = self.kv.write();
        let mut record = read_provider(&*kv, btc_pk)?;
        if !record.status.can_transition_to(next) {
            return Err(StoreError::InvalidStatusTransition {
                from: format!("{:?}", record.status),
                to: format!("{next:?}"),
            });
        }
        tracing::info!(
            btc_pk = %short_hex(btc_pk),
            from = ?record.status,
            to = ?next,
            "provider status changed"
        );
        record.status = next;
        kv.put(&KeyPrefix::provider_key(btc_pk), &encode(&record)?)
    }

    /// Atomically replace a provider's bookmarks.
    ///
    /// Rejects any regression of an individual bookmark and any update that
    /// breaks `voted <= processed <= committed`.
    pub fn update_bookmarks(&self, btc_pk: &BtcPublicKey, next: Bookmarks) -> StoreResult<()> {
        let mut kv = self.kv.write();
        let mut record = read_provider(&*kv, btc_pk)?;
        record.bookmarks.check_monotonic(&next)?;
        next.check_order()?;
        record.bookmarks = next;
        kv.put(&KeyPrefix::provider_key(btc_pk), &encode(&record)?)
    }

    /// Persist a vote record and the matching bookmark advance in one batch.
    ///
    /// Idempotent for an identical record at the same height; a record with
    /// a different hash is rejected with `ConflictingVoteRecord`.
    pub fn record_vote(
        &self,
        btc_pk: &BtcPublicKey,
        vote: &StoredVoteRecord,
        next: Bookmarks,
    ) -> StoreResult<()> {
        let mut kv = self.kv.write();
        let mut record = read_provider(&*kv, btc_pk)?;

        let vote_key = KeyPrefix::vote_key(btc_pk, vote.height);
        if let Some(raw) = kv.get(&vote_key)? {
            let existing: StoredVoteRecord = decode(&vote_key, &raw)?;
            if existing.block_hash == vote.block_hash {
                return Ok(());
            }
            return Err(StoreError::ConflictingVoteRecord {
                height: vote.height,
            });
        }

        record.bookmarks.check_monotonic(&next)?;
        next.check_order()?;
        record.bookmarks = next;

        kv.atomic_batch_write(vec![
            BatchOperation::put(KeyPrefix::provider_key(btc_pk), encode(&record)?),
            BatchOperation::put(vote_key, encode(vote)?),
        ])
    }

    /// Load the vote record at a height, if any.
    pub fn vote_record(
        &self,
        btc_pk: &BtcPublicKey,
        height: u64,
    ) -> StoreResult<Option<StoredVoteRecord>> {
        let kv = self.kv.read();
        let key = KeyPrefix::vote_key(btc_pk, height);
        match kv.get(&key)? {
            Some(raw) => Ok(Some(decode(&key, &raw)?)),
            None => Ok(None),
        }
    }

    /// List a provider's vote records in height order.
    pub fn vote_records(&self, btc_pk: &BtcPublicKey) -> StoreResult<Vec<StoredVoteRecord>> {
        let kv = self.kv.read();
        let entries = kv.prefix_scan(&KeyPrefix::vote_prefix(btc_pk))?;
        entries
            .into_iter()
            .map(|(key, value)| decode(&key, &value))
            .collect()
    }
}

fn read_provider<KV: KeyValueStore>(
    kv: &KV,
    btc_pk: &BtcPublicKey,
) -> StoreResult<StoredFinalityProvider> {
    let key = KeyPrefix::provider_key(btc_pk);
    let raw = kv.get(&key)?.ok_or_else(|| StoreError::ProviderNotFound {
        btc_pk: short_hex(btc_pk),
    })?;
    decode(&key, &raw)
}

fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| StoreError::Serialization {
        reason: e.to_string(),
    })
}

fn decode<T: DeserializeOwned>(key: &[u8], raw: &[u8]) -> StoreResult<T> {
    bincode::deserialize(raw).map_err(|e| StoreError::CorruptedRecord {
        key: short_hex(key),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::InMemoryKvStore;

    fn test_store() -> ProviderStore<InMemoryKvStore> {
        ProviderStore::new(InMemoryKvStore::new())
    }

    fn test_record(tag: u8) -> StoredFinalityProvider {
        StoredFinalityProvider::new([tag; 32], [tag; 33], format!("provider-{tag}"))
    }

    #[test]
    fn test_create_and_get_roundtrip() {
        let store = test_store();
        let record = test_record(1);
        store.create_provider(&record).unwrap();

        let loaded = store.get_provider(&record.btc_pk).unwrap();
        assert_eq!(loaded, record);
        assert!(store.has_provider(&record.btc_pk).unwrap());
    }

    #[test]
    fn test_create_duplicate_rejected() {
        let store = test_store();
        let record = test_record(1);
        store.create_provider(&record).unwrap();
        assert!(matches!(
            store.create_provider(&record),
            Err(StoreError::ProviderExists { .. })
        ));
    }

    #[test]
    fn test_get_missing_provider() {
        let store = test_store();
        assert!(matches!(
            store.get_provider(&[9u8; 32]),
            Err(StoreError::ProviderNotFound { .. })
        ));
    }

    #[test]
    fn test_list_providers() {
        let store = test_store();
        store.create_provider(&test_record(1)).unwrap();
        store.create_provider(&test_record(2)).unwrap();
        assert_eq!(store.list_providers().unwrap().len(), 2);
    }

    #[test]
    fn test_status_transitions_enforced() {
        let store = test_store();
        let record = test_record(1);
        store.create_provider(&record).unwrap();

        store
            .set_status(&record.btc_pk, ProviderStatus::Registered)
            .unwrap();
        store
            .set_status(&record.btc_pk, ProviderStatus::Active)
            .unwrap();

        // Active -> Registered is not in the table.
        assert!(matches!(
            store.set_status(&record.btc_pk, ProviderStatus::Registered),
            Err(StoreError::InvalidStatusTransition { .. })
        ));

        store
            .set_status(&record.btc_pk, ProviderStatus::Slashed)
            .unwrap();
        // Slashed is terminal.
        assert!(store
            .set_status(&record.btc_pk, ProviderStatus::Active)
            .is_err());
    }

    #[test]
    fn test_update_bookmarks_monotonic() {
        let store = test_store();
        let record = test_record(1);
        store.create_provider(&record).unwrap();

        let next = Bookmarks {
            last_voted_height: 10,
            last_processed_height: 10,
            last_committed_height: 15,
        };
        store.update_bookmarks(&record.btc_pk, next).unwrap();
        assert_eq!(store.get_provider(&record.btc_pk).unwrap().bookmarks, next);

        // Regression rejected and state unchanged.
        let regress = Bookmarks {
            last_voted_height: 9,
            ..next
        };
        assert!(matches!(
            store.update_bookmarks(&record.btc_pk, regress),
            Err(StoreError::BookmarkRegression { .. })
        ));
        assert_eq!(store.get_provider(&record.btc_pk).unwrap().bookmarks, next);
    }

    #[test]
    fn test_update_bookmarks_ordering() {
        let store = test_store();
        let record = test_record(1);
        store.create_provider(&record).unwrap();

        let bad = Bookmarks {
            last_voted_height: 5,
            last_processed_height: 4,
            last_committed_height: 10,
        };
        assert!(matches!(
            store.update_bookmarks(&record.btc_pk, bad),
            Err(StoreError::BookmarkOrder { .. })
        ));
    }

    #[test]
    fn test_record_vote_advances_bookmarks_atomically() {
        let store = test_store();
        let record = test_record(1);
        store.create_provider(&record).unwrap();
        store
            .update_bookmarks(
                &record.btc_pk,
                Bookmarks {
                    last_voted_height: 0,
                    last_processed_height: 0,
                    last_committed_height: 20,
                },
            )
            .unwrap();

        let vote = StoredVoteRecord {
            height: 11,
            block_hash: [0xAB; 32],
            signature: [0xCD; 32],
        };
        let next = Bookmarks {
            last_voted_height: 11,
            last_processed_height: 11,
            last_committed_height: 20,
        };
        store.record_vote(&record.btc_pk, &vote, next).unwrap();

        assert_eq!(store.get_provider(&record.btc_pk).unwrap().bookmarks, next);
        assert_eq!(
            store.vote_record(&record.btc_pk, 11).unwrap(),
            Some(vote)
        );
    }

    #[test]
    fn test_record_vote_idempotent_on_identical_record() {
        let store = test_store();
        let record = test_record(1);
        store.create_provider(&record).unwrap();

        let vote = StoredVoteRecord {
            height: 11,
            block_hash: [0xAB; 32],
            signature: [0xCD; 32],
        };
        let next = Bookmarks {
            last_voted_height: 11,
            last_processed_height: 11,
            last_committed_height: 20,
        };
        store.record_vote(&record.btc_pk, &vote, next).unwrap();
        // Same height, same hash: no-op.
        store.record_vote(&record.btc_pk, &vote, next).unwrap();
        assert_eq!(store.vote_records(&record.btc_pk).unwrap().len(), 1);
    }

    #[test]
    fn test_record_vote_conflicting_hash_rejected() {
        let store = test_store();
        let record = test_record(1);
        store.create_provider(&record).unwrap();

        let vote = StoredVoteRecord {
            height: 11,
            block_hash: [0xAB; 32],
            signature: [0xCD; 32],
        };
        let next = Bookmarks {
            last_voted_height: 11,
            last_processed_height: 11,
            last_committed_height: 20,
        };
        store.record_vote(&record.btc_pk, &vote, next).unwrap();

        let conflicting = StoredVoteRecord {
            block_hash: [0xEE; 32],
            ..vote
        };
        assert!(matches!(
            store.record_vote(&record.btc_pk, &conflicting, next),
            Err(StoreError::ConflictingVoteRecord { height: 11 })
        ));
        // Original record untouched.
        assert_eq!(
            store.vote_record(&record.btc_pk, 11).unwrap().unwrap(),
            vote
        );
    }

    #[test]
    fn test_vote_records_in_height_order() {
        let store = test_store();
        let record = test_record(1);
        store.create_provider(&record).unwrap();

        for height in [1u64, 2, 3, 300] {
            let vote = StoredVoteRecord {
                height,
                block_hash: [height as u8; 32],
                signature: [0; 32],
            };
            let next = Bookmarks {
                last_voted_height: height,
                last_processed_height: height,
                last_committed_height: 1000,
            };
            store.record_vote(&record.btc_pk, &vote, next).unwrap();
        }

        // Big-endian height keys keep the scan in numeric order even past
        // the one-byte boundary.
        let votes = store.vote_records(&record.btc_pk).unwrap();
        let heights: Vec<u64> = votes.iter().map(|v| v.height).collect();
        assert_eq!(heights, vec![1, 2, 3, 300]);
    }
}
