//! Deduplication ledger: at-most-once application of each `event_id`.
//!
//! A bounded per-process LRU answers repeat deliveries without a round trip;
//! the `phase_events` uniqueness constraint is the authority across replicas.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::store::{PhaseStore, ProcessedEvent};

pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// Result of trying to record an event.
#[derive(Debug)]
pub enum LedgerOutcome {
    /// First delivery: the event is now in the ledger.
    Recorded,
    /// Seen before, in this process or by any replica.
    AlreadyProcessed,
    /// The ledger could not be written; the event was not recorded.
    StorageFailed(StoreError),
}

pub struct DedupLedger {
    store: Arc<dyn PhaseStore>,
    seen: Mutex<LruCache<String, ()>>,
}

impl DedupLedger {
    pub fn new(store: Arc<dyn PhaseStore>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            store,
            seen: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub async fn record_if_new(&self, event_id: &str, job_id: &str, event_type: &str) -> LedgerOutcome {
        if self.cache_contains(event_id) {
            debug!(event_id, job_id, event_type, "duplicate event (cache hit)");
            return LedgerOutcome::AlreadyProcessed;
        }

        let event = ProcessedEvent::new(event_id, job_id, event_type);
        match self.store.insert_phase_event(&event).await {
            Ok(()) => {
                self.remember(event_id);
                LedgerOutcome::Recorded
            }
            Err(StoreError::UniqueViolation(_)) => {
                debug!(event_id, job_id, event_type, "duplicate event (ledger)");
                self.remember(event_id);
                LedgerOutcome::AlreadyProcessed
            }
            Err(e) => {
                warn!(event_id, job_id, event_type, error = %e, "failed to record event");
                LedgerOutcome::StorageFailed(e)
            }
        }
    }

    /// Number of event ids currently held in the fast-path cache.
    pub fn cached_len(&self) -> usize {
        self.lock().len()
    }

    fn cache_contains(&self, event_id: &str) -> bool {
        self.lock().get(event_id).is_some()
    }

    fn remember(&self, event_id: &str) {
        self.lock().put(event_id.to_string(), ());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<String, ()>> {
        self.seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryPhaseStore, StoreOp};
    use matchflow_core::{AssetTypes, Phase};

    fn ledger_with_job(capacity: usize) -> (Arc<MemoryPhaseStore>, DedupLedger) {
        let store = Arc::new(MemoryPhaseStore::new());
        store.insert_job("J1", "fashion", Phase::Collection, AssetTypes::default());
        let ledger = DedupLedger::new(store.clone(), capacity);
        (store, ledger)
    }

    #[tokio::test]
    async fn first_delivery_is_recorded_then_duplicate() {
        let (store, ledger) = ledger_with_job(16);

        assert!(matches!(
            ledger.record_if_new("e1", "J1", "image.keypoints.completed").await,
            LedgerOutcome::Recorded
        ));
        assert!(matches!(
            ledger.record_if_new("e1", "J1", "image.keypoints.completed").await,
            LedgerOutcome::AlreadyProcessed
        ));
        assert_eq!(store.processed_events("J1").len(), 1);
        assert_eq!(ledger.cached_len(), 1);
    }

    #[tokio::test]
    async fn durable_uniqueness_catches_evicted_ids() {
        let (store, ledger) = ledger_with_job(1);

        ledger.record_if_new("e1", "J1", "image.keypoints.completed").await;
        ledger.record_if_new("e2", "J1", "image.embeddings.completed").await;
        // e1 was evicted from the cache; the store still rejects it.
        assert!(matches!(
            ledger.record_if_new("e1", "J1", "image.keypoints.completed").await,
            LedgerOutcome::AlreadyProcessed
        ));
        assert_eq!(store.processed_events("J1").len(), 2);
        assert_eq!(ledger.cached_len(), 1);
    }

    #[tokio::test]
    async fn another_replica_recorded_it_first() {
        let (store, ledger) = ledger_with_job(16);
        store
            .insert_phase_event(&ProcessedEvent::new("e1", "J1", "image.keypoints.completed"))
            .await
            .unwrap();

        assert!(matches!(
            ledger.record_if_new("e1", "J1", "image.keypoints.completed").await,
            LedgerOutcome::AlreadyProcessed
        ));
        assert_eq!(ledger.cached_len(), 1);
    }

    #[tokio::test]
    async fn storage_failure_is_not_cached() {
        let (store, ledger) = ledger_with_job(16);
        store.fail(StoreOp::InsertEvent, None);

        assert!(matches!(
            ledger.record_if_new("e1", "J1", "image.keypoints.completed").await,
            LedgerOutcome::StorageFailed(StoreError::Unavailable(_))
        ));
        assert_eq!(ledger.cached_len(), 0);

        store.recover();
        assert!(matches!(
            ledger.record_if_new("e1", "J1", "image.keypoints.completed").await,
            LedgerOutcome::Recorded
        ));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let store = Arc::new(MemoryPhaseStore::new());
        let ledger = DedupLedger::new(store, 0);
        assert_eq!(ledger.cached_len(), 0);
    }
}
