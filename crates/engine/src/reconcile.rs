//! Record reconciler: persists snapshots under their natural key and turns
//! write failures into tagged results instead of errors.

use std::sync::Arc;

use listwise_types::{MarketSnapshot, Property, Provenance};
use listwise_util::redact_sensitive;
use tracing::{info, warn};

use crate::error::StoreError;
use crate::store::MarketStore;

/// What the caller ends up with after one reconcile.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistResult {
    pub provenance: Provenance,
    pub snapshot: Option<MarketSnapshot>,
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn MarketStore>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn MarketStore>) -> Self {
        Self { store }
    }

    /// Upsert `snapshot`. On a failed write, the most recent stored row for
    /// the location is returned as `existing`; with no such row the result is
    /// `exception` (`fallback_error` for fallback input) carrying the error.
    pub async fn reconcile(&self, snapshot: MarketSnapshot) -> PersistResult {
        let write_error = match self.store.upsert_snapshot(&snapshot).await {
            Ok(stored) => {
                info!(
                    city = %stored.city,
                    state = %stored.state,
                    period = %stored.period(),
                    provenance = %stored.provenance,
                    "market snapshot stored"
                );
                return PersistResult {
                    provenance: stored.provenance,
                    snapshot: Some(stored),
                    error: None,
                };
            }
            Err(error) => redact_sensitive(&error.to_string()),
        };

        let location = snapshot.location_key();
        warn!(
            city = %location.city,
            state = %location.state,
            error = %write_error,
            "market snapshot write failed; looking for a stored row"
        );

        let lookup_error = match self.store.latest_snapshot(&location).await {
            Ok(Some(prior)) => {
                return PersistResult {
                    provenance: Provenance::Existing,
                    snapshot: Some(prior.with_provenance(Provenance::Existing)),
                    error: Some(write_error),
                };
            }
            Ok(None) => None,
            Err(error) => Some(redact_sensitive(&error.to_string())),
        };

        let provenance = match snapshot.provenance {
            Provenance::Fallback => Provenance::FallbackError,
            _ => Provenance::Exception,
        };
        let error = match lookup_error {
            Some(lookup_error) => format!("{write_error}; recovery lookup failed: {lookup_error}"),
            None => write_error,
        };
        PersistResult {
            provenance,
            snapshot: None,
            error: Some(error),
        }
    }

    /// Entry point for the bulk importer: upsert one pre-normalized property.
    pub async fn reconcile_property(&self, property: Property) -> Result<Property, StoreError> {
        self.store.upsert_property(&property).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use listwise_types::{LocationKey, MarketMetrics, Period, PropertyFilters, SyncTarget};

    /// Accepts reads, rejects every snapshot write.
    struct ReadOnlyStore {
        inner: MemoryStore,
        fail_lookup: bool,
    }

    #[async_trait]
    impl MarketStore for ReadOnlyStore {
        async fn upsert_snapshot(&self, _snapshot: &MarketSnapshot) -> Result<MarketSnapshot, StoreError> {
            Err(StoreError::Backend("database is locked".into()))
        }

        async fn latest_snapshot(&self, location: &LocationKey) -> Result<Option<MarketSnapshot>, StoreError> {
            if self.fail_lookup {
                return Err(StoreError::Backend("disk I/O error".into()));
            }
            self.inner.latest_snapshot(location).await
        }

        async fn snapshots_for_location(&self, location: &LocationKey) -> Result<Vec<MarketSnapshot>, StoreError> {
            self.inner.snapshots_for_location(location).await
        }

        async fn upsert_property(&self, property: &Property) -> Result<Property, StoreError> {
            self.inner.upsert_property(property).await
        }

        async fn search_properties(&self, filters: &PropertyFilters) -> Result<Vec<Property>, StoreError> {
            self.inner.search_properties(filters).await
        }
    }

    fn snapshot(month: u32, provenance: Provenance) -> MarketSnapshot {
        let metrics = MarketMetrics {
            median_price: 400_000,
            ..MarketMetrics::default()
        };
        MarketSnapshot::from_metrics(
            &SyncTarget::new("Canton", "GA", Some("30115")),
            Period::new(month, 2025).unwrap(),
            metrics,
            provenance,
        )
    }

    #[tokio::test]
    async fn successful_write_keeps_input_provenance() {
        let store = Arc::new(MemoryStore::new());
        let reconciler = Reconciler::new(store.clone());

        let result = reconciler.reconcile(snapshot(4, Provenance::Api)).await;

        assert_eq!(result.provenance, Provenance::Api);
        assert!(result.error.is_none());
        assert_eq!(store.snapshot_count(), 1);
    }

    #[tokio::test]
    async fn reconciling_twice_leaves_one_row() {
        let store = Arc::new(MemoryStore::new());
        let reconciler = Reconciler::new(store.clone());

        reconciler.reconcile(snapshot(4, Provenance::Fallback)).await;
        let second = reconciler.reconcile(snapshot(4, Provenance::Api)).await;

        assert_eq!(store.snapshot_count(), 1);
        assert_eq!(second.snapshot.unwrap().provenance, Provenance::Api);
    }

    #[tokio::test]
    async fn failed_write_recovers_prior_row_as_existing() {
        let inner = MemoryStore::new();
        inner.upsert_snapshot(&snapshot(3, Provenance::Api)).await.unwrap();
        let reconciler = Reconciler::new(Arc::new(ReadOnlyStore {
            inner,
            fail_lookup: false,
        }));

        let result = reconciler.reconcile(snapshot(4, Provenance::Api)).await;

        assert_eq!(result.provenance, Provenance::Existing);
        let recovered = result.snapshot.unwrap();
        assert_eq!(recovered.month, 3);
        assert_eq!(recovered.provenance, Provenance::Existing);
        assert!(result.error.unwrap().contains("database is locked"));
    }

    #[tokio::test]
    async fn failed_write_without_prior_row_is_tagged_by_input() {
        let reconciler = Reconciler::new(Arc::new(ReadOnlyStore {
            inner: MemoryStore::new(),
            fail_lookup: false,
        }));

        let live = reconciler.reconcile(snapshot(4, Provenance::Api)).await;
        let synthetic = reconciler.reconcile(snapshot(4, Provenance::Fallback)).await;

        assert_eq!(live.provenance, Provenance::Exception);
        assert!(live.snapshot.is_none());
        assert_eq!(synthetic.provenance, Provenance::FallbackError);
    }

    #[tokio::test]
    async fn failed_lookup_is_reported_alongside_the_write_error() {
        let reconciler = Reconciler::new(Arc::new(ReadOnlyStore {
            inner: MemoryStore::new(),
            fail_lookup: true,
        }));

        let result = reconciler.reconcile(snapshot(4, Provenance::Api)).await;

        let error = result.error.unwrap();
        assert_eq!(result.provenance, Provenance::Exception);
        assert!(error.contains("database is locked") && error.contains("disk I/O error"), "{error}");
    }
}
