//! Batch synchronizer.
//!
//! Each target runs the same pipeline: fetch live statistics, substitute the
//! fallback snapshot if the provider cannot answer, then reconcile into the
//! store. The pipeline never fails outward, so every target yields exactly one
//! [`SyncResult`] and one target's trouble never stops the batch.

use std::panic::AssertUnwindSafe;
use std::pin::pin;
use std::sync::Arc;
use std::time::Instant;

use futures_util::{FutureExt, StreamExt, stream};
use listwise_types::{MarketSnapshot, Period, Provenance, SyncResult, SyncSummary, SyncTarget};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::fallback::fallback_snapshot;
use crate::provider::MarketStatisticsProvider;
use crate::reconcile::Reconciler;

pub struct BatchSynchronizer {
    provider: Arc<dyn MarketStatisticsProvider>,
    reconciler: Reconciler,
    max_concurrency: usize,
    period: Option<Period>,
}

impl BatchSynchronizer {
    /// Sequential synchronizer for the current UTC month.
    pub fn new(provider: Arc<dyn MarketStatisticsProvider>, reconciler: Reconciler) -> Self {
        Self {
            provider,
            reconciler,
            max_concurrency: 1,
            period: None,
        }
    }

    /// Process up to `max_concurrency` targets at once. Results keep target order.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Pin every snapshot to `period` instead of the month the run starts in.
    pub fn with_period(mut self, period: Period) -> Self {
        self.period = Some(period);
        self
    }

    pub async fn sync_all(&self, targets: &[SyncTarget]) -> SyncSummary {
        self.sync_all_with_cancellation(targets, &CancellationToken::new()).await
    }

    /// Like [`Self::sync_all`], but stops taking results once `cancel` fires
    /// and returns what completed so far with `cancelled` set.
    pub async fn sync_all_with_cancellation(&self, targets: &[SyncTarget], cancel: &CancellationToken) -> SyncSummary {
        let started = Instant::now();
        let period = self.period.unwrap_or_else(Period::current);
        info!(
            targets = targets.len(),
            max_concurrency = self.max_concurrency,
            period = %period,
            "market sync started"
        );

        // Outcomes arrive in completion order so a cancel never discards a
        // target that already reconciled; target order is restored below.
        let mut pending = pin!(
            stream::iter(targets.iter().enumerate())
                .map(|(index, target)| self.sync_target_guarded(target, period).map(move |outcome| (index, outcome)))
                .buffer_unordered(self.max_concurrency)
        );
        let mut outcomes = Vec::with_capacity(targets.len());
        let mut cancelled = false;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    cancelled = true;
                    while let Some(Some(outcome)) = pending.next().now_or_never() {
                        outcomes.push(outcome);
                    }
                    break;
                }
                next = pending.next() => match next {
                    Some(outcome) => outcomes.push(outcome),
                    None => break,
                },
            }
        }
        outcomes.sort_by_key(|(index, _)| *index);
        let outcomes = outcomes.into_iter().map(|(_, outcome)| outcome).collect();

        let summary = SyncSummary::from_results(outcomes, cancelled);
        if cancelled {
            warn!(
                completed = summary.total_attempted,
                targets = targets.len(),
                "market sync cancelled"
            );
        }
        info!(
            attempted = summary.total_attempted,
            success = summary.total_success,
            errors = summary.total_errors,
            completion_rate = summary.completion_rate,
            duration_ms = started.elapsed().as_millis(),
            "market sync finished"
        );
        summary
    }

    /// Run one target, converting a panic anywhere in its pipeline into an
    /// `exception` result.
    async fn sync_target_guarded(&self, target: &SyncTarget, period: Period) -> SyncResult {
        match AssertUnwindSafe(self.sync_target(target, period)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|message| message.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                warn!(location = %target, error = %message, "market sync target panicked");
                SyncResult::new(target.clone(), Provenance::Exception).with_error(Some(format!("sync panicked: {message}")))
            }
        }
    }

    /// Fetch, substitute on failure, reconcile.
    pub async fn sync_target(&self, target: &SyncTarget, period: Period) -> SyncResult {
        let started = Instant::now();
        debug!(location = %target, provider = %self.provider.name(), "market sync target fetching");

        let (snapshot, variant, fetch_error) = match self.provider.fetch_market_statistics(target).await {
            Ok(fetched) => {
                debug!(location = %target, report = ?fetched.report, "market statistics fetched");
                (
                    MarketSnapshot::from_metrics(target, period, fetched.value, Provenance::Api),
                    Some(fetched.variant),
                    None,
                )
            }
            Err(error) => {
                let message = error.redacted();
                warn!(location = %target, error = %message, "market statistics unavailable; using fallback snapshot");
                (fallback_snapshot(target, period), None, Some(message))
            }
        };

        let persisted = self.reconciler.reconcile(snapshot).await;
        let error = match (fetch_error, persisted.error) {
            (Some(fetch), Some(persist)) => Some(format!("{fetch}; {persist}")),
            (fetch, persist) => fetch.or(persist),
        };
        debug!(
            location = %target,
            source = %persisted.provenance,
            duration_ms = started.elapsed().as_millis(),
            "market sync target finished"
        );

        SyncResult::new(target.clone(), persisted.provenance)
            .with_snapshot(persisted.snapshot)
            .with_error(error)
            .with_variant(variant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::fallback::FALLBACK_MEDIAN_PRICE;
    use crate::provider::{CascadeReport, Fetched};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use listwise_types::MarketMetrics;
    use std::time::Duration;

    /// Answers by city: `Down` is unavailable, `Boom` panics, `Slow` sleeps.
    struct CityProvider;

    #[async_trait]
    impl MarketStatisticsProvider for CityProvider {
        fn name(&self) -> &str {
            "city_provider"
        }

        async fn fetch_market_statistics(&self, target: &SyncTarget) -> Result<Fetched<MarketMetrics>, ProviderError> {
            match target.city.as_str() {
                "Down" => Err(ProviderError::Unavailable {
                    provider: "city_provider".into(),
                    operation: "market statistics".into(),
                    attempts: 3,
                    last_error: "status 500".into(),
                }),
                "Boom" => panic!("provider exploded"),
                city => {
                    if city == "Slow" {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                    }
                    Ok(Fetched {
                        value: MarketMetrics {
                            median_price: 420_000,
                            inventory_months: 2.0,
                            ..MarketMetrics::default()
                        },
                        variant: "city_state".into(),
                        report: CascadeReport::default(),
                    })
                }
            }
        }
    }

    fn synchronizer(store: Arc<MemoryStore>) -> BatchSynchronizer {
        BatchSynchronizer::new(Arc::new(CityProvider), Reconciler::new(store)).with_period(Period::new(5, 2025).unwrap())
    }

    fn targets(cities: &[&str]) -> Vec<SyncTarget> {
        cities.iter().map(|city| SyncTarget::new(*city, "GA", None)).collect()
    }

    #[tokio::test]
    async fn every_target_yields_one_result_in_order() {
        let store = Arc::new(MemoryStore::new());
        let summary = synchronizer(store.clone())
            .sync_all(&targets(&["Canton", "Down", "Marietta"]))
            .await;

        assert_eq!(summary.total_attempted, 3);
        assert_eq!(summary.results.len() + summary.errors.len(), 3);
        assert_eq!(summary.total_success, 2);
        assert_eq!(summary.results[1].target.city, "Marietta");
        assert_eq!(summary.results[0].variant.as_deref(), Some("city_state"));
        assert!((summary.completion_rate - 2.0 / 3.0).abs() < 1e-9);

        let fallback = &summary.errors[0];
        assert_eq!(fallback.source, Provenance::Fallback);
        assert_eq!(fallback.snapshot.as_ref().unwrap().median_price, FALLBACK_MEDIAN_PRICE);
        assert!(fallback.error.as_deref().unwrap().contains("status 500"));
        assert_eq!(store.snapshot_count(), 3);
    }

    #[tokio::test]
    async fn panicking_target_becomes_exception_and_batch_continues() {
        let store = Arc::new(MemoryStore::new());
        let summary = synchronizer(store).sync_all(&targets(&["Boom", "Canton"])).await;

        assert_eq!(summary.total_attempted, 2);
        assert_eq!(summary.errors[0].source, Provenance::Exception);
        assert!(summary.errors[0].error.as_deref().unwrap().contains("provider exploded"));
        assert_eq!(summary.results[0].target.city, "Canton");
    }

    #[tokio::test]
    async fn concurrent_runs_keep_target_order() {
        let store = Arc::new(MemoryStore::new());
        let summary = synchronizer(store.clone())
            .with_max_concurrency(4)
            .sync_all(&targets(&["A", "B", "C", "D", "E"]))
            .await;

        let cities: Vec<&str> = summary.results.iter().map(|result| result.target.city.as_str()).collect();
        assert_eq!(cities, vec!["A", "B", "C", "D", "E"]);
        assert_eq!(store.snapshot_count(), 5);
    }

    #[tokio::test]
    async fn empty_batch_has_zero_completion_rate() {
        let summary = synchronizer(Arc::new(MemoryStore::new())).sync_all(&[]).await;
        assert_eq!(summary.total_attempted, 0);
        assert_eq!(summary.completion_rate, 0.0);
        assert!(!summary.cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_returns_partial_summary() {
        let store = Arc::new(MemoryStore::new());
        let synchronizer = synchronizer(store);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let summary = synchronizer
            .sync_all_with_cancellation(&targets(&["Canton", "Slow", "Marietta"]), &cancel)
            .await;

        assert!(summary.cancelled);
        assert_eq!(summary.total_attempted, 1);
        assert_eq!(summary.results[0].target.city, "Canton");
    }

    #[tokio::test(start_paused = true)]
    async fn cancelling_a_parallel_batch_keeps_targets_that_finished() {
        let store = Arc::new(MemoryStore::new());
        let synchronizer = synchronizer(store.clone()).with_max_concurrency(3);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let summary = synchronizer
            .sync_all_with_cancellation(&targets(&["Slow", "A", "B"]), &cancel)
            .await;

        assert!(summary.cancelled);
        assert_eq!(summary.total_attempted, 2);
        assert_eq!(store.snapshot_count(), 2);
        let cities: Vec<&str> = summary.results.iter().map(|result| result.target.city.as_str()).collect();
        assert_eq!(cities, vec!["A", "B"]);
    }
}
