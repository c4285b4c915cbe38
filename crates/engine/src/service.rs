//! Inbound service interface bundling synchronization, search and lookups.

use std::sync::Arc;

use listwise_api::{PROPERTY_API_KEY_ENV, ProviderClient, ProviderCredentials};
use listwise_types::{
    LocationKey, MarketSnapshot, Period, Property, PropertyAddress, PropertyFilters, SaleRecord, SyncSummary, SyncTarget,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Settings;
use crate::error::ServiceError;
use crate::provider::{
    AdapterOptions, ListingFeedAdapter, ListingProvider, MarketStatisticsProvider, PropertyApiAdapter, PropertyRecordProvider,
};
use crate::reconcile::Reconciler;
use crate::search::PropertySearch;
use crate::store::{MarketStore, open_store};
use crate::sync::BatchSynchronizer;

pub struct MarketService {
    store: Arc<dyn MarketStore>,
    property_api: Arc<PropertyApiAdapter>,
    reconciler: Reconciler,
    synchronizer: BatchSynchronizer,
    search: PropertySearch,
    require_credentials: bool,
}

impl MarketService {
    pub fn new(
        store: Arc<dyn MarketStore>,
        property_api: Arc<PropertyApiAdapter>,
        listings: Option<Arc<dyn ListingProvider>>,
    ) -> Self {
        let reconciler = Reconciler::new(Arc::clone(&store));
        let statistics: Arc<dyn MarketStatisticsProvider> = property_api.clone();
        Self {
            synchronizer: BatchSynchronizer::new(statistics, reconciler.clone()),
            search: PropertySearch::new(Arc::clone(&store), listings),
            reconciler,
            store,
            property_api,
            require_credentials: false,
        }
    }

    /// Build HTTP clients, adapters and the store described by `settings`.
    pub async fn connect(settings: &Settings, credentials: &ProviderCredentials) -> Result<Self, ServiceError> {
        let timeout = settings.request_timeout();
        let property_client = ProviderClient::new(&settings.property_api.base_url, timeout)
            .map_err(|error| ServiceError::Configuration(error.to_string()))?;
        let listing_client = ProviderClient::new(&settings.listing_feed.base_url, timeout)
            .map_err(|error| ServiceError::Configuration(error.to_string()))?;
        let store = open_store(&settings.database_url).await?;

        let property_api = Arc::new(PropertyApiAdapter::new(
            Arc::new(property_client),
            credentials.property_api_key.clone(),
            AdapterOptions::new(&settings.property_api.api_key_header, timeout, settings.max_in_flight_per_provider),
        ));
        let listings: Arc<dyn ListingProvider> = Arc::new(ListingFeedAdapter::new(
            Arc::new(listing_client),
            credentials.listing_feed_api_key.clone(),
            AdapterOptions::new(&settings.listing_feed.api_key_header, timeout, settings.max_in_flight_per_provider),
        ));
        debug!(?credentials, database_url = %listwise_util::redact_sensitive(&settings.database_url), "market service configured");

        Ok(Self::new(store, property_api, Some(listings))
            .with_max_concurrency(settings.max_concurrency)
            .with_required_credentials(settings.require_credentials))
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.synchronizer = self.synchronizer.with_max_concurrency(max_concurrency);
        self
    }

    pub fn with_period(mut self, period: Period) -> Self {
        self.synchronizer = self.synchronizer.with_period(period);
        self
    }

    pub fn with_required_credentials(mut self, require_credentials: bool) -> Self {
        self.require_credentials = require_credentials;
        self
    }

    pub async fn synchronize_market_data(&self, targets: &[SyncTarget]) -> Result<SyncSummary, ServiceError> {
        self.synchronize_market_data_with_cancellation(targets, &CancellationToken::new())
            .await
    }

    /// Run a batch. Only a missing credential under `require_credentials`
    /// fails the call; every per-target problem lands in the summary.
    pub async fn synchronize_market_data_with_cancellation(
        &self,
        targets: &[SyncTarget],
        cancel: &CancellationToken,
    ) -> Result<SyncSummary, ServiceError> {
        if self.require_credentials && !self.property_api.has_credential() {
            return Err(ServiceError::Configuration(format!(
                "{PROPERTY_API_KEY_ENV} is required to synchronize market data"
            )));
        }
        Ok(self.synchronizer.sync_all_with_cancellation(targets, cancel).await)
    }

    pub async fn search_properties(&self, filters: &PropertyFilters) -> Result<Vec<Property>, ServiceError> {
        Ok(self.search.search(filters).await?)
    }

    /// Latest stored snapshot for a location, whatever its provenance.
    pub async fn get_market_data(&self, city: &str, state: &str, zip: Option<&str>) -> Result<Option<MarketSnapshot>, ServiceError> {
        Ok(self.store.latest_snapshot(&LocationKey::new(city, state, zip)).await?)
    }

    /// Every stored snapshot for a location, newest first.
    pub async fn market_history(&self, city: &str, state: &str, zip: Option<&str>) -> Result<Vec<MarketSnapshot>, ServiceError> {
        Ok(self.store.snapshots_for_location(&LocationKey::new(city, state, zip)).await?)
    }

    pub async fn property_details(&self, address: &PropertyAddress) -> Result<Property, ServiceError> {
        let fetched = self.property_api.fetch_property_details(address).await?;
        info!(address = %address, variant = %fetched.variant, "property detail fetched");
        Ok(fetched.value)
    }

    pub async fn sale_history(&self, address: &PropertyAddress) -> Result<Vec<SaleRecord>, ServiceError> {
        Ok(self.property_api.fetch_sale_history(address).await?.value)
    }

    /// Store one pre-normalized property, as delivered by the bulk importer.
    pub async fn import_property(&self, property: Property) -> Result<Property, ServiceError> {
        Ok(self.reconciler.reconcile_property(property).await?)
    }
}
