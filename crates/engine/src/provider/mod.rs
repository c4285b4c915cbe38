//! Provider adapters.
//!
//! Three seams, one per kind of external data: market statistics, property
//! records and listing search. Each adapter resolves its credential before
//! issuing anything, then runs an [`EndpointCascade`] over its endpoint
//! variants and normalizes the winning payload.

mod cascade;
mod listing_feed;
pub mod normalize;
mod property_api;

use std::time::Duration;

use async_trait::async_trait;
use listwise_types::{MarketMetrics, Property, PropertyAddress, PropertyFilters, SaleRecord, SyncTarget};

pub use cascade::{
    AttemptOutcome, CascadeContext, CascadeReport, EndpointCascade, EndpointVariant, Fetched, QueryVariant, VariantAttempt,
    VariantFailure,
};
pub use listing_feed::ListingFeedAdapter;
pub use property_api::PropertyApiAdapter;

use crate::error::ProviderError;

/// Fetches monthly market statistics for a location.
#[async_trait]
pub trait MarketStatisticsProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_market_statistics(&self, target: &SyncTarget) -> Result<Fetched<MarketMetrics>, ProviderError>;
}

/// Fetches per-property records from a property-data provider.
#[async_trait]
pub trait PropertyRecordProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_property_details(&self, address: &PropertyAddress) -> Result<Fetched<Property>, ProviderError>;

    async fn fetch_sale_history(&self, address: &PropertyAddress) -> Result<Fetched<Vec<SaleRecord>>, ProviderError>;
}

/// Searches live listings on an MLS-like feed.
#[async_trait]
pub trait ListingProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn search_listings(&self, filters: &PropertyFilters) -> Result<Fetched<Vec<Property>>, ProviderError>;
}

/// Request shaping shared by every adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterOptions {
    pub api_key_header: String,
    /// Upper bound for a single endpoint-variant attempt.
    pub timeout: Duration,
    /// Requests this adapter allows in flight at once.
    pub max_in_flight: usize,
}

impl AdapterOptions {
    pub fn new(api_key_header: impl Into<String>, timeout: Duration, max_in_flight: usize) -> Self {
        Self {
            api_key_header: api_key_header.into(),
            timeout,
            max_in_flight: max_in_flight.max(1),
        }
    }
}

fn param(name: &str, value: impl ToString) -> (String, String) {
    (name.to_string(), value.to_string())
}
