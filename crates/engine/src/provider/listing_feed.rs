//! MLS-style listing feed adapter.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use listwise_api::{LISTING_FEED_API_KEY_ENV, ProviderTransport};
use listwise_types::{Property, PropertyFilters};
use tokio::sync::Semaphore;

use super::cascade::{CascadeContext, EndpointCascade, Fetched, QueryVariant};
use super::{AdapterOptions, ListingProvider, normalize, param};
use crate::error::ProviderError;

const SEARCH_PATH: &str = "/listings/search";
const V2_PROPERTIES_PATH: &str = "/v2/properties";

pub struct ListingFeedAdapter {
    transport: Arc<dyn ProviderTransport>,
    api_key: Option<String>,
    options: AdapterOptions,
    limiter: Semaphore,
    search: EndpointCascade<PropertyFilters>,
}

impl ListingFeedAdapter {
    pub const NAME: &'static str = "listing_feed";

    pub fn new(transport: Arc<dyn ProviderTransport>, api_key: Option<String>, options: AdapterOptions) -> Self {
        Self {
            transport,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            limiter: Semaphore::new(options.max_in_flight),
            options,
            search: EndpointCascade::new("listing search")
                .with_variant(QueryVariant::new("listings_search", SEARCH_PATH, by_search_filters))
                .with_variant(QueryVariant::new("v2_properties", V2_PROPERTIES_PATH, by_location)),
        }
    }

    fn context(&self) -> Result<CascadeContext<'_>, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::missing_credential(Self::NAME, LISTING_FEED_API_KEY_ENV))?;
        Ok(CascadeContext {
            provider: Self::NAME,
            transport: self.transport.as_ref(),
            api_key_header: &self.options.api_key_header,
            api_key,
            timeout: self.options.timeout,
            limiter: &self.limiter,
        })
    }
}

impl fmt::Debug for ListingFeedAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListingFeedAdapter")
            .field("has_credential", &self.api_key.is_some())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ListingProvider for ListingFeedAdapter {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn search_listings(&self, filters: &PropertyFilters) -> Result<Fetched<Vec<Property>>, ProviderError> {
        let ctx = self.context()?;
        let mut fetched = self.search.execute(&ctx, filters, normalize::listings).await?;
        for property in &mut fetched.value {
            fill_searched_location(property, filters);
        }
        Ok(fetched)
    }
}

/// Items from a location-scoped endpoint may omit the location itself; they
/// belong to the one that was searched.
fn fill_searched_location(property: &mut Property, filters: &PropertyFilters) {
    fn searched(value: &Option<String>) -> Option<&str> {
        value.as_deref().map(str::trim).filter(|value| !value.is_empty())
    }
    if property.city.trim().is_empty()
        && let Some(city) = searched(&filters.city)
    {
        property.city = city.to_string();
    }
    if property.state.trim().is_empty()
        && let Some(state) = searched(&filters.state)
    {
        property.state = state.to_uppercase();
    }
    if property.zip.trim().is_empty()
        && let Some(zip) = searched(&filters.zip)
    {
        property.zip = zip.to_string();
    }
}

fn by_search_filters(filters: &PropertyFilters) -> Option<Vec<(String, String)>> {
    if !filters.has_location() {
        return None;
    }
    let mut query = Vec::new();
    if let Some(city) = &filters.city {
        query.push(param("city", city.trim()));
    }
    if let Some(state) = &filters.state {
        query.push(param("state", state.trim()));
    }
    if let Some(zip) = &filters.zip {
        query.push(param("postalCode", zip.trim()));
    }
    if let Some(min_price) = filters.min_price {
        query.push(param("minPrice", min_price));
    }
    if let Some(max_price) = filters.max_price {
        query.push(param("maxPrice", max_price));
    }
    if let Some(min_beds) = filters.min_beds {
        query.push(param("minBeds", min_beds));
    }
    Some(query)
}

/// `location=Canton, GA`, or the zip alone when no city is given.
fn by_location(filters: &PropertyFilters) -> Option<Vec<(String, String)>> {
    let city = filters.city.as_deref().map(str::trim).filter(|city| !city.is_empty());
    let location = match (city, filters.state.as_deref()) {
        (Some(city), Some(state)) => format!("{city}, {}", state.trim()),
        (Some(city), None) => city.to_string(),
        (None, _) => filters.zip.as_deref().map(str::trim).filter(|zip| !zip.is_empty())?.to_string(),
    };
    Some(vec![param("location", location)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use listwise_api::ScriptedTransport;
    use serde_json::json;
    use std::time::Duration;

    fn adapter(transport: Arc<ScriptedTransport>) -> ListingFeedAdapter {
        ListingFeedAdapter::new(
            transport,
            Some("feed-key".into()),
            AdapterOptions::new("X-Api-Key", Duration::from_secs(5), 1),
        )
    }

    #[tokio::test]
    async fn search_sends_only_the_filters_that_are_set() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(SEARCH_PATH, 200, json!({"listings": []}).to_string());
        let filters = PropertyFilters {
            city: Some("Canton".into()),
            min_price: Some(200_000),
            ..PropertyFilters::default()
        };

        let fetched = adapter(transport.clone()).search_listings(&filters).await.unwrap();

        assert!(fetched.value.is_empty());
        let request = &transport.requests()[0];
        assert_eq!(request.param("city"), Some("Canton"));
        assert_eq!(request.param("minPrice"), Some("200000"));
        assert_eq!(request.param("maxPrice"), None);
        assert_eq!(request.api_key_header, "X-Api-Key");
    }

    #[tokio::test]
    async fn falls_back_to_v2_properties_by_location() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(SEARCH_PATH, 404, "gone");
        transport.respond(
            V2_PROPERTIES_PATH,
            200,
            json!({"results": [{"id": 7, "address": "12 Oak St", "city": "Canton", "state": "GA", "zip": "30115"}]}).to_string(),
        );
        let filters = PropertyFilters {
            city: Some("Canton".into()),
            state: Some("GA".into()),
            ..PropertyFilters::default()
        };

        let fetched = adapter(transport.clone()).search_listings(&filters).await.unwrap();

        assert_eq!(fetched.variant, "v2_properties");
        assert_eq!(fetched.value[0].external_id.as_deref(), Some("7"));
        assert_eq!(transport.requests()[1].param("location"), Some("Canton, GA"));
    }

    #[tokio::test]
    async fn v2_items_without_location_take_the_searched_one() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(
            V2_PROPERTIES_PATH,
            200,
            json!({"properties": [{"id": "V-1", "address": "9 Elm St", "price": 310000}]}).to_string(),
        );
        let filters = PropertyFilters {
            city: Some("Canton".into()),
            state: Some("ga".into()),
            ..PropertyFilters::default()
        };

        let fetched = adapter(transport).search_listings(&filters).await.unwrap();

        assert_eq!(fetched.variant, "v2_properties");
        let property = &fetched.value[0];
        assert_eq!(property.city, "Canton");
        assert_eq!(property.state, "GA");
        assert!(filters.matches(property));
    }

    #[tokio::test]
    async fn filters_without_location_are_not_searchable() {
        let transport = Arc::new(ScriptedTransport::new());
        let error = adapter(transport.clone())
            .search_listings(&PropertyFilters::default())
            .await
            .unwrap_err();

        assert!(matches!(error, ProviderError::Unavailable { attempts: 2, .. }));
        assert_eq!(transport.request_count(), 0);
    }
}
