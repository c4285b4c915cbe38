//! Search merge layer: local properties first, optionally topped up with
//! live listings, deduplicated by identity.

use std::sync::Arc;

use indexmap::IndexMap;
use listwise_types::{Property, PropertyFilters};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::provider::ListingProvider;
use crate::store::MarketStore;

pub struct PropertySearch {
    store: Arc<dyn MarketStore>,
    listings: Option<Arc<dyn ListingProvider>>,
}

impl PropertySearch {
    pub fn new(store: Arc<dyn MarketStore>, listings: Option<Arc<dyn ListingProvider>>) -> Self {
        Self { store, listings }
    }

    /// Local matches, merged with live listings when the filters warrant a
    /// live lookup. A failed lookup degrades to local results only.
    pub async fn search(&self, filters: &PropertyFilters) -> Result<Vec<Property>, StoreError> {
        let local = self.store.search_properties(filters).await?;
        let external = match (&self.listings, filters.wants_live_lookup()) {
            (Some(listings), true) => match listings.search_listings(filters).await {
                Ok(fetched) => {
                    debug!(
                        provider = %listings.name(),
                        variant = %fetched.variant,
                        count = fetched.value.len(),
                        "live listings fetched"
                    );
                    fetched.value.into_iter().filter(|property| filters.matches(property)).collect()
                }
                Err(error) => {
                    warn!(provider = %listings.name(), error = %error.redacted(), "live listing lookup failed; returning local results");
                    Vec::new()
                }
            },
            _ => Vec::new(),
        };

        let mut merged = merge_properties(local, external);
        if let Some(limit) = filters.limit {
            merged.truncate(limit);
        }
        Ok(merged)
    }
}

/// Merge by identity. Local rows win on collision and keep their order;
/// external rows not already present follow in provider order.
pub fn merge_properties(local: Vec<Property>, external: Vec<Property>) -> Vec<Property> {
    let mut merged: IndexMap<String, Property> = IndexMap::with_capacity(local.len() + external.len());
    for property in local {
        merged.entry(property.identity().as_key()).or_insert(property);
    }
    for property in external {
        merged.entry(property.identity().as_key()).or_insert(property);
    }
    merged.into_values().collect()
}
