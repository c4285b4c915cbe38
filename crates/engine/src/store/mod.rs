//! Local persistence for market snapshots and properties.
//!
//! Both backends enforce the same natural keys: one snapshot per
//! `(city, state, zip, month, year)` and one property per identity. City and
//! state compare case-insensitively and an absent zip keys as `""`.

mod memory;
mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use listwise_types::{LocationKey, MarketSnapshot, Property, PropertyFilters, normalize_zip};
use tracing::debug;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::StoreError;

/// Database URL selecting the in-memory backend.
pub const MEMORY_DATABASE_URL: &str = "memory:";

#[async_trait]
pub trait MarketStore: Send + Sync {
    /// Insert or wholly replace the snapshot stored under the same natural key.
    async fn upsert_snapshot(&self, snapshot: &MarketSnapshot) -> Result<MarketSnapshot, StoreError>;

    /// Most recent snapshot for a location by year, month, then creation time.
    async fn latest_snapshot(&self, location: &LocationKey) -> Result<Option<MarketSnapshot>, StoreError>;

    /// Every snapshot for a location, newest first.
    async fn snapshots_for_location(&self, location: &LocationKey) -> Result<Vec<MarketSnapshot>, StoreError>;

    /// Insert or replace the property sharing `property.identity()`.
    async fn upsert_property(&self, property: &Property) -> Result<Property, StoreError>;

    /// Stored properties matching `filters`, in insertion order. `limit` is
    /// left to the caller.
    async fn search_properties(&self, filters: &PropertyFilters) -> Result<Vec<Property>, StoreError>;
}

/// Open the backend named by `database_url`: `memory:` or a `sqlite:` URL.
pub async fn open_store(database_url: &str) -> Result<Arc<dyn MarketStore>, StoreError> {
    let database_url = database_url.trim();
    if database_url == MEMORY_DATABASE_URL {
        debug!("using in-memory store");
        return Ok(Arc::new(MemoryStore::new()));
    }
    if database_url.starts_with("sqlite:") {
        return Ok(Arc::new(SqliteStore::connect(database_url).await?));
    }
    Err(StoreError::Rejected(format!(
        "unsupported database URL '{database_url}'; expected '{MEMORY_DATABASE_URL}' or 'sqlite://PATH'"
    )))
}

/// Reject rows that could never be found again by location.
fn validate_snapshot(snapshot: &MarketSnapshot) -> Result<(), StoreError> {
    if snapshot.city.trim().is_empty() || snapshot.state.trim().is_empty() {
        return Err(StoreError::Rejected("snapshot city and state must not be empty".into()));
    }
    if let Some(zip) = &snapshot.zip
        && normalize_zip(zip).is_empty()
    {
        return Err(StoreError::Rejected(format!("snapshot zip '{zip}' has no digits")));
    }
    if !(1..=12).contains(&snapshot.month) {
        return Err(StoreError::Rejected(format!("snapshot month {} is out of range", snapshot.month)));
    }
    Ok(())
}

fn validate_property(property: &Property) -> Result<(), StoreError> {
    if property.address.trim().is_empty() {
        return Err(StoreError::Rejected("property address must not be empty".into()));
    }
    Ok(())
}
