use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use indexmap::IndexMap;
use listwise_types::{LocationKey, MarketSnapshot, Period, Property, PropertyFilters};

use super::{MarketStore, validate_property, validate_snapshot};
use crate::error::StoreError;

/// Mutex-guarded maps; backs tests and `memory:` runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshots: Mutex<BTreeMap<(LocationKey, Period), MarketSnapshot>>,
    properties: Mutex<IndexMap<String, Property>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.lock().expect("snapshots lock poisoned").len()
    }

    pub fn property_count(&self) -> usize {
        self.properties.lock().expect("properties lock poisoned").len()
    }
}

#[async_trait]
impl MarketStore for MemoryStore {
    async fn upsert_snapshot(&self, snapshot: &MarketSnapshot) -> Result<MarketSnapshot, StoreError> {
        validate_snapshot(snapshot)?;
        self.snapshots
            .lock()
            .expect("snapshots lock poisoned")
            .insert((snapshot.location_key(), snapshot.period()), snapshot.clone());
        Ok(snapshot.clone())
    }

    async fn latest_snapshot(&self, location: &LocationKey) -> Result<Option<MarketSnapshot>, StoreError> {
        Ok(self.snapshots_for_location(location).await?.into_iter().next())
    }

    async fn snapshots_for_location(&self, location: &LocationKey) -> Result<Vec<MarketSnapshot>, StoreError> {
        let snapshots = self.snapshots.lock().expect("snapshots lock poisoned");
        let mut matching: Vec<MarketSnapshot> = snapshots
            .iter()
            .filter(|((key, _), _)| key == location)
            .map(|(_, snapshot)| snapshot.clone())
            .collect();
        matching.sort_by(|left, right| {
            right
                .period()
                .cmp(&left.period())
                .then_with(|| right.created_at.cmp(&left.created_at))
        });
        Ok(matching)
    }

    async fn upsert_property(&self, property: &Property) -> Result<Property, StoreError> {
        validate_property(property)?;
        self.properties
            .lock()
            .expect("properties lock poisoned")
            .insert(property.identity().as_key(), property.clone());
        Ok(property.clone())
    }

    async fn search_properties(&self, filters: &PropertyFilters) -> Result<Vec<Property>, StoreError> {
        Ok(self
            .properties
            .lock()
            .expect("properties lock poisoned")
            .values()
            .filter(|property| filters.matches(property))
            .cloned()
            .collect())
    }
}
