//! # Listwise Types
//!
//! Shared data model for the market synchronization engine. Everything here is
//! plain data: snapshots and properties as they are stored locally, the targets
//! a batch run refreshes, and the per-target results a run reports.
//!
//! All types serialize with camelCase field names, which is the shape the
//! inbound service interface returns to callers.

mod market;
mod property;
mod sync;

pub use market::{LocationKey, MarketMetrics, MarketSnapshot, MarketType, ParseTargetError, Period, Provenance, SyncTarget};
pub use property::{
    ParseAddressError, Property, PropertyAddress, PropertyFilters, PropertyIdentity, SaleRecord, normalize_address, normalize_zip,
};
pub use sync::{SyncResult, SyncSummary};
