//! # Listwise Engine
//!
//! Keeps a local store of monthly market statistics and property listings in
//! step with external data providers.
//!
//! ## Key Features
//!
//! - **Endpoint cascades**: each provider operation tries an ordered list of
//!   endpoint variants and returns the first one that parses
//! - **Fallback snapshots**: documented placeholder figures, tagged as such,
//!   whenever a provider cannot answer
//! - **Reconciliation**: one atomic upsert per natural key, with stored-row
//!   recovery when a write fails
//! - **Batch synchronization**: exactly one result per target, sequential by
//!   default, cancellable
//! - **Search merge**: local rows first, topped up with live listings
//!
//! ## Usage
//!
//! ```rust,no_run
//! use listwise_api::ProviderCredentials;
//! use listwise_engine::{MarketService, Settings};
//! use listwise_types::SyncTarget;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Settings::load(None)?;
//! let service = MarketService::connect(&settings, &ProviderCredentials::from_env()).await?;
//! let summary = service
//!     .synchronize_market_data(&[SyncTarget::new("Canton", "GA", Some("30115"))])
//!     .await?;
//! println!("completion rate: {:.2}", summary.completion_rate);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **`provider`**: adapters, the endpoint cascade and payload normalization
//! - **`fallback`**: synthetic snapshot constants
//! - **`store`**: the `MarketStore` trait with in-memory and SQLite backends
//! - **`reconcile`**: natural-key upserts and write-failure recovery
//! - **`sync`**: the batch synchronizer
//! - **`search`**: local/live search merge
//! - **`service`**: the `MarketService` facade

pub mod config;
pub mod error;
pub mod fallback;
pub mod provider;
pub mod reconcile;
pub mod search;
pub mod service;
pub mod store;
pub mod sync;

pub use config::{ConfigError, ProviderEndpoint, Settings};
pub use error::{ProviderError, ServiceError, StoreError};
pub use provider::{
    AdapterOptions, CascadeReport, Fetched, ListingFeedAdapter, ListingProvider, MarketStatisticsProvider, PropertyApiAdapter,
    PropertyRecordProvider,
};
pub use reconcile::{PersistResult, Reconciler};
pub use search::{PropertySearch, merge_properties};
pub use service::MarketService;
pub use store::{MarketStore, MemoryStore, SqliteStore, open_store};
pub use sync::BatchSynchronizer;
