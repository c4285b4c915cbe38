//! Provider API client utilities.
//!
//! This crate provides a lightweight client for the external data providers
//! the sync engine talks to. It focuses on:
//!
//! - Constructing an HTTP client with sensible defaults and an explicit timeout
//! - Discovering provider credentials from the environment at startup
//! - Validating provider base URLs for safety
//! - Issuing GET requests with an API-key header through [`ProviderTransport`]
//!
//! The primary entry point is [`ProviderClient`]. Adapters hold it behind the
//! [`ProviderTransport`] trait so tests can swap in a [`ScriptedTransport`].
//!
//! # Example
//!
//! ```ignore
//! use listwise_api::{ProviderClient, ProviderRequest, ProviderTransport};
//! use std::time::Duration;
//!
//! let client = ProviderClient::new("https://api.gateway.attomdata.com", Duration::from_secs(20))?;
//! let request = ProviderRequest::get("/v4/salestrend/snapshot", "apikey", key)
//!     .with_param("postalcode", "30115");
//! let response = client.get(&request).await?;
//! println!("status: {}", response.status);
//! ```

mod transport;

use std::env;
use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use listwise_util::non_empty_env;
use reqwest::{Client, Url, header};
use thiserror::Error;
use tracing::debug;

pub use transport::{ProviderRequest, ProviderResponse, RecordedRequest, ScriptedTransport, TransportError};

/// Environment variable holding the property-data API key.
pub const PROPERTY_API_KEY_ENV: &str = "LISTWISE_PROPERTY_API_KEY";
/// Environment variable holding the listing feed API key.
pub const LISTING_FEED_API_KEY_ENV: &str = "LISTWISE_LISTING_FEED_API_KEY";

/// Hostnames allowed for local development regardless of scheme.
const LOCALHOST_DOMAINS: &[&str] = &["localhost", "127.0.0.1"];

/// Issues one GET request against a provider.
#[async_trait]
pub trait ProviderTransport: Send + Sync {
    async fn get(&self, request: &ProviderRequest) -> Result<ProviderResponse, TransportError>;
}

/// Errors raised while building a [`ProviderClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid provider base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

/// Read-only provider credentials, resolved once at startup.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ProviderCredentials {
    pub property_api_key: Option<String>,
    pub listing_feed_api_key: Option<String>,
}

impl ProviderCredentials {
    /// Read credentials from `LISTWISE_PROPERTY_API_KEY` and
    /// `LISTWISE_LISTING_FEED_API_KEY`. Blank values count as absent.
    pub fn from_env() -> Self {
        Self {
            property_api_key: non_empty_env(PROPERTY_API_KEY_ENV),
            listing_feed_api_key: non_empty_env(LISTING_FEED_API_KEY_ENV),
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn has_any(&self) -> bool {
        self.property_api_key.is_some() || self.listing_feed_api_key.is_some()
    }
}

impl fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |key: &Option<String>| key.as_ref().map(|_| "<redacted>");
        f.debug_struct("ProviderCredentials")
            .field("property_api_key", &mask(&self.property_api_key))
            .field("listing_feed_api_key", &mask(&self.listing_feed_api_key))
            .finish()
    }
}

#[derive(Debug, Clone)]
/// Thin wrapper around a configured `reqwest::Client` for one provider.
///
/// The client pre-configures `Accept` and `User-Agent` headers and a request
/// timeout, and resolves request paths against a validated base URL. The API
/// key travels on each [`ProviderRequest`] rather than in the default headers.
pub struct ProviderClient {
    pub base_url: String,
    pub http: Client,
    pub user_agent: String,
    timeout: Duration,
}

impl ProviderClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        validate_base_url(base_url)?;

        let mut default_headers = header::HeaderMap::new();
        default_headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .default_headers(default_headers)
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            user_agent: format!("listwise/{}; {}", env!("CARGO_PKG_VERSION"), env::consts::OS),
            timeout,
        })
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl ProviderTransport for ProviderClient {
    async fn get(&self, request: &ProviderRequest) -> Result<ProviderResponse, TransportError> {
        let start = Instant::now();
        let url = self.url_for(&request.path);
        debug!(%url, param_count = request.query.len(), "provider request started");

        let api_key = header::HeaderValue::from_str(request.api_key())
            .map_err(|error| TransportError::InvalidRequest(format!("API key is not a valid header value: {error}")))?;
        let response = self
            .http
            .get(&url)
            .header(header::USER_AGENT, &self.user_agent)
            .header(request.api_key_header.as_str(), api_key)
            .query(&request.query)
            .send()
            .await
            .map_err(|error| TransportError::from_reqwest(error, self.timeout))?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|error| TransportError::from_reqwest(error, self.timeout))?;
        debug!(
            %url,
            status,
            body_len = body.len(),
            duration_ms = start.elapsed().as_millis(),
            "provider request completed"
        );
        Ok(ProviderResponse { status, body })
    }
}

/// Validate that a base URL is acceptable for use by the client.
///
/// Rules:
/// - `localhost` or `127.0.0.1`: any scheme is allowed
/// - otherwise: scheme must be HTTPS
pub fn validate_base_url(base: &str) -> Result<(), ClientError> {
    let invalid = |reason: String| ClientError::InvalidBaseUrl {
        url: base.to_string(),
        reason,
    };
    let parsed_base_url = Url::parse(base).map_err(|e| invalid(e.to_string()))?;

    let host_name = parsed_base_url
        .host_str()
        .ok_or_else(|| invalid("base URL must include a host".into()))?;

    // Local development allowances: localhost/127.0.0.1 with any scheme.
    if LOCALHOST_DOMAINS
        .iter()
        .any(|&allowed| host_name.eq_ignore_ascii_case(allowed))
    {
        return Ok(());
    }

    if parsed_base_url.scheme() != "https" {
        return Err(invalid(format!(
            "must use https for non-localhost hosts; got '{}://'",
            parsed_base_url.scheme()
        )));
    }

    Ok(())
}
