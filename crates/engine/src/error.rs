//! Error types raised by the engine.
//!
//! Provider failures are split in two: a [`ProviderError::Configuration`] is
//! raised before any request goes out, while [`ProviderError::Unavailable`]
//! means every endpoint variant was tried and failed. Individual variant
//! failures never escape the cascade.

use listwise_util::redact_sensitive;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("{provider}: configuration error: {reason}")]
    Configuration { provider: String, reason: String },

    #[error("{provider}: {operation} unavailable after {attempts} endpoint variant(s): {last_error}")]
    Unavailable {
        provider: String,
        operation: String,
        attempts: usize,
        last_error: String,
    },
}

impl ProviderError {
    pub fn missing_credential(provider: &str, env_var: &str) -> Self {
        ProviderError::Configuration {
            provider: provider.to_string(),
            reason: format!("missing API credential; set {env_var}"),
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, ProviderError::Configuration { .. })
    }

    /// Error text safe to log or return to callers.
    pub fn redacted(&self) -> String {
        redact_sensitive(&self.to_string())
    }
}

/// Failures raised by a [`crate::store::MarketStore`] backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),

    #[error("stored row could not be decoded: {0}")]
    Serialization(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("write rejected: {0}")]
    Rejected(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => StoreError::NotFound("row not found".into()),
            sqlx::Error::ColumnDecode { index, source } => StoreError::Serialization(format!("column {index}: {source}")),
            sqlx::Error::Decode(source) => StoreError::Serialization(source.to_string()),
            other => StoreError::Backend(redact_sensitive(&other.to_string())),
        }
    }
}

/// Errors surfaced by [`crate::MarketService`].
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
