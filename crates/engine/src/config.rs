//! Engine settings: YAML or JSON on disk, with environment overrides.
//!
//! Credentials never live here; they are read from the environment at
//! startup into [`listwise_api::ProviderCredentials`].

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{fs, io};

use dirs_next::config_dir;
use listwise_util::{expand_tilde, non_empty_env};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CONFIG_PATH_ENV: &str = "LISTWISE_CONFIG";
pub const DATABASE_URL_ENV: &str = "LISTWISE_DATABASE_URL";
pub const PROPERTY_API_BASE_ENV: &str = "LISTWISE_PROPERTY_API_BASE";
pub const LISTING_FEED_BASE_ENV: &str = "LISTWISE_LISTING_FEED_BASE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("invalid setting: {0}")]
    Invalid(String),
}

/// Where one provider lives and how it expects its key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEndpoint {
    pub base_url: String,
    pub api_key_header: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database_url: String,
    pub request_timeout_secs: u64,
    /// Targets processed at once during a batch; `1` runs sequentially.
    pub max_concurrency: usize,
    pub max_in_flight_per_provider: usize,
    /// Refuse to synchronize at all when the property API key is missing.
    pub require_credentials: bool,
    pub property_api: ProviderEndpoint,
    pub listing_feed: ProviderEndpoint,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "sqlite://listwise.db".to_string(),
            request_timeout_secs: 20,
            max_concurrency: 1,
            max_in_flight_per_provider: 4,
            require_credentials: false,
            property_api: ProviderEndpoint {
                base_url: "https://api.gateway.attomdata.com".to_string(),
                api_key_header: "apikey".to_string(),
            },
            listing_feed: ProviderEndpoint {
                base_url: "https://feed.example-mls.com".to_string(),
                api_key_header: "X-Api-Key".to_string(),
            },
        }
    }
}

impl Settings {
    /// Load from `path` (or the default location), then apply environment
    /// overrides. A missing file yields defaults; a malformed one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => expand_tilde(&path.to_string_lossy()),
            None => default_config_path(),
        };
        let mut settings = match fs::read_to_string(&path) {
            Ok(content) => Self::parse(&path, &content)?,
            Err(error) if error.kind() == io::ErrorKind::NotFound => Self::default(),
            Err(source) => return Err(ConfigError::Io { path, source }),
        };
        settings.apply_env_overrides();
        settings.validate()?;
        Ok(settings)
    }

    fn parse(path: &Path, content: &str) -> Result<Self, ConfigError> {
        let is_json = path
            .extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| extension.eq_ignore_ascii_case("json"));
        let parsed = if is_json {
            serde_json::from_str(content).map_err(|error| error.to_string())
        } else {
            serde_yaml::from_str(content).map_err(|error| error.to_string())
        };
        parsed.map_err(|reason| ConfigError::Parse {
            path: path.to_path_buf(),
            reason,
        })
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(url) = non_empty_env(DATABASE_URL_ENV) {
            self.database_url = url;
        }
        if let Some(base_url) = non_empty_env(PROPERTY_API_BASE_ENV) {
            self.property_api.base_url = base_url;
        }
        if let Some(base_url) = non_empty_env(LISTING_FEED_BASE_ENV) {
            self.listing_feed.base_url = base_url;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("request_timeout_secs must be at least 1".into()));
        }
        if self.max_concurrency == 0 || self.max_in_flight_per_provider == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrency and max_in_flight_per_provider must be at least 1".into(),
            ));
        }
        for endpoint in [&self.property_api, &self.listing_feed] {
            if endpoint.api_key_header.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("api_key_header for {} is empty", endpoint.base_url)));
            }
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// `LISTWISE_CONFIG` when set, otherwise `<config dir>/listwise/config.yaml`.
pub fn default_config_path() -> PathBuf {
    if let Some(path) = non_empty_env(CONFIG_PATH_ENV) {
        return expand_tilde(&path);
    }

    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("listwise")
        .join("config.yaml")
}
