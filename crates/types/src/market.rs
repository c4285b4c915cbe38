//! Market snapshots and the location/period keys they are stored under.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::property::normalize_zip;

/// A location descriptor refreshed during one synchronization pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncTarget {
    pub city: String,
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip: Option<String>,
}

impl SyncTarget {
    pub fn new(city: impl Into<String>, state: impl Into<String>, zip: Option<&str>) -> Self {
        Self {
            city: city.into().trim().to_string(),
            state: state.into().trim().to_uppercase(),
            zip: zip.map(str::trim).filter(|zip| !zip.is_empty()).map(str::to_string),
        }
    }

    /// Like [`Self::new`], but rejects a blank city or state and a zip with
    /// no digits, which would otherwise share the key of a target without one.
    pub fn checked(city: &str, state: &str, zip: Option<&str>) -> Result<Self, ParseTargetError> {
        let target = Self::new(city, state, zip);
        let bad_zip = target.zip.as_deref().is_some_and(|zip| normalize_zip(zip).is_empty());
        if target.city.is_empty() || target.state.is_empty() || bad_zip {
            let input = match zip {
                Some(zip) => format!("{city},{state},{zip}"),
                None => format!("{city},{state}"),
            };
            return Err(ParseTargetError { input });
        }
        Ok(target)
    }

    /// Key used to match stored rows for this location.
    pub fn location_key(&self) -> LocationKey {
        LocationKey::new(&self.city, &self.state, self.zip.as_deref())
    }
}

impl fmt::Display for SyncTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.zip {
            Some(zip) => write!(f, "{}, {} {}", self.city, self.state, zip),
            None => write!(f, "{}, {}", self.city, self.state),
        }
    }
}

/// Error returned when a `City,ST[,ZIP]` target string cannot be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid sync target '{input}': expected CITY,STATE[,ZIP]")]
pub struct ParseTargetError {
    pub input: String,
}

impl FromStr for SyncTarget {
    type Err = ParseTargetError;

    /// Parses `Canton,GA,30115` or `Canton,GA`.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = input.split(',').map(str::trim).collect();
        let invalid = |_| ParseTargetError { input: input.to_string() };
        match parts.as_slice() {
            [city, state] => Self::checked(city, state, None).map_err(invalid),
            [city, state, zip] => Self::checked(city, state, Some(zip)).map_err(invalid),
            _ => Err(ParseTargetError { input: input.to_string() }),
        }
    }
}

/// Normalized `(city, state, zip)` key. City is lowercased with collapsed
/// whitespace, state uppercased, and an absent zip is the empty string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocationKey {
    pub city: String,
    pub state: String,
    pub zip: String,
}

impl LocationKey {
    pub fn new(city: &str, state: &str, zip: Option<&str>) -> Self {
        Self {
            city: city.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase(),
            state: state.trim().to_uppercase(),
            zip: zip.map(normalize_zip).unwrap_or_default(),
        }
    }
}

/// Calendar month a snapshot describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Period {
    // Field order matters for the derived ordering: year first.
    pub year: i32,
    pub month: u32,
}

impl Period {
    /// Builds a period, returning `None` for months outside `1..=12`.
    pub fn new(month: u32, year: i32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn current() -> Self {
        Self::from_datetime(Utc::now())
    }

    pub fn from_datetime(timestamp: DateTime<Utc>) -> Self {
        Self {
            year: timestamp.year(),
            month: timestamp.month(),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Where a stored or returned record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Live provider call.
    Api,
    /// Synthetic placeholder built from documented constants.
    Fallback,
    /// Previously stored row returned after a failed write.
    Existing,
    /// Write failed and no prior row was available.
    Exception,
    /// Fallback record whose write also failed with no prior row.
    FallbackError,
    /// Pre-normalized record delivered by the bulk importer.
    Import,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Api => "api",
            Provenance::Fallback => "fallback",
            Provenance::Existing => "existing",
            Provenance::Exception => "exception",
            Provenance::FallbackError => "fallback_error",
            Provenance::Import => "import",
        }
    }

    /// Only live provider data counts toward a batch's completion rate.
    pub fn is_success(&self) -> bool {
        matches!(self, Provenance::Api)
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provenance {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "api" => Ok(Provenance::Api),
            "fallback" => Ok(Provenance::Fallback),
            "existing" => Ok(Provenance::Existing),
            "exception" => Ok(Provenance::Exception),
            "fallback_error" => Ok(Provenance::FallbackError),
            "import" => Ok(Provenance::Import),
            other => Err(format!("unknown provenance '{other}'")),
        }
    }
}

/// Market classification derived from months of inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketType {
    Sellers,
    Balanced,
    Buyers,
}

impl MarketType {
    /// Under four months of inventory favours sellers, over six favours buyers.
    pub fn from_inventory(inventory_months: f64) -> Self {
        if !inventory_months.is_finite() || inventory_months <= 0.0 {
            return MarketType::Balanced;
        }
        if inventory_months < 4.0 {
            MarketType::Sellers
        } else if inventory_months > 6.0 {
            MarketType::Buyers
        } else {
            MarketType::Balanced
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MarketType::Sellers => "sellers",
            MarketType::Balanced => "balanced",
            MarketType::Buyers => "buyers",
        }
    }
}

impl FromStr for MarketType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "sellers" => Ok(MarketType::Sellers),
            "balanced" => Ok(MarketType::Balanced),
            "buyers" => Ok(MarketType::Buyers),
            other => Err(format!("unknown market type '{other}'")),
        }
    }
}

/// Raw market figures before they are attached to a location and period.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketMetrics {
    pub median_price: u64,
    pub average_price_per_sqft: f64,
    pub days_on_market: u32,
    pub active_listings: u32,
    pub inventory_months: f64,
    pub sale_to_list_ratio: f64,
    pub price_reductions: u32,
}

/// Monthly market statistics for one location.
///
/// At most one snapshot exists per `(city, state, zip, month, year)`. A new
/// snapshot for the same key replaces the old row wholesale; fields from
/// different provenances are never merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSnapshot {
    pub city: String,
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip: Option<String>,
    pub month: u32,
    pub year: i32,
    pub median_price: u64,
    pub average_price_per_sqft: f64,
    pub days_on_market: u32,
    pub active_listings: u32,
    pub inventory_months: f64,
    pub sale_to_list_ratio: f64,
    pub price_reductions: u32,
    pub market_type: MarketType,
    pub provenance: Provenance,
    pub created_at: DateTime<Utc>,
}

impl MarketSnapshot {
    /// Attach metrics to a target and period, deriving the market type.
    pub fn from_metrics(target: &SyncTarget, period: Period, metrics: MarketMetrics, provenance: Provenance) -> Self {
        Self {
            city: target.city.clone(),
            state: target.state.clone(),
            zip: target.zip.clone(),
            month: period.month,
            year: period.year,
            median_price: metrics.median_price,
            average_price_per_sqft: metrics.average_price_per_sqft,
            days_on_market: metrics.days_on_market,
            active_listings: metrics.active_listings,
            inventory_months: metrics.inventory_months,
            sale_to_list_ratio: metrics.sale_to_list_ratio,
            price_reductions: metrics.price_reductions,
            market_type: MarketType::from_inventory(metrics.inventory_months),
            provenance,
            created_at: Utc::now(),
        }
    }

    pub fn period(&self) -> Period {
        Period {
            year: self.year,
            month: self.month,
        }
    }

    pub fn location_key(&self) -> LocationKey {
        LocationKey::new(&self.city, &self.state, self.zip.as_deref())
    }

    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }
}
