//! Property listings, their canonical identity, and search filters.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use thiserror::Error;

use crate::market::Provenance;

/// Street suffixes collapsed to their postal abbreviation when comparing addresses.
const STREET_SUFFIXES: &[(&str, &str)] = &[
    ("street", "st"),
    ("avenue", "ave"),
    ("road", "rd"),
    ("drive", "dr"),
    ("lane", "ln"),
    ("boulevard", "blvd"),
    ("court", "ct"),
    ("place", "pl"),
    ("circle", "cir"),
    ("parkway", "pkwy"),
    ("highway", "hwy"),
    ("terrace", "ter"),
];

/// A property listing as stored locally or returned by a listing provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    /// Provider-assigned identifier, when the source has one.
    #[serde(default)]
    pub external_id: Option<String>,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    #[serde(default)]
    pub price: Option<u64>,
    #[serde(default)]
    pub beds: Option<u32>,
    #[serde(default)]
    pub baths: Option<f32>,
    #[serde(default)]
    pub sqft: Option<u32>,
    pub provenance: Provenance,
}

impl Property {
    /// Canonical identity used for deduplication.
    pub fn identity(&self) -> PropertyIdentity {
        PropertyIdentity::of(self.external_id.as_deref(), &self.address, &self.zip)
    }
}

/// Deduplication key: the external id when present, otherwise the
/// normalized street address plus five-digit zip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PropertyIdentity {
    External(String),
    Address { address: String, zip: String },
}

impl PropertyIdentity {
    pub fn of(external_id: Option<&str>, address: &str, zip: &str) -> Self {
        match external_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => PropertyIdentity::External(id.to_string()),
            None => PropertyIdentity::Address {
                address: normalize_address(address),
                zip: normalize_zip(zip),
            },
        }
    }

    /// Stable string form, used as a unique column value by stores.
    pub fn as_key(&self) -> String {
        match self {
            PropertyIdentity::External(id) => format!("ext:{id}"),
            PropertyIdentity::Address { address, zip } => format!("addr:{address}|{zip}"),
        }
    }
}

/// Lowercase, strip punctuation, collapse whitespace, and abbreviate common
/// street suffixes so that `"12 Oak Street."` and `"12 oak st"` compare equal.
pub fn normalize_address(address: &str) -> String {
    let cleaned: String = address
        .chars()
        .map(|ch| match ch {
            '.' | ',' | ';' => ' ',
            other => other.to_ascii_lowercase(),
        })
        .collect();

    cleaned
        .split_whitespace()
        .map(|word| {
            STREET_SUFFIXES
                .iter()
                .find(|(long, _)| *long == word)
                .map(|(_, short)| *short)
                .unwrap_or(word)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Keep the first five digits of a postal code (`"30115-1234"` → `"30115"`).
pub fn normalize_zip(zip: &str) -> String {
    zip.chars().filter(char::is_ascii_digit).take(5).collect()
}

/// A street address split the way property-detail endpoints expect it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyAddress {
    pub line1: String,
    pub city: String,
    pub state: String,
    pub zip: Option<String>,
}

impl PropertyAddress {
    /// Second address line: `City, ST 30115`.
    pub fn line2(&self) -> String {
        match &self.zip {
            Some(zip) => format!("{}, {} {}", self.city, self.state, zip),
            None => format!("{}, {}", self.city, self.state),
        }
    }

    pub fn single_line(&self) -> String {
        format!("{}, {}", self.line1, self.line2())
    }
}

impl fmt::Display for PropertyAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.single_line())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid address '{input}': expected \"LINE1, CITY, ST [ZIP]\"")]
pub struct ParseAddressError {
    pub input: String,
}

impl FromStr for PropertyAddress {
    type Err = ParseAddressError;

    /// Parses `"4529 Winona Ct, Denver, CO 80212"`.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseAddressError { input: input.to_string() };
        let parts: Vec<&str> = input.split(',').map(str::trim).collect();
        let [line1, city, state_zip] = parts.as_slice() else {
            return Err(invalid());
        };
        let mut state_zip = state_zip.split_whitespace();
        let state = state_zip.next().ok_or_else(invalid)?;
        let zip = state_zip.next().map(str::to_string);
        if line1.is_empty() || city.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            line1: line1.to_string(),
            city: city.to_string(),
            state: state.to_uppercase(),
            zip,
        })
    }
}

/// One recorded sale for a property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleRecord {
    #[serde(default)]
    pub sale_date: Option<NaiveDate>,
    pub amount: u64,
    #[serde(default)]
    pub transaction_type: Option<String>,
}

/// Search criteria accepted by the search merge layer and local stores.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyFilters {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
    #[serde(default)]
    pub min_price: Option<u64>,
    #[serde(default)]
    pub max_price: Option<u64>,
    #[serde(default)]
    pub min_beds: Option<u32>,
    #[serde(default)]
    pub min_baths: Option<f32>,
    #[serde(default)]
    pub limit: Option<usize>,
    /// Explicit request for (or against) a live provider lookup.
    #[serde(default)]
    pub live: Option<bool>,
}

impl PropertyFilters {
    pub fn for_city(city: impl Into<String>) -> Self {
        Self {
            city: Some(city.into()),
            ..Self::default()
        }
    }

    pub fn has_location(&self) -> bool {
        self.city.as_deref().is_some_and(|city| !city.trim().is_empty())
            || self.zip.as_deref().is_some_and(|zip| !zip.trim().is_empty())
    }

    /// A live lookup runs when explicitly requested, or by default when the
    /// filters name a location to search.
    pub fn wants_live_lookup(&self) -> bool {
        self.live.unwrap_or_else(|| self.has_location())
    }

    pub fn matches(&self, property: &Property) -> bool {
        if let Some(city) = &self.city
            && !property.city.trim().eq_ignore_ascii_case(city.trim())
        {
            return false;
        }
        if let Some(state) = &self.state
            && !property.state.trim().eq_ignore_ascii_case(state.trim())
        {
            return false;
        }
        if let Some(zip) = &self.zip
            && normalize_zip(&property.zip) != normalize_zip(zip)
        {
            return false;
        }
        if let Some(min_price) = self.min_price
            && property.price.is_none_or(|price| price < min_price)
        {
            return false;
        }
        if let Some(max_price) = self.max_price
            && property.price.is_none_or(|price| price > max_price)
        {
            return false;
        }
        if let Some(min_beds) = self.min_beds
            && property.beds.is_none_or(|beds| beds < min_beds)
        {
            return false;
        }
        if let Some(min_baths) = self.min_baths
            && property.baths.is_none_or(|baths| baths < min_baths)
        {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn property(external_id: Option<&str>, address: &str, zip: &str) -> Property {
        Property {
            external_id: external_id.map(str::to_string),
            address: address.to_string(),
            city: "Atlanta".into(),
            state: "GA".into(),
            zip: zip.to_string(),
            price: Some(300_000),
            beds: Some(3),
            baths: Some(2.0),
            sqft: Some(1_800),
            provenance: Provenance::Api,
        }
    }

    #[test]
    fn identity_prefers_external_id() {
        let left = property(Some("mls-1"), "1 Peachtree St", "30303");
        let right = property(Some("mls-1"), "99 Somewhere Else", "30318");
        assert_eq!(left.identity(), right.identity());
    }

    #[test]
    fn identity_falls_back_to_normalized_address() {
        let left = property(None, "12 Oak Street.", "30303-0001");
        let right = property(Some("  "), "12  oak st", "30303");
        assert_eq!(left.identity(), right.identity());
        assert_eq!(left.identity().as_key(), "addr:12 oak st|30303");
    }

    #[test]
    fn parses_single_line_addresses() {
        let address: PropertyAddress = "4529 Winona Ct, Denver, co 80212".parse().unwrap();
        assert_eq!(address.line1, "4529 Winona Ct");
        assert_eq!(address.state, "CO");
        assert_eq!(address.zip.as_deref(), Some("80212"));
        assert_eq!(address.line2(), "Denver, CO 80212");
        assert!("no commas here".parse::<PropertyAddress>().is_err());
    }

    #[test]
    fn filters_apply_bounds() {
        let listing = property(None, "1 Main St", "30303");
        let mut filters = PropertyFilters::for_city("atlanta");
        assert!(filters.matches(&listing));

        filters.min_price = Some(350_000);
        assert!(!filters.matches(&listing));

        filters.min_price = None;
        filters.min_beds = Some(3);
        filters.min_baths = Some(2.5);
        assert!(!filters.matches(&listing));
    }

    #[test]
    fn live_lookup_defaults_to_location_presence() {
        assert!(PropertyFilters::for_city("Atlanta").wants_live_lookup());
        assert!(!PropertyFilters::default().wants_live_lookup());

        let mut explicit = PropertyFilters::for_city("Atlanta");
        explicit.live = Some(false);
        assert!(!explicit.wants_live_lookup());
    }
}
