//! Synthetic market snapshots used when no provider could answer.
//!
//! The figures are fixed, documented placeholders so that every target in a
//! batch ends up with a row. They are always tagged [`Provenance::Fallback`]
//! and must never be mistaken for live data.

use listwise_types::{MarketMetrics, MarketSnapshot, Period, Provenance, SyncTarget};

pub const FALLBACK_MEDIAN_PRICE: u64 = 350_000;
pub const FALLBACK_PRICE_PER_SQFT: f64 = 175.0;
pub const FALLBACK_DAYS_ON_MARKET: u32 = 30;
pub const FALLBACK_ACTIVE_LISTINGS: u32 = 100;
pub const FALLBACK_INVENTORY_MONTHS: f64 = 3.5;
pub const FALLBACK_SALE_TO_LIST: f64 = 0.98;
pub const FALLBACK_PRICE_REDUCTIONS: u32 = 15;

pub fn fallback_metrics() -> MarketMetrics {
    MarketMetrics {
        median_price: FALLBACK_MEDIAN_PRICE,
        average_price_per_sqft: FALLBACK_PRICE_PER_SQFT,
        days_on_market: FALLBACK_DAYS_ON_MARKET,
        active_listings: FALLBACK_ACTIVE_LISTINGS,
        inventory_months: FALLBACK_INVENTORY_MONTHS,
        sale_to_list_ratio: FALLBACK_SALE_TO_LIST,
        price_reductions: FALLBACK_PRICE_REDUCTIONS,
    }
}

/// Placeholder snapshot for `target` in `period`.
pub fn fallback_snapshot(target: &SyncTarget, period: Period) -> MarketSnapshot {
    MarketSnapshot::from_metrics(target, period, fallback_metrics(), Provenance::Fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use listwise_types::MarketType;

    #[test]
    fn fallback_snapshot_uses_constants_and_is_tagged() {
        let period = Period::new(3, 2025).unwrap();
        let snapshot = fallback_snapshot(&SyncTarget::new("Canton", "GA", Some("30115")), period);

        assert_eq!(snapshot.provenance, Provenance::Fallback);
        assert_eq!(snapshot.median_price, FALLBACK_MEDIAN_PRICE);
        assert_eq!(snapshot.sale_to_list_ratio, FALLBACK_SALE_TO_LIST);
        assert_eq!(snapshot.market_type, MarketType::Sellers);
        assert_eq!(snapshot.period(), period);
        assert_eq!(snapshot.zip.as_deref(), Some("30115"));
    }
}
