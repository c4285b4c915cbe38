//! Property-data API adapter: market statistics, property detail and sale
//! history, each behind its own endpoint cascade.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use listwise_api::{PROPERTY_API_KEY_ENV, ProviderTransport};
use listwise_types::{MarketMetrics, Property, PropertyAddress, SaleRecord, SyncTarget};
use tokio::sync::Semaphore;

use super::cascade::{CascadeContext, EndpointCascade, Fetched, QueryVariant};
use super::{AdapterOptions, MarketStatisticsProvider, PropertyRecordProvider, normalize, param};
use crate::error::ProviderError;

const SALES_TREND_PATH: &str = "/v4/salestrend/snapshot";
const LEGACY_AREA_PATH: &str = "/propertyapi/v1.0.0/area/marketstats";
const LEGACY_DETAIL_PATH: &str = "/propertyapi/v1.0.0/property/detail";
const DETAIL_PATH: &str = "/v4/property/detail";
const LEGACY_SALES_HISTORY_PATH: &str = "/propertyapi/v1.0.0/saleshistory/detail";
const SALES_HISTORY_PATH: &str = "/v4/saleshistory/detail";

pub struct PropertyApiAdapter {
    transport: Arc<dyn ProviderTransport>,
    api_key: Option<String>,
    options: AdapterOptions,
    limiter: Semaphore,
    market_statistics: EndpointCascade<SyncTarget>,
    property_details: EndpointCascade<PropertyAddress>,
    sale_history: EndpointCascade<PropertyAddress>,
}

impl PropertyApiAdapter {
    pub const NAME: &'static str = "property_api";

    pub fn new(transport: Arc<dyn ProviderTransport>, api_key: Option<String>, options: AdapterOptions) -> Self {
        Self {
            transport,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            limiter: Semaphore::new(options.max_in_flight),
            options,
            market_statistics: EndpointCascade::new("market statistics")
                .with_variant(QueryVariant::new("postal_code", SALES_TREND_PATH, by_postal_code))
                .with_variant(QueryVariant::new("city_state", SALES_TREND_PATH, by_city_state))
                .with_variant(QueryVariant::new("legacy_area", LEGACY_AREA_PATH, by_legacy_area)),
            property_details: EndpointCascade::new("property detail")
                .with_variant(QueryVariant::new("address_parts", LEGACY_DETAIL_PATH, by_address_parts))
                .with_variant(QueryVariant::new("single_line", DETAIL_PATH, by_single_line)),
            sale_history: EndpointCascade::new("sale history")
                .with_variant(QueryVariant::new("address_parts", LEGACY_SALES_HISTORY_PATH, by_address_parts))
                .with_variant(QueryVariant::new("single_line", SALES_HISTORY_PATH, by_single_line)),
        }
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    /// Resolve the credential first so a missing key never reaches the transport.
    fn context(&self) -> Result<CascadeContext<'_>, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::missing_credential(Self::NAME, PROPERTY_API_KEY_ENV))?;
        Ok(CascadeContext {
            provider: Self::NAME,
            transport: self.transport.as_ref(),
            api_key_header: &self.options.api_key_header,
            api_key,
            timeout: self.options.timeout,
            limiter: &self.limiter,
        })
    }
}

impl fmt::Debug for PropertyApiAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyApiAdapter")
            .field("has_credential", &self.has_credential())
            .field("options", &self.options)
            .field("market_statistics", &self.market_statistics.variant_names())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl MarketStatisticsProvider for PropertyApiAdapter {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn fetch_market_statistics(&self, target: &SyncTarget) -> Result<Fetched<MarketMetrics>, ProviderError> {
        let ctx = self.context()?;
        self.market_statistics.execute(&ctx, target, normalize::market_metrics).await
    }
}

#[async_trait]
impl PropertyRecordProvider for PropertyApiAdapter {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn fetch_property_details(&self, address: &PropertyAddress) -> Result<Fetched<Property>, ProviderError> {
        let ctx = self.context()?;
        self.property_details.execute(&ctx, address, normalize::property_detail).await
    }

    async fn fetch_sale_history(&self, address: &PropertyAddress) -> Result<Fetched<Vec<SaleRecord>>, ProviderError> {
        let ctx = self.context()?;
        self.sale_history.execute(&ctx, address, normalize::sale_history).await
    }
}

fn by_postal_code(target: &SyncTarget) -> Option<Vec<(String, String)>> {
    target.zip.as_ref().map(|zip| vec![param("postalcode", zip)])
}

fn by_city_state(target: &SyncTarget) -> Option<Vec<(String, String)>> {
    Some(vec![param("city", &target.city), param("state", &target.state)])
}

fn by_legacy_area(target: &SyncTarget) -> Option<Vec<(String, String)>> {
    let mut query = vec![param("cityname", &target.city), param("statecode", &target.state)];
    if let Some(zip) = &target.zip {
        query.push(param("postalcode", zip));
    }
    Some(query)
}

fn by_address_parts(address: &PropertyAddress) -> Option<Vec<(String, String)>> {
    Some(vec![param("address1", &address.line1), param("address2", address.line2())])
}

fn by_single_line(address: &PropertyAddress) -> Option<Vec<(String, String)>> {
    Some(vec![param("address", address.single_line())])
}

#[cfg(test)]
mod tests {
    use super::*;
    use listwise_api::ScriptedTransport;
    use serde_json::json;
    use std::time::Duration;

    fn stats_body(median: u64) -> String {
        json!({"area": [{"marketstat": [
            {"name": "medianSalePrice", "value": median},
            {"name": "monthsOfInventory", "value": 5.0}
        ]}]})
        .to_string()
    }

    fn adapter(transport: Arc<ScriptedTransport>, key: Option<&str>) -> PropertyApiAdapter {
        PropertyApiAdapter::new(
            transport,
            key.map(str::to_string),
            AdapterOptions::new("apikey", Duration::from_secs(5), 2),
        )
    }

    #[tokio::test]
    async fn missing_credential_fails_before_any_request() {
        let transport = Arc::new(ScriptedTransport::new());
        let adapter = adapter(transport.clone(), None);

        let error = adapter
            .fetch_market_statistics(&SyncTarget::new("Canton", "GA", Some("30115")))
            .await
            .unwrap_err();

        assert!(error.is_configuration());
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn postal_code_variant_is_tried_first() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond_with_param(SALES_TREND_PATH, "postalcode", 200, stats_body(410_000));
        let adapter = adapter(transport.clone(), Some("secret"));

        let fetched = adapter
            .fetch_market_statistics(&SyncTarget::new("Canton", "GA", Some("30115")))
            .await
            .unwrap();

        assert_eq!(fetched.value.median_price, 410_000);
        assert_eq!(fetched.variant, "postal_code");
        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].param("postalcode"), Some("30115"));
        assert_eq!(requests[0].api_key_header, "apikey");
    }

    #[tokio::test]
    async fn target_without_zip_starts_at_city_state() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond_with_param(SALES_TREND_PATH, "city", 200, stats_body(300_000));
        let adapter = adapter(transport.clone(), Some("secret"));

        let fetched = adapter
            .fetch_market_statistics(&SyncTarget::new("Canton", "GA", None))
            .await
            .unwrap();

        assert_eq!(fetched.variant, "city_state");
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn out_of_range_median_moves_to_the_next_variant() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond_with_param(
            SALES_TREND_PATH,
            "postalcode",
            200,
            json!({"area": [{"marketstat": [{"name": "medianSalePrice", "value": 1.0e19}]}]}).to_string(),
        );
        transport.respond_with_param(SALES_TREND_PATH, "city", 200, stats_body(360_000));
        let adapter = adapter(transport.clone(), Some("secret"));

        let fetched = adapter
            .fetch_market_statistics(&SyncTarget::new("Canton", "GA", Some("30115")))
            .await
            .unwrap();

        assert_eq!(fetched.variant, "city_state");
        assert_eq!(fetched.value.median_price, 360_000);
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test]
    async fn legacy_area_is_the_last_resort() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(SALES_TREND_PATH, 503, "unavailable");
        transport.respond(LEGACY_AREA_PATH, 200, stats_body(250_000));
        let adapter = adapter(transport.clone(), Some("secret"));

        let fetched = adapter
            .fetch_market_statistics(&SyncTarget::new("Canton", "GA", Some("30115")))
            .await
            .unwrap();

        assert_eq!(fetched.variant, "legacy_area");
        let requests = transport.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[2].param("cityname"), Some("Canton"));
        assert_eq!(requests[2].param("postalcode"), Some("30115"));
    }

    #[tokio::test]
    async fn property_detail_falls_back_to_single_line_address() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(LEGACY_DETAIL_PATH, 400, "bad address");
        transport.respond(
            DETAIL_PATH,
            200,
            json!({"property": [{"address": {"line1": "4529 Winona Ct", "locality": "Denver", "countrySubd": "CO", "postal1": "80212"}}]})
                .to_string(),
        );
        let adapter = adapter(transport.clone(), Some("secret"));
        let address: PropertyAddress = "4529 Winona Ct, Denver, CO 80212".parse().unwrap();

        let fetched = adapter.fetch_property_details(&address).await.unwrap();

        assert_eq!(fetched.variant, "single_line");
        assert_eq!(fetched.value.zip, "80212");
        assert_eq!(transport.requests()[1].param("address"), Some("4529 Winona Ct, Denver, CO 80212"));
    }

    #[tokio::test]
    async fn sale_history_exhaustion_reports_unavailable() {
        let transport = Arc::new(ScriptedTransport::new());
        let adapter = adapter(transport.clone(), Some("secret"));
        let address: PropertyAddress = "1 Main St, Canton, GA 30115".parse().unwrap();

        let error = adapter.fetch_sale_history(&address).await.unwrap_err();

        assert!(matches!(error, ProviderError::Unavailable { attempts: 2, .. }));
        assert_eq!(transport.request_count(), 2);
    }
}
