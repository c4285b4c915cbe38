//! Payload normalization: provider JSON into internal shapes.
//!
//! Each function returns `Err(reason)` when the payload lacks what the caller
//! needs; the cascade treats that as a failure of the variant that produced it.

use chrono::NaiveDate;
use listwise_types::{MarketMetrics, Property, Provenance, SaleRecord};
use listwise_util::{extract_collection_items, value_at_path};
use serde_json::Value;

const MEDIAN_SALE_PRICE: &str = "medianSalePrice";

/// Read `area[0].marketstat[]`, a list of `{ "name", "value" }` metric objects.
pub fn market_metrics(payload: &Value) -> Result<MarketMetrics, String> {
    let stats = value_at_path(payload, "area.0.marketstat")
        .and_then(Value::as_array)
        .ok_or_else(|| "missing area[0].marketstat".to_string())?;

    let mut metrics = MarketMetrics::default();
    let mut median = None;
    for stat in stats {
        let Some(name) = stat.get("name").and_then(Value::as_str) else {
            continue;
        };
        let Some(value) = stat.get("value").and_then(number) else {
            continue;
        };
        match name {
            MEDIAN_SALE_PRICE => median = Some(value),
            "avgPricePerSqft" => metrics.average_price_per_sqft = value,
            "avgDaysOnMarket" => metrics.days_on_market = to_u32(value),
            "activeListings" => metrics.active_listings = to_u32(value),
            "monthsOfInventory" => metrics.inventory_months = value,
            "saleToListRatio" => metrics.sale_to_list_ratio = value,
            "priceReductions" => metrics.price_reductions = to_u32(value),
            _ => {}
        }
    }

    match median {
        // Stored as a signed 64-bit integer.
        Some(value) if value.round() >= i64::MAX as f64 => Err(format!("{MEDIAN_SALE_PRICE} {value} is out of range")),
        Some(value) if value > 0.0 => {
            metrics.median_price = value.round() as u64;
            Ok(metrics)
        }
        Some(_) => Err(format!("{MEDIAN_SALE_PRICE} must be positive")),
        None => Err(format!("{MEDIAN_SALE_PRICE} missing from marketstat")),
    }
}

/// Read `property[0]` from a property-detail payload.
pub fn property_detail(payload: &Value) -> Result<Property, String> {
    let record = value_at_path(payload, "property.0").ok_or_else(|| "missing property[0]".to_string())?;
    let text = |path: &str| value_at_path(record, path).and_then(string);

    let address = text("address.line1").ok_or_else(|| "property[0] has no address.line1".to_string())?;
    Ok(Property {
        external_id: value_at_path(record, "identifier.attomId").and_then(string),
        address,
        city: text("address.locality").unwrap_or_default(),
        state: text("address.countrySubd").unwrap_or_default(),
        zip: text("address.postal1").unwrap_or_default(),
        price: value_at_path(record, "sale.amount.saleamt").and_then(number).map(to_u64),
        beds: value_at_path(record, "building.rooms.beds").and_then(number).map(to_u32),
        baths: value_at_path(record, "building.rooms.bathstotal")
            .and_then(number)
            .map(|baths| baths as f32),
        sqft: value_at_path(record, "building.size.livingsize").and_then(number).map(to_u32),
        provenance: Provenance::Api,
    })
}

/// Read `property[0].salehistory[]`. A property with no recorded sales
/// yields an empty list; a payload with no property is malformed.
pub fn sale_history(payload: &Value) -> Result<Vec<SaleRecord>, String> {
    let record = value_at_path(payload, "property.0").ok_or_else(|| "missing property[0]".to_string())?;
    let Some(sales) = record.get("salehistory") else {
        return Ok(Vec::new());
    };
    let sales = sales.as_array().ok_or_else(|| "salehistory is not a list".to_string())?;

    let mut records: Vec<SaleRecord> = sales
        .iter()
        .filter_map(|sale| {
            let amount = value_at_path(sale, "amount.saleamt").and_then(number)?;
            Some(SaleRecord {
                sale_date: sale.get("saleTransDate").and_then(Value::as_str).and_then(parse_date),
                amount: to_u64(amount),
                transaction_type: value_at_path(sale, "amount.saletranstype").and_then(string),
            })
        })
        .collect();
    records.sort_by(|left, right| right.sale_date.cmp(&left.sale_date));
    Ok(records)
}

/// Read a listing feed page. Items without an address are dropped.
pub fn listings(payload: &Value) -> Result<Vec<Property>, String> {
    let items = extract_collection_items(payload, None).ok_or_else(|| "no listing collection in payload".to_string())?;
    Ok(items.iter().filter_map(listing).collect())
}

fn listing(item: &Value) -> Option<Property> {
    let field = |names: &[&str]| names.iter().find_map(|name| item.get(*name));
    let address = field(&["address", "streetAddress"]).and_then(string)?;
    let (location_city, location_state) = field(&["location"])
        .and_then(Value::as_str)
        .map(split_location)
        .unwrap_or_default();
    Some(Property {
        external_id: field(&["mlsId", "id"]).and_then(string),
        address,
        city: field(&["city"]).and_then(string).or(location_city).unwrap_or_default(),
        state: field(&["state"])
            .and_then(string)
            .or(location_state)
            .unwrap_or_default()
            .to_uppercase(),
        zip: field(&["zip", "postalCode"]).and_then(string).unwrap_or_default(),
        price: field(&["price", "listPrice"]).and_then(number).map(to_u64),
        beds: field(&["beds", "bedrooms"]).and_then(number).map(to_u32),
        baths: field(&["baths", "bathrooms"]).and_then(number).map(|baths| baths as f32),
        sqft: field(&["sqft", "livingArea"]).and_then(number).map(to_u32),
        provenance: Provenance::Api,
    })
}

/// Split a `"Canton, GA 30115"` location into city and state. A bare zip
/// carries neither.
fn split_location(text: &str) -> (Option<String>, Option<String>) {
    let Some((city, rest)) = text.split_once(',') else {
        return (None, None);
    };
    let city = Some(city.trim().to_string()).filter(|city| !city.is_empty());
    let state = rest.split_whitespace().next().map(str::to_string);
    (city, state)
}

/// Numbers arrive as JSON numbers or as strings like `"$350,000"`.
fn number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => {
            let cleaned: String = text.chars().filter(|ch| !matches!(ch, '$' | ',' | ' ')).collect();
            cleaned.parse::<f64>().ok()
        }
        _ => None,
    };
    parsed.filter(|number| number.is_finite())
}

fn string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    let day = text.get(..10).unwrap_or(text);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

fn to_u32(value: f64) -> u32 {
    value.round().clamp(0.0, u32::MAX as f64) as u32
}

fn to_u64(value: f64) -> u64 {
    value.round().max(0.0) as u64
}
