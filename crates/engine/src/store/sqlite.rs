//! SQLite backend over an `sqlx` pool.
//!
//! Natural keys are enforced by unique indexes on normalized key columns, so
//! an upsert is a single `INSERT ... ON CONFLICT DO UPDATE` statement and
//! concurrent writers for the same key cannot interleave a delete and insert.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use listwise_types::{LocationKey, MarketSnapshot, MarketType, Property, PropertyFilters, Provenance};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::debug;

use super::{MarketStore, validate_property, validate_snapshot};
use crate::error::StoreError;

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS market_snapshots (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        city TEXT NOT NULL,
        state TEXT NOT NULL,
        zip TEXT,
        city_key TEXT NOT NULL,
        state_key TEXT NOT NULL,
        zip_key TEXT NOT NULL DEFAULT '',
        month INTEGER NOT NULL,
        year INTEGER NOT NULL,
        median_price INTEGER NOT NULL,
        average_price_per_sqft REAL NOT NULL,
        days_on_market INTEGER NOT NULL,
        active_listings INTEGER NOT NULL,
        inventory_months REAL NOT NULL,
        sale_to_list_ratio REAL NOT NULL,
        price_reductions INTEGER NOT NULL,
        market_type TEXT NOT NULL,
        provenance TEXT NOT NULL,
        created_at TEXT NOT NULL
    )"#,
    r#"CREATE UNIQUE INDEX IF NOT EXISTS market_snapshots_natural_key
        ON market_snapshots (city_key, state_key, zip_key, month, year)"#,
    r#"CREATE TABLE IF NOT EXISTS properties (
        identity_key TEXT PRIMARY KEY NOT NULL,
        external_id TEXT,
        address TEXT NOT NULL,
        city TEXT NOT NULL,
        state TEXT NOT NULL,
        zip TEXT NOT NULL,
        price INTEGER,
        beds INTEGER,
        baths REAL,
        sqft INTEGER,
        provenance TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )"#,
];

const SNAPSHOT_COLUMNS: &str = "city, state, zip, month, year, median_price, average_price_per_sqft, days_on_market, \
     active_listings, inventory_months, sale_to_list_ratio, price_reductions, market_type, provenance, created_at";

const PROPERTY_COLUMNS: &str = "external_id, address, city, state, zip, price, beds, baths, sqft, provenance";

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to `database_url` (e.g. `sqlite://listwise.db`), creating the
    /// file and schema when missing.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // Each connection to `:memory:` opens a separate database.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        debug!(max_connections, "sqlite store ready");
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl MarketStore for SqliteStore {
    async fn upsert_snapshot(&self, snapshot: &MarketSnapshot) -> Result<MarketSnapshot, StoreError> {
        validate_snapshot(snapshot)?;
        let key = snapshot.location_key();
        let sql = format!(
            "INSERT INTO market_snapshots ({SNAPSHOT_COLUMNS}, city_key, state_key, zip_key) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (city_key, state_key, zip_key, month, year) DO UPDATE SET \
             city = excluded.city, state = excluded.state, zip = excluded.zip, \
             median_price = excluded.median_price, average_price_per_sqft = excluded.average_price_per_sqft, \
             days_on_market = excluded.days_on_market, active_listings = excluded.active_listings, \
             inventory_months = excluded.inventory_months, sale_to_list_ratio = excluded.sale_to_list_ratio, \
             price_reductions = excluded.price_reductions, market_type = excluded.market_type, \
             provenance = excluded.provenance, created_at = excluded.created_at"
        );
        sqlx::query(&sql)
            .bind(&snapshot.city)
            .bind(&snapshot.state)
            .bind(snapshot.zip.as_deref())
            .bind(snapshot.month)
            .bind(snapshot.year)
            .bind(to_i64(snapshot.median_price)?)
            .bind(snapshot.average_price_per_sqft)
            .bind(snapshot.days_on_market)
            .bind(snapshot.active_listings)
            .bind(snapshot.inventory_months)
            .bind(snapshot.sale_to_list_ratio)
            .bind(snapshot.price_reductions)
            .bind(snapshot.market_type.as_str())
            .bind(snapshot.provenance.as_str())
            .bind(timestamp(&snapshot.created_at))
            .bind(&key.city)
            .bind(&key.state)
            .bind(&key.zip)
            .execute(&self.pool)
            .await?;
        Ok(snapshot.clone())
    }

    async fn latest_snapshot(&self, location: &LocationKey) -> Result<Option<MarketSnapshot>, StoreError> {
        let sql = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM market_snapshots \
             WHERE city_key = ? AND state_key = ? AND zip_key = ? \
             ORDER BY year DESC, month DESC, created_at DESC LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(&location.city)
            .bind(&location.state)
            .bind(&location.zip)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(snapshot_from_row).transpose()
    }

    async fn snapshots_for_location(&self, location: &LocationKey) -> Result<Vec<MarketSnapshot>, StoreError> {
        let sql = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM market_snapshots \
             WHERE city_key = ? AND state_key = ? AND zip_key = ? \
             ORDER BY year DESC, month DESC, created_at DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(&location.city)
            .bind(&location.state)
            .bind(&location.zip)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(snapshot_from_row).collect()
    }

    async fn upsert_property(&self, property: &Property) -> Result<Property, StoreError> {
        validate_property(property)?;
        let sql = format!(
            "INSERT INTO properties (identity_key, {PROPERTY_COLUMNS}, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (identity_key) DO UPDATE SET \
             external_id = excluded.external_id, address = excluded.address, city = excluded.city, \
             state = excluded.state, zip = excluded.zip, price = excluded.price, beds = excluded.beds, \
             baths = excluded.baths, sqft = excluded.sqft, provenance = excluded.provenance, \
             updated_at = excluded.updated_at"
        );
        sqlx::query(&sql)
            .bind(property.identity().as_key())
            .bind(property.external_id.as_deref())
            .bind(&property.address)
            .bind(&property.city)
            .bind(&property.state)
            .bind(&property.zip)
            .bind(property.price.map(to_i64).transpose()?)
            .bind(property.beds)
            .bind(property.baths.map(f64::from))
            .bind(property.sqft)
            .bind(property.provenance.as_str())
            .bind(timestamp(&Utc::now()))
            .execute(&self.pool)
            .await?;
        Ok(property.clone())
    }

    async fn search_properties(&self, filters: &PropertyFilters) -> Result<Vec<Property>, StoreError> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(format!("SELECT {PROPERTY_COLUMNS} FROM properties WHERE 1 = 1"));
        if let Some(city) = filters.city.as_deref().map(str::trim).filter(|city| !city.is_empty()) {
            query.push(" AND city = ").push_bind(city.to_string()).push(" COLLATE NOCASE");
        }
        if let Some(state) = filters.state.as_deref().map(str::trim).filter(|state| !state.is_empty()) {
            query.push(" AND state = ").push_bind(state.to_string()).push(" COLLATE NOCASE");
        }
        query.push(" ORDER BY rowid");

        let rows = query.build().fetch_all(&self.pool).await?;
        let mut properties = Vec::with_capacity(rows.len());
        for row in &rows {
            let property = property_from_row(row)?;
            // Remaining filters (zip prefix, price, beds, baths) share one definition.
            if filters.matches(&property) {
                properties.push(property);
            }
        }
        Ok(properties)
    }
}

fn snapshot_from_row(row: &SqliteRow) -> Result<MarketSnapshot, StoreError> {
    let market_type: String = row.try_get("market_type")?;
    let provenance: String = row.try_get("provenance")?;
    let created_at: String = row.try_get("created_at")?;
    Ok(MarketSnapshot {
        city: row.try_get("city")?,
        state: row.try_get("state")?,
        zip: row.try_get("zip")?,
        month: row.try_get("month")?,
        year: row.try_get("year")?,
        median_price: from_i64(row.try_get("median_price")?)?,
        average_price_per_sqft: row.try_get("average_price_per_sqft")?,
        days_on_market: row.try_get("days_on_market")?,
        active_listings: row.try_get("active_listings")?,
        inventory_months: row.try_get("inventory_months")?,
        sale_to_list_ratio: row.try_get("sale_to_list_ratio")?,
        price_reductions: row.try_get("price_reductions")?,
        market_type: MarketType::from_str(&market_type).map_err(StoreError::Serialization)?,
        provenance: Provenance::from_str(&provenance).map_err(StoreError::Serialization)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map_err(|error| StoreError::Serialization(format!("created_at '{created_at}': {error}")))?
            .with_timezone(&Utc),
    })
}

fn property_from_row(row: &SqliteRow) -> Result<Property, StoreError> {
    let provenance: String = row.try_get("provenance")?;
    let price: Option<i64> = row.try_get("price")?;
    let baths: Option<f64> = row.try_get("baths")?;
    Ok(Property {
        external_id: row.try_get("external_id")?,
        address: row.try_get("address")?,
        city: row.try_get("city")?,
        state: row.try_get("state")?,
        zip: row.try_get("zip")?,
        price: price.map(from_i64).transpose()?,
        beds: row.try_get("beds")?,
        baths: baths.map(|baths| baths as f32),
        sqft: row.try_get("sqft")?,
        provenance: Provenance::from_str(&provenance).map_err(StoreError::Serialization)?,
    })
}

/// Fixed-precision RFC 3339 so text ordering matches time ordering.
fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn to_i64(value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::Rejected(format!("value {value} exceeds the storable range")))
}

fn from_i64(value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Serialization(format!("negative amount {value}")))
}
