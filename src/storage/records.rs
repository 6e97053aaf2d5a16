//! Restaurant record lookups.
//!
//! [`RecordStore`] is a point-lookup interface keyed by restaurant id.
//! [`SqliteRecordStore`] implements it over the `restaurants` table, and
//! [`get_details`] performs the best-effort batch enrichment the worker needs.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use super::schema;
use crate::error::StoreError;
use crate::search::CandidateId;

/// Placeholder rendered for attributes the record store does not hold.
pub const UNKNOWN: &str = "N/A";

/// Geographic position of a restaurant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Denormalized restaurant attributes used in recommendations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestaurantDetail {
    pub name: String,
    pub address: String,
    /// Average rating out of 5, if known.
    pub rating: Option<f64>,
    /// Number of reviews behind the rating, if known.
    pub review_count: Option<u32>,
    pub zip_code: String,
    pub coordinates: Option<Coordinates>,
    pub cuisine: String,
}

impl RestaurantDetail {
    /// Creates a detail with every optional attribute unknown.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: UNKNOWN.to_string(),
            rating: None,
            review_count: None,
            zip_code: UNKNOWN.to_string(),
            coordinates: None,
            cuisine: UNKNOWN.to_string(),
        }
    }

    /// Sets the address.
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// Sets rating and review count.
    pub fn with_rating(mut self, rating: f64, review_count: u32) -> Self {
        self.rating = Some(rating);
        self.review_count = Some(review_count);
        self
    }

    /// Sets the zip code.
    pub fn with_zip_code(mut self, zip_code: impl Into<String>) -> Self {
        self.zip_code = zip_code.into();
        self
    }

    /// Sets the coordinates.
    pub fn with_coordinates(mut self, latitude: f64, longitude: f64) -> Self {
        self.coordinates = Some(Coordinates {
            latitude,
            longitude,
        });
        self
    }

    /// Sets the cuisine.
    pub fn with_cuisine(mut self, cuisine: impl Into<String>) -> Self {
        self.cuisine = cuisine.into();
        self
    }
}

/// Key-based restaurant lookup.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Returns the restaurant stored under `id`, or `None` when absent.
    async fn get_restaurant(&self, id: &CandidateId)
        -> Result<Option<RestaurantDetail>, StoreError>;
}

/// Looks up every id independently, dropping misses and failures.
///
/// Each lookup is bounded by `call_timeout`. The output follows the input
/// order minus the dropped ids.
pub async fn get_details(
    store: &dyn RecordStore,
    ids: &[CandidateId],
    call_timeout: Duration,
) -> Vec<RestaurantDetail> {
    let mut details = Vec::with_capacity(ids.len());

    for id in ids {
        let lookup = tokio::time::timeout(call_timeout, store.get_restaurant(id))
            .await
            .unwrap_or(Err(StoreError::Timeout(call_timeout)));

        match lookup {
            Ok(Some(detail)) => details.push(detail),
            Ok(None) => debug!(restaurant_id = %id, "Restaurant not in record store"),
            Err(e) => warn!(restaurant_id = %id, error = %e, "Restaurant lookup failed"),
        }
    }

    debug!(
        requested = ids.len(),
        retrieved = details.len(),
        "Enriched restaurant candidates"
    );
    details
}

/// Raw row of the restaurants table.
#[derive(Debug, Clone, Default, sqlx::FromRow)]
struct RestaurantRow {
    business_id: String,
    name: Option<String>,
    address: Option<String>,
    rating: Option<f64>,
    review_count: Option<i64>,
    zip_code: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    cuisine: Option<String>,
}

impl RestaurantRow {
    /// Converts a row, substituting defaults for absent attributes.
    fn into_detail(self) -> Result<RestaurantDetail, StoreError> {
        let review_count = match self.review_count {
            Some(count) => Some(u32::try_from(count).map_err(|_| StoreError::Malformed {
                id: self.business_id.clone(),
                reason: format!("review count {} out of range", count),
            })?),
            None => None,
        };

        let rating = match self.rating {
            Some(r) if !(0.0..=5.0).contains(&r) => {
                return Err(StoreError::Malformed {
                    id: self.business_id,
                    reason: format!("rating {} outside 0-5", r),
                })
            }
            other => other,
        };

        let coordinates = match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinates {
                latitude,
                longitude,
            }),
            _ => None,
        };

        Ok(RestaurantDetail {
            name: or_unknown(self.name),
            address: or_unknown(self.address),
            rating,
            review_count,
            zip_code: or_unknown(self.zip_code),
            coordinates,
            cuisine: or_unknown(self.cuisine),
        })
    }
}

fn or_unknown(value: Option<String>) -> String {
    value
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

/// Inverse of [`or_unknown`]: the placeholder is stored as NULL.
fn known(value: &str) -> Option<&str> {
    Some(value).filter(|v| *v != UNKNOWN && !v.trim().is_empty())
}

/// SQLite-backed record store.
#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    /// Opens the database at `url` (e.g. `sqlite://restaurants.db` or `sqlite::memory:`).
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let in_memory = url.contains(":memory:");
        let mut opts = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?
            .create_if_missing(true);
        if !in_memory {
            opts = opts.journal_mode(SqliteJournalMode::Wal);
        }

        // An in-memory database lives and dies with its single connection.
        let max_connections = if in_memory { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(opts)
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        info!(url = url, "Record store opened");
        Ok(Self { pool })
    }

    /// Creates the restaurants table and indexes if missing.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in schema::all_schema_statements() {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Inserts or replaces the restaurant stored under `id`.
    pub async fn upsert(&self, id: &CandidateId, detail: &RestaurantDetail) -> Result<(), StoreError> {
        sqlx::query(schema::UPSERT_RESTAURANT)
            .bind(id.as_str())
            .bind(&detail.name)
            .bind(known(&detail.address))
            .bind(detail.rating)
            .bind(detail.review_count.map(i64::from))
            .bind(known(&detail.zip_code))
            .bind(detail.coordinates.map(|c| c.latitude))
            .bind(detail.coordinates.map(|c| c.longitude))
            .bind(known(&detail.cuisine))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn get_restaurant(
        &self,
        id: &CandidateId,
    ) -> Result<Option<RestaurantDetail>, StoreError> {
        let row: Option<RestaurantRow> = sqlx::query_as(schema::SELECT_RESTAURANT)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(RestaurantRow::into_detail).transpose()
    }
}
