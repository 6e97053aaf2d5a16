//! Record store schema and SQL queries.

/// SQL schema for the restaurants table.
///
/// Every attribute column is nullable: catalog imports are best effort and
/// missing attributes are defaulted at read time.
pub const CREATE_RESTAURANTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS restaurants (
    business_id TEXT PRIMARY KEY,
    name TEXT,
    address TEXT,
    rating REAL,
    review_count INTEGER,
    zip_code TEXT,
    latitude REAL,
    longitude REAL,
    cuisine TEXT,
    inserted_at TEXT NOT NULL DEFAULT (datetime('now'))
)
"#;

/// Index supporting cuisine listings used by reindex jobs.
pub const CREATE_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_restaurants_cuisine ON restaurants(cuisine)
"#;

/// Point lookup by business id.
pub const SELECT_RESTAURANT: &str = r#"
SELECT business_id, name, address, rating, review_count, zip_code, latitude, longitude, cuisine
FROM restaurants
WHERE business_id = ?1
"#;

/// Insert or replace one restaurant.
pub const UPSERT_RESTAURANT: &str = r#"
INSERT INTO restaurants (
    business_id, name, address, rating, review_count, zip_code, latitude, longitude, cuisine
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
ON CONFLICT(business_id) DO UPDATE SET
    name = excluded.name,
    address = excluded.address,
    rating = excluded.rating,
    review_count = excluded.review_count,
    zip_code = excluded.zip_code,
    latitude = excluded.latitude,
    longitude = excluded.longitude,
    cuisine = excluded.cuisine
"#;

/// Returns all schema statements in creation order.
pub fn all_schema_statements() -> Vec<&'static str> {
    vec![CREATE_RESTAURANTS_TABLE, CREATE_INDEXES]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_schema_statements_order() {
        let statements = all_schema_statements();
        assert_eq!(statements.len(), 2);
        assert!(statements[0].contains("CREATE TABLE IF NOT EXISTS restaurants"));
        assert!(statements[1].contains("CREATE INDEX"));
    }
}
