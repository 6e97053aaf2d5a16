//! Restaurant record storage.
//!
//! The record store holds the full attributes of every catalogued
//! restaurant, keyed by the same id the search index returns.
//!
//! # Usage
//!
//! ```rust,ignore
//! use dining_concierge::storage::{get_details, SqliteRecordStore};
//!
//! let store = SqliteRecordStore::connect("sqlite://restaurants.db").await?;
//! store.ensure_schema().await?;
//!
//! let details = get_details(&store, &candidate_ids, Duration::from_secs(10)).await;
//! ```

pub mod records;
pub mod schema;

// Re-export main types for convenience
pub use records::{
    get_details, Coordinates, RecordStore, RestaurantDetail, SqliteRecordStore, UNKNOWN,
};
