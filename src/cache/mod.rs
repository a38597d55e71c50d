//! Relational forecast cache
//!
//! This module provides a SQLite-backed store for user settings, the latest
//! current-conditions reading, one 7-day forecast hierarchy per location name
//! and the place-name lookup cache. Forecast hierarchies are written
//! all-or-nothing so a partially stored forecast is never visible.

mod error;
mod schema;
mod store;

pub use error::{Result, StoreError};
pub use schema::SCHEMA_VERSION;
pub use store::{ForecastStore, GEOCODING_SEARCH_LIMIT};
