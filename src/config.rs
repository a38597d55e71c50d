//! Runtime configuration
//!
//! Freshness thresholds, remote endpoints and the location of the cache
//! database.

use std::path::PathBuf;

use chrono::Duration;
use directories::ProjectDirs;

use crate::data::weather::{OPEN_METEO_BASE_URL, OPEN_METEO_GEOCODING_URL};

/// Environment variable that overrides the default database location
pub const DB_PATH_ENV: &str = "METEOCACHE_DB";

/// Configuration for the synchronization repository
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// How long a cached current-conditions reading is served without refetching
    pub current_weather_ttl: Duration,
    /// How long a cached forecast hierarchy is served without refetching
    pub forecast_ttl: Duration,
    /// Open-Meteo forecast endpoint
    pub forecast_url: String,
    /// Open-Meteo geocoding search endpoint
    pub geocoding_url: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            current_weather_ttl: Duration::minutes(5),
            forecast_ttl: Duration::minutes(15),
            forecast_url: OPEN_METEO_BASE_URL.to_string(),
            geocoding_url: OPEN_METEO_GEOCODING_URL.to_string(),
        }
    }
}

/// Default location of the cache database
///
/// Uses `$METEOCACHE_DB` when set, otherwise `~/.local/share/meteocache/cache.db`
/// on Linux (or the platform equivalent). Falls back to the working directory
/// when no home directory can be determined.
pub fn default_db_path() -> PathBuf {
    if let Some(path) = std::env::var_os(DB_PATH_ENV) {
        return PathBuf::from(path);
    }

    ProjectDirs::from("", "", "meteocache")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cache.db")
}
