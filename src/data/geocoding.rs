//! Open-Meteo geocoding payloads
//!
//! Name search results are cached forever in the store, so this module only
//! describes the wire shape and its mapping into [`GeocodingEntry`] rows.

use serde::Deserialize;

use super::GeocodingEntry;

/// Response from the geocoding search endpoint
///
/// Open-Meteo omits `results` entirely when nothing matches.
#[derive(Debug, Deserialize)]
pub(crate) struct GeocodingResponse {
    #[serde(default)]
    pub(crate) results: Vec<GeocodingResult>,
}

/// A single place returned by the geocoding endpoint
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeocodingResult {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Some places (oceans, disputed areas) come without a timezone
    #[serde(default)]
    pub timezone: Option<String>,
}

impl GeocodingResult {
    pub fn into_entry(self) -> GeocodingEntry {
        GeocodingEntry {
            name: self.name,
            latitude: self.latitude,
            longitude: self.longitude,
            timezone: self.timezone.unwrap_or_else(|| "auto".to_string()),
        }
    }
}
