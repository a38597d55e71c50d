//! Core data models for meteocache
//!
//! This module contains the records persisted by the forecast store and the
//! user-facing value types (units, coordinates, weather conditions) shared by
//! the remote source, the store and the synchronization repository.

pub mod geocoding;
pub mod weather;

pub use geocoding::GeocodingResult;
pub use weather::{
    weather_code_to_condition, CurrentWeatherResponse, ForecastResponse, ForecastSource,
    OpenMeteoClient, SourceError,
};

use serde::{Deserialize, Serialize};

/// Number of days in a cached forecast hierarchy
pub const FORECAST_DAYS: usize = 7;

/// Number of hourly rows owned by each forecast day
pub const HOURS_PER_DAY: usize = 24;

/// Forecast cache key used when no place name is given
pub const DEFAULT_LOCATION_NAME: &str = "DEFAULT";

/// A point on the globe
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
}

impl Coordinates {
    /// Location used when no position is available (Tampere, Finland)
    pub const DEFAULT: Coordinates = Coordinates {
        latitude: 61.5,
        longitude: 23.73,
    };

    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Temperature unit preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    /// Label persisted in the settings table
    pub fn label(&self) -> &'static str {
        match self {
            Self::Celsius => "celsius",
            Self::Fahrenheit => "fahrenheit",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "celsius" => Some(Self::Celsius),
            "fahrenheit" => Some(Self::Fahrenheit),
            _ => None,
        }
    }

    /// Value for Open-Meteo's `temperature_unit` parameter, `None` for the provider default
    pub fn query_value(&self) -> Option<&'static str> {
        match self {
            Self::Celsius => None,
            Self::Fahrenheit => Some("fahrenheit"),
        }
    }
}

/// Wind speed unit preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum WindSpeedUnit {
    KilometersPerHour,
    #[default]
    MetersPerSecond,
    MilesPerHour,
    Knots,
}

impl WindSpeedUnit {
    pub fn label(&self) -> &'static str {
        match self {
            Self::KilometersPerHour => "km/h",
            Self::MetersPerSecond => "m/s",
            Self::MilesPerHour => "mph",
            Self::Knots => "kn",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "km/h" | "kmh" => Some(Self::KilometersPerHour),
            "m/s" | "ms" => Some(Self::MetersPerSecond),
            "mph" => Some(Self::MilesPerHour),
            "kn" | "knots" => Some(Self::Knots),
            _ => None,
        }
    }

    /// Value for Open-Meteo's `wind_speed_unit` parameter
    pub fn query_value(&self) -> Option<&'static str> {
        match self {
            Self::KilometersPerHour => None,
            Self::MetersPerSecond => Some("ms"),
            Self::MilesPerHour => Some("mph"),
            Self::Knots => Some("kn"),
        }
    }
}

/// Precipitation unit preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PrecipitationUnit {
    #[default]
    Millimeters,
    Inches,
}

impl PrecipitationUnit {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Millimeters => "mm",
            Self::Inches => "in",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "mm" => Some(Self::Millimeters),
            "in" | "inch" => Some(Self::Inches),
            _ => None,
        }
    }

    /// Value for Open-Meteo's `precipitation_unit` parameter
    pub fn query_value(&self) -> Option<&'static str> {
        match self {
            Self::Millimeters => None,
            Self::Inches => Some("inch"),
        }
    }
}

/// User preferences, stored as a singleton row
///
/// The defaults (celsius, m/s, mm, dark mode) are what the store seeds on
/// first open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Settings {
    pub temperature_unit: TemperatureUnit,
    pub wind_speed_unit: WindSpeedUnit,
    pub precipitation_unit: PrecipitationUnit,
    /// `false` means dark mode
    pub light_mode: bool,
}

/// The single cached current-conditions reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentWeatherSnapshot {
    /// When the row was written, UTC RFC 3339
    pub stored_at: String,
    /// Observation time in the location's timezone (e.g. "2024-05-21T00:30")
    pub time: String,
    /// Observation interval in seconds
    pub interval: i64,
    pub temperature: f64,
    pub relative_humidity: i64,
    pub apparent_temperature: f64,
    pub precipitation: f64,
    pub rain: f64,
    pub showers: f64,
    pub snowfall: f64,
    /// WMO weather code
    pub weather_code: i64,
    pub wind_speed: f64,
    pub wind_direction: i64,
    pub wind_gusts: f64,
    pub timezone: String,
    pub timezone_abbreviation: String,
    pub elevation: f64,
}

/// Unit labels reported by the provider for every hourly measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MeasurementUnits {
    pub temperature: String,
    pub relative_humidity: String,
    pub apparent_temperature: String,
    pub precipitation_probability: String,
    pub precipitation: String,
    pub rain: String,
    pub showers: String,
    pub snowfall: String,
    pub weather_code: String,
    pub wind_speed: String,
    pub wind_direction: String,
    pub uv_index: String,
}

/// Root row of a cached forecast hierarchy, keyed by `location_name`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastMetadata {
    /// Database row ID, 0 until stored
    pub id: i64,
    /// When the hierarchy was written, UTC RFC 3339
    pub stored_at: String,
    pub location_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: String,
    pub timezone_abbreviation: String,
    pub units: MeasurementUnits,
}

/// One day of a forecast hierarchy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyForecastItem {
    /// Database row ID, 0 until stored
    pub id: i64,
    /// Owning metadata row, stamped by the store on insert
    pub metadata_id: i64,
    /// Calendar date (e.g. "2024-05-21")
    pub date: String,
    pub weather_code: i64,
    pub temperature_max: f64,
    pub temperature_min: f64,
    pub uv_index_max: f64,
    pub precipitation_sum: f64,
    pub rain_sum: f64,
    pub precipitation_probability_max: i64,
    pub wind_direction_dominant: i64,
}

/// One hour of a forecast day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyForecastItem {
    /// Database row ID, 0 until stored
    pub id: i64,
    /// Owning day row, stamped by the store on insert
    pub day_id: i64,
    pub time: String,
    pub temperature: f64,
    pub relative_humidity: i64,
    pub apparent_temperature: f64,
    pub precipitation_probability: i64,
    pub precipitation: f64,
    pub rain: f64,
    pub showers: f64,
    pub snowfall: f64,
    pub weather_code: i64,
    pub wind_speed: f64,
    pub wind_direction: i64,
    pub uv_index: f64,
}

/// A resolved place name from the geocoding cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodingEntry {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: String,
}

impl GeocodingEntry {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }
}

/// A forecast day together with its hours, in stored order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyForecastView {
    pub day: DailyForecastItem,
    pub hours: Vec<HourlyForecastItem>,
}

/// A complete forecast hierarchy as read back from the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastView {
    pub metadata: ForecastMetadata,
    pub days: Vec<DailyForecastView>,
}

/// A forecast hierarchy ready to be written, ids not yet assigned
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastHierarchy {
    pub metadata: ForecastMetadata,
    pub days: Vec<DailyForecastItem>,
    /// `hours[d]` holds the hourly rows of `days[d]`
    pub hours: Vec<Vec<HourlyForecastItem>>,
}

/// Types of weather conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeatherCondition {
    Clear,
    PartlyCloudy,
    Cloudy,
    Rain,
    Showers,
    Thunderstorm,
    Snow,
    Fog,
}

impl WeatherCondition {
    pub fn description(&self) -> &'static str {
        match self {
            Self::Clear => "Clear",
            Self::PartlyCloudy => "Partly cloudy",
            Self::Cloudy => "Cloudy",
            Self::Rain => "Rain",
            Self::Showers => "Freezing showers",
            Self::Thunderstorm => "Thunderstorm",
            Self::Snow => "Snow",
            Self::Fog => "Fog",
        }
    }
}

/// Eight-sector compass direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindDirection {
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl WindDirection {
    /// Maps a meteorological bearing in degrees to its compass sector
    pub fn from_degrees(degrees: i64) -> Self {
        match degrees.rem_euclid(360) {
            338.. | 0..=22 => Self::North,
            23..=67 => Self::NorthEast,
            68..=112 => Self::East,
            113..=157 => Self::SouthEast,
            158..=202 => Self::South,
            203..=247 => Self::SouthWest,
            248..=292 => Self::West,
            _ => Self::NorthWest,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::North => "North",
            Self::NorthEast => "North East",
            Self::East => "East",
            Self::SouthEast => "South East",
            Self::South => "South",
            Self::SouthWest => "South West",
            Self::West => "West",
            Self::NorthWest => "North West",
        }
    }
}
