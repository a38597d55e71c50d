//! Open-Meteo weather API client
//!
//! This module provides the narrow fetch contract the synchronization
//! repository depends on ([`ForecastSource`]), its Open-Meteo implementation,
//! and the mapping from Open-Meteo payloads into store records.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use super::geocoding::{GeocodingResponse, GeocodingResult};
use super::{
    Coordinates, CurrentWeatherSnapshot, DailyForecastItem, ForecastHierarchy, ForecastMetadata,
    HourlyForecastItem, MeasurementUnits, Settings, WeatherCondition, FORECAST_DAYS,
    HOURS_PER_DAY,
};

/// Base URL for the Open-Meteo forecast API
pub const OPEN_METEO_BASE_URL: &str = "https://api.open-meteo.com/v1/forecast";

/// Base URL for the Open-Meteo geocoding API
pub const OPEN_METEO_GEOCODING_URL: &str = "https://geocoding-api.open-meteo.com/v1/search";

/// Maximum number of places requested from the geocoding endpoint
pub const GEOCODING_RESULT_COUNT: usize = 10;

const CURRENT_FIELDS: &str = "temperature_2m,relative_humidity_2m,apparent_temperature,precipitation,rain,showers,snowfall,weather_code,wind_speed_10m,wind_direction_10m,wind_gusts_10m";

const HOURLY_FIELDS: &str = "temperature_2m,relative_humidity_2m,apparent_temperature,precipitation_probability,precipitation,rain,showers,snowfall,weather_code,wind_speed_10m,wind_direction_10m,uv_index";

const DAILY_FIELDS: &str = "weather_code,temperature_2m_max,temperature_2m_min,uv_index_max,precipitation_sum,rain_sum,precipitation_probability_max,wind_direction_10m_dominant";

/// Errors that can occur when fetching from the remote source
#[derive(Debug, Error)]
pub enum SourceError {
    /// HTTP request failed (unreachable, timeout, TLS)
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("Unexpected HTTP status: {0}")]
    Status(StatusCode),

    /// Failed to parse JSON response
    #[error("Failed to parse JSON response: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Missing expected field in response, or arrays of the wrong length
    #[error("Missing expected field in response: {0}")]
    MissingField(String),
}

impl SourceError {
    /// Whether the failure happened before a payload was received
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::RequestFailed(_) | Self::Status(_))
    }
}

/// Fetch contract for current conditions, forecasts and place-name search
///
/// The repository only ever talks to the network through this trait, which
/// lets tests substitute a counting mock.
#[async_trait]
pub trait ForecastSource: Send + Sync {
    /// Fetch current conditions for a location, in the units of `settings`.
    async fn fetch_current(
        &self,
        location: Coordinates,
        settings: &Settings,
    ) -> Result<CurrentWeatherResponse, SourceError>;

    /// Fetch the 7-day daily and hourly forecast for a location.
    async fn fetch_forecast(
        &self,
        location: Coordinates,
        settings: &Settings,
    ) -> Result<ForecastResponse, SourceError>;

    /// Search places whose name matches `name`.
    async fn search_locations(&self, name: &str) -> Result<Vec<GeocodingResult>, SourceError>;
}

/// Client for fetching weather data from Open-Meteo API
#[derive(Debug, Clone)]
pub struct OpenMeteoClient {
    client: Client,
    forecast_url: String,
    geocoding_url: String,
}

impl Default for OpenMeteoClient {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenMeteoClient {
    /// Create a new OpenMeteoClient against the public endpoints
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    /// Create a new OpenMeteoClient with a custom HTTP client
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            forecast_url: OPEN_METEO_BASE_URL.to_string(),
            geocoding_url: OPEN_METEO_GEOCODING_URL.to_string(),
        }
    }

    /// Point the client at other endpoints (mirrors, mock servers)
    pub fn with_base_urls(
        mut self,
        forecast_url: impl Into<String>,
        geocoding_url: impl Into<String>,
    ) -> Self {
        self.forecast_url = forecast_url.into();
        self.geocoding_url = geocoding_url.into();
        self
    }

    /// Build the current-conditions request URL
    pub fn current_url(&self, location: Coordinates, settings: &Settings) -> String {
        format!(
            "{}?latitude={}&longitude={}&current={}&timezone=auto{}",
            self.forecast_url,
            location.latitude,
            location.longitude,
            CURRENT_FIELDS,
            unit_query(settings)
        )
    }

    /// Build the 7-day forecast request URL
    pub fn forecast_url(&self, location: Coordinates, settings: &Settings) -> String {
        format!(
            "{}?latitude={}&longitude={}&hourly={}&daily={}&timezone=auto{}",
            self.forecast_url,
            location.latitude,
            location.longitude,
            HOURLY_FIELDS,
            DAILY_FIELDS,
            unit_query(settings)
        )
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, SourceError> {
        debug!("GET {}", url);
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status(status));
        }
        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl ForecastSource for OpenMeteoClient {
    async fn fetch_current(
        &self,
        location: Coordinates,
        settings: &Settings,
    ) -> Result<CurrentWeatherResponse, SourceError> {
        self.get_json(&self.current_url(location, settings)).await
    }

    async fn fetch_forecast(
        &self,
        location: Coordinates,
        settings: &Settings,
    ) -> Result<ForecastResponse, SourceError> {
        self.get_json(&self.forecast_url(location, settings)).await
    }

    async fn search_locations(&self, name: &str) -> Result<Vec<GeocodingResult>, SourceError> {
        let count = GEOCODING_RESULT_COUNT.to_string();
        let response = self
            .client
            .get(&self.geocoding_url)
            .query(&[
                ("name", name),
                ("count", count.as_str()),
                ("language", "en"),
                ("format", "json"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status(status));
        }
        let text = response.text().await?;
        let body: GeocodingResponse = serde_json::from_str(&text)?;
        Ok(body.results)
    }
}

/// Unit overrides appended to a forecast URL; provider defaults are omitted
fn unit_query(settings: &Settings) -> String {
    let mut query = String::new();
    if let Some(value) = settings.temperature_unit.query_value() {
        query.push_str("&temperature_unit=");
        query.push_str(value);
    }
    if let Some(value) = settings.wind_speed_unit.query_value() {
        query.push_str("&wind_speed_unit=");
        query.push_str(value);
    }
    if let Some(value) = settings.precipitation_unit.query_value() {
        query.push_str("&precipitation_unit=");
        query.push_str(value);
    }
    query
}

/// Map WMO weather code to WeatherCondition enum
///
/// Weather codes from WMO (World Meteorological Organization):
/// - 0: Clear sky
/// - 1-3: Partly cloudy
/// - 45, 48: Fog
/// - 51-55: Drizzle
/// - 56-57: Freezing drizzle
/// - 61-65: Rain
/// - 66-67: Freezing rain
/// - 71-77: Snow
/// - 80-82: Rain showers
/// - 85-86: Snow showers
/// - 95-99: Thunderstorm
pub fn weather_code_to_condition(code: i64) -> WeatherCondition {
    match code {
        0 => WeatherCondition::Clear,
        1..=3 => WeatherCondition::PartlyCloudy,
        45 | 48 => WeatherCondition::Fog,
        51..=55 | 61..=65 | 80..=82 => WeatherCondition::Rain,
        56..=57 | 66..=67 => WeatherCondition::Showers,
        71..=77 | 85..=86 => WeatherCondition::Snow,
        95..=99 => WeatherCondition::Thunderstorm,
        _ => WeatherCondition::Cloudy, // Default for unknown codes
    }
}

/// Open-Meteo sends integer measurements as JSON numbers; accept either form
fn int(value: f64) -> i64 {
    value.round() as i64
}

/// Open-Meteo current-conditions response
#[derive(Debug, Clone, Deserialize)]
pub struct CurrentWeatherResponse {
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: String,
    pub timezone_abbreviation: String,
    pub elevation: f64,
    pub current: CurrentValues,
}

/// The `current` object of a current-conditions response
#[derive(Debug, Clone, Deserialize)]
pub struct CurrentValues {
    pub time: String,
    pub interval: f64,
    pub temperature_2m: f64,
    pub relative_humidity_2m: f64,
    pub apparent_temperature: f64,
    pub precipitation: f64,
    pub rain: f64,
    pub showers: f64,
    pub snowfall: f64,
    pub weather_code: f64,
    pub wind_speed_10m: f64,
    pub wind_direction_10m: f64,
    pub wind_gusts_10m: f64,
}

impl CurrentWeatherResponse {
    /// Map into the singleton store record
    pub fn into_snapshot(self, stored_at: String) -> CurrentWeatherSnapshot {
        let current = self.current;
        CurrentWeatherSnapshot {
            stored_at,
            time: current.time,
            interval: int(current.interval),
            temperature: current.temperature_2m,
            relative_humidity: int(current.relative_humidity_2m),
            apparent_temperature: current.apparent_temperature,
            precipitation: current.precipitation,
            rain: current.rain,
            showers: current.showers,
            snowfall: current.snowfall,
            weather_code: int(current.weather_code),
            wind_speed: current.wind_speed_10m,
            wind_direction: int(current.wind_direction_10m),
            wind_gusts: current.wind_gusts_10m,
            timezone: self.timezone,
            timezone_abbreviation: self.timezone_abbreviation,
            elevation: self.elevation,
        }
    }
}

/// Open-Meteo 7-day forecast response
#[derive(Debug, Clone, Deserialize)]
pub struct ForecastResponse {
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: String,
    pub timezone_abbreviation: String,
    pub daily: DailyWeather,
    pub hourly_units: HourlyUnits,
    pub hourly: HourlyWeather,
}

/// Daily parallel arrays from Open-Meteo
#[derive(Debug, Clone, Deserialize)]
pub struct DailyWeather {
    pub time: Vec<String>,
    pub weather_code: Vec<f64>,
    pub temperature_2m_max: Vec<f64>,
    pub temperature_2m_min: Vec<f64>,
    pub uv_index_max: Vec<f64>,
    pub precipitation_sum: Vec<f64>,
    pub rain_sum: Vec<f64>,
    pub precipitation_probability_max: Vec<f64>,
    pub wind_direction_10m_dominant: Vec<f64>,
}

/// Unit labels for the hourly arrays
#[derive(Debug, Clone, Deserialize)]
pub struct HourlyUnits {
    pub temperature_2m: String,
    pub relative_humidity_2m: String,
    pub apparent_temperature: String,
    pub precipitation_probability: String,
    pub precipitation: String,
    pub rain: String,
    pub showers: String,
    pub snowfall: String,
    pub weather_code: String,
    pub wind_speed_10m: String,
    pub wind_direction_10m: String,
    pub uv_index: String,
}

/// Hourly parallel arrays from Open-Meteo, one entry per hour
#[derive(Debug, Clone, Deserialize)]
pub struct HourlyWeather {
    pub time: Vec<String>,
    pub temperature_2m: Vec<f64>,
    pub relative_humidity_2m: Vec<f64>,
    pub apparent_temperature: Vec<f64>,
    pub precipitation_probability: Vec<f64>,
    pub precipitation: Vec<f64>,
    pub rain: Vec<f64>,
    pub showers: Vec<f64>,
    pub snowfall: Vec<f64>,
    pub weather_code: Vec<f64>,
    pub wind_speed_10m: Vec<f64>,
    pub wind_direction_10m: Vec<f64>,
    pub uv_index: Vec<f64>,
}

fn require_len(field: &str, len: usize, needed: usize) -> Result<(), SourceError> {
    if len < needed {
        return Err(SourceError::MissingField(format!(
            "{} has {} entries, expected at least {}",
            field, len, needed
        )));
    }
    Ok(())
}

impl ForecastResponse {
    /// Map into a 7-day, 168-hour hierarchy for `location_name`
    ///
    /// Day `d` owns the hourly entries `[d*24, d*24+24)`. Ids are left at 0
    /// for the store to assign.
    pub fn into_hierarchy(
        self,
        location_name: &str,
        stored_at: String,
    ) -> Result<ForecastHierarchy, SourceError> {
        let daily = &self.daily;
        for (field, len) in [
            ("daily.time", daily.time.len()),
            ("daily.weather_code", daily.weather_code.len()),
            ("daily.temperature_2m_max", daily.temperature_2m_max.len()),
            ("daily.temperature_2m_min", daily.temperature_2m_min.len()),
            ("daily.uv_index_max", daily.uv_index_max.len()),
            ("daily.precipitation_sum", daily.precipitation_sum.len()),
            ("daily.rain_sum", daily.rain_sum.len()),
            (
                "daily.precipitation_probability_max",
                daily.precipitation_probability_max.len(),
            ),
            (
                "daily.wind_direction_10m_dominant",
                daily.wind_direction_10m_dominant.len(),
            ),
        ] {
            require_len(field, len, FORECAST_DAYS)?;
        }

        let hourly = &self.hourly;
        let needed_hours = FORECAST_DAYS * HOURS_PER_DAY;
        for (field, len) in [
            ("hourly.time", hourly.time.len()),
            ("hourly.temperature_2m", hourly.temperature_2m.len()),
            ("hourly.relative_humidity_2m", hourly.relative_humidity_2m.len()),
            ("hourly.apparent_temperature", hourly.apparent_temperature.len()),
            (
                "hourly.precipitation_probability",
                hourly.precipitation_probability.len(),
            ),
            ("hourly.precipitation", hourly.precipitation.len()),
            ("hourly.rain", hourly.rain.len()),
            ("hourly.showers", hourly.showers.len()),
            ("hourly.snowfall", hourly.snowfall.len()),
            ("hourly.weather_code", hourly.weather_code.len()),
            ("hourly.wind_speed_10m", hourly.wind_speed_10m.len()),
            ("hourly.wind_direction_10m", hourly.wind_direction_10m.len()),
            ("hourly.uv_index", hourly.uv_index.len()),
        ] {
            require_len(field, len, needed_hours)?;
        }

        let days = (0..FORECAST_DAYS)
            .map(|d| DailyForecastItem {
                id: 0,
                metadata_id: 0,
                date: daily.time[d].clone(),
                weather_code: int(daily.weather_code[d]),
                temperature_max: daily.temperature_2m_max[d],
                temperature_min: daily.temperature_2m_min[d],
                uv_index_max: daily.uv_index_max[d],
                precipitation_sum: daily.precipitation_sum[d],
                rain_sum: daily.rain_sum[d],
                precipitation_probability_max: int(daily.precipitation_probability_max[d]),
                wind_direction_dominant: int(daily.wind_direction_10m_dominant[d]),
            })
            .collect();

        let hours = (0..FORECAST_DAYS)
            .map(|d| {
                (d * HOURS_PER_DAY..(d + 1) * HOURS_PER_DAY)
                    .map(|i| HourlyForecastItem {
                        id: 0,
                        day_id: 0,
                        time: hourly.time[i].clone(),
                        temperature: hourly.temperature_2m[i],
                        relative_humidity: int(hourly.relative_humidity_2m[i]),
                        apparent_temperature: hourly.apparent_temperature[i],
                        precipitation_probability: int(hourly.precipitation_probability[i]),
                        precipitation: hourly.precipitation[i],
                        rain: hourly.rain[i],
                        showers: hourly.showers[i],
                        snowfall: hourly.snowfall[i],
                        weather_code: int(hourly.weather_code[i]),
                        wind_speed: hourly.wind_speed_10m[i],
                        wind_direction: int(hourly.wind_direction_10m[i]),
                        uv_index: hourly.uv_index[i],
                    })
                    .collect()
            })
            .collect();

        let units = self.hourly_units;
        let metadata = ForecastMetadata {
            id: 0,
            stored_at,
            location_name: location_name.to_string(),
            latitude: self.latitude,
            longitude: self.longitude,
            timezone: self.timezone,
            timezone_abbreviation: self.timezone_abbreviation,
            units: MeasurementUnits {
                temperature: units.temperature_2m,
                relative_humidity: units.relative_humidity_2m,
                apparent_temperature: units.apparent_temperature,
                precipitation_probability: units.precipitation_probability,
                precipitation: units.precipitation,
                rain: units.rain,
                showers: units.showers,
                snowfall: units.snowfall,
                weather_code: units.weather_code,
                wind_speed: units.wind_speed_10m,
                wind_direction: units.wind_direction_10m,
                uv_index: units.uv_index,
            },
        };

        Ok(ForecastHierarchy {
            metadata,
            days,
            hours,
        })
    }
}

/// JSON fixtures shared by unit and integration tests
#[doc(hidden)]
pub mod fixtures {
    use serde_json::{json, Value};

    /// A current-conditions payload as Open-Meteo returns it
    pub fn current_json(temperature: f64) -> Value {
        json!({
            "latitude": 61.5,
            "longitude": 23.75,
            "generationtime_ms": 0.092,
            "utc_offset_seconds": 10800,
            "timezone": "Europe/Helsinki",
            "timezone_abbreviation": "EEST",
            "elevation": 112.0,
            "current_units": {
                "time": "iso8601",
                "interval": "seconds",
                "temperature_2m": "°C",
                "relative_humidity_2m": "%",
                "apparent_temperature": "°C",
                "precipitation": "mm",
                "rain": "mm",
                "showers": "mm",
                "snowfall": "cm",
                "weather_code": "wmo code",
                "wind_speed_10m": "m/s",
                "wind_direction_10m": "°",
                "wind_gusts_10m": "m/s"
            },
            "current": {
                "time": "2024-05-21T00:30",
                "interval": 900,
                "temperature_2m": temperature,
                "relative_humidity_2m": 83,
                "apparent_temperature": temperature - 1.5,
                "precipitation": 0.0,
                "rain": 0.0,
                "showers": 0.0,
                "snowfall": 0.0,
                "weather_code": 1,
                "wind_speed_10m": 3.4,
                "wind_direction_10m": 225,
                "wind_gusts_10m": 6.7
            }
        })
    }

    /// A 7-day forecast payload with 168 hourly entries starting 2024-05-21
    pub fn forecast_json(base_temperature: f64) -> Value {
        let dates: Vec<String> = (0..7).map(|d| format!("2024-05-{:02}", 21 + d)).collect();
        let times: Vec<String> = (0..168)
            .map(|h| format!("2024-05-{:02}T{:02}:00", 21 + h / 24, h % 24))
            .collect();
        let temps: Vec<f64> = (0..168).map(|h| base_temperature + (h % 24) as f64 * 0.5).collect();
        let codes: Vec<i64> = (0..168).map(|h| if h % 24 < 12 { 0 } else { 61 }).collect();

        json!({
            "latitude": 61.5,
            "longitude": 23.75,
            "generationtime_ms": 0.3,
            "utc_offset_seconds": 10800,
            "timezone": "Europe/Helsinki",
            "timezone_abbreviation": "EEST",
            "elevation": 112.0,
            "hourly_units": {
                "time": "iso8601",
                "temperature_2m": "°C",
                "relative_humidity_2m": "%",
                "apparent_temperature": "°C",
                "precipitation_probability": "%",
                "precipitation": "mm",
                "rain": "mm",
                "showers": "mm",
                "snowfall": "cm",
                "weather_code": "wmo code",
                "wind_speed_10m": "m/s",
                "wind_direction_10m": "°",
                "uv_index": ""
            },
            "hourly": {
                "time": times,
                "temperature_2m": temps,
                "relative_humidity_2m": vec![70; 168],
                "apparent_temperature": temps,
                "precipitation_probability": vec![20; 168],
                "precipitation": vec![0.1; 168],
                "rain": vec![0.1; 168],
                "showers": vec![0.0; 168],
                "snowfall": vec![0.0; 168],
                "weather_code": codes,
                "wind_speed_10m": vec![4.2; 168],
                "wind_direction_10m": vec![180; 168],
                "uv_index": vec![1.5; 168]
            },
            "daily_units": {
                "time": "iso8601",
                "weather_code": "wmo code",
                "temperature_2m_max": "°C",
                "temperature_2m_min": "°C",
                "uv_index_max": "",
                "precipitation_sum": "mm",
                "rain_sum": "mm",
                "precipitation_probability_max": "%",
                "wind_direction_10m_dominant": "°"
            },
            "daily": {
                "time": dates,
                "weather_code": [0, 1, 2, 3, 61, 71, 95],
                "temperature_2m_max": vec![base_temperature + 11.5; 7],
                "temperature_2m_min": vec![base_temperature; 7],
                "uv_index_max": vec![4.5; 7],
                "precipitation_sum": vec![2.4; 7],
                "rain_sum": vec![2.4; 7],
                "precipitation_probability_max": vec![40; 7],
                "wind_direction_10m_dominant": vec![200; 7]
            }
        })
    }
}
