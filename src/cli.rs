//! Command-line interface parsing for meteocache
//!
//! This module handles parsing of CLI arguments using clap. Each subcommand
//! maps onto one repository operation; unit names are validated here so the
//! repository only ever sees typed settings.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use thiserror::Error;

use crate::data::{Coordinates, PrecipitationUnit, Settings, TemperatureUnit, WindSpeedUnit};

/// Error types for CLI argument parsing
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Invalid temperature unit: '{0}'. Valid units: celsius, fahrenheit")]
    InvalidTemperatureUnit(String),

    #[error("Invalid wind speed unit: '{0}'. Valid units: km/h, m/s, mph, kn")]
    InvalidWindSpeedUnit(String),

    #[error("Invalid precipitation unit: '{0}'. Valid units: mm, in")]
    InvalidPrecipitationUnit(String),
}

/// meteocache - Open-Meteo weather with a local forecast cache
#[derive(Parser, Debug)]
#[command(name = "meteocache")]
#[command(about = "Open-Meteo current weather and 7-day forecasts, cached locally")]
#[command(version)]
pub struct Cli {
    /// Path to the cache database
    ///
    /// Defaults to $METEOCACHE_DB, or the platform data directory
    /// (~/.local/share/meteocache/cache.db on Linux).
    #[arg(long, global = true, value_name = "PATH")]
    pub db: Option<PathBuf>,

    /// Show debug output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only show warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show current conditions, refreshing them when the cache is out of date
    Current {
        #[command(flatten)]
        location: LocationArgs,
    },

    /// Show the 7-day forecast for a location
    ///
    /// Examples:
    ///   meteocache forecast                          # Default location
    ///   meteocache forecast --place Tampere          # Resolve a place name first
    ///   meteocache forecast --lat 60.17 --lon 24.94 --name Helsinki
    Forecast {
        #[command(flatten)]
        location: LocationArgs,

        /// Name the forecast is cached under
        #[arg(long, conflicts_with = "place")]
        name: Option<String>,

        /// Look up a place by name and use its coordinates
        #[arg(long, value_name = "NAME", conflicts_with_all = ["lat", "lon"])]
        place: Option<String>,

        /// Also print hourly rows for the first day
        #[arg(long)]
        hourly: bool,
    },

    /// Search place names, served from the cache when possible
    Search {
        /// Case-sensitive name prefix
        name: String,
    },

    /// Show or change unit settings
    ///
    /// Valid units: temperature celsius|fahrenheit, wind km/h|m/s|mph|kn,
    /// precipitation mm|in
    Settings(SettingsChange),

    /// Refresh current conditions periodically until interrupted
    Watch {
        #[command(flatten)]
        location: LocationArgs,

        /// Seconds between refresh attempts
        #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..))]
        interval: u64,
    },

    /// Delete all cached weather, forecasts and place names (settings are kept)
    Reset,
}

/// Optional coordinates; both or neither must be given
#[derive(Args, Debug, Clone, Copy, Default, PartialEq)]
pub struct LocationArgs {
    /// Latitude in decimal degrees
    #[arg(long, requires = "lon", allow_negative_numbers = true)]
    pub lat: Option<f64>,

    /// Longitude in decimal degrees
    #[arg(long, requires = "lat", allow_negative_numbers = true)]
    pub lon: Option<f64>,
}

impl LocationArgs {
    /// The requested coordinates, `None` when no location was given
    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.lat, self.lon) {
            (Some(latitude), Some(longitude)) => Some(Coordinates::new(latitude, longitude)),
            _ => None,
        }
    }
}

/// Requested settings changes; unspecified fields keep their stored value
#[derive(Args, Debug, Clone, Copy, Default, PartialEq)]
pub struct SettingsChange {
    /// Temperature unit
    #[arg(long, value_parser = parse_temperature_arg)]
    pub temperature: Option<TemperatureUnit>,

    /// Wind speed unit
    #[arg(long, value_parser = parse_wind_speed_arg)]
    pub wind: Option<WindSpeedUnit>,

    /// Precipitation unit
    #[arg(long, value_parser = parse_precipitation_arg)]
    pub precipitation: Option<PrecipitationUnit>,

    /// Use the light theme
    #[arg(long)]
    pub light_mode: Option<bool>,
}

impl SettingsChange {
    /// Whether no change was requested (show only)
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Applies the requested changes on top of `settings`
    pub fn apply(&self, settings: Settings) -> Settings {
        Settings {
            temperature_unit: self.temperature.unwrap_or(settings.temperature_unit),
            wind_speed_unit: self.wind.unwrap_or(settings.wind_speed_unit),
            precipitation_unit: self.precipitation.unwrap_or(settings.precipitation_unit),
            light_mode: self.light_mode.unwrap_or(settings.light_mode),
        }
    }
}

/// Parses a temperature unit argument (case-insensitive)
pub fn parse_temperature_arg(s: &str) -> Result<TemperatureUnit, CliError> {
    let normalized = s.to_lowercase();
    match normalized.as_str() {
        "c" => Some(TemperatureUnit::Celsius),
        "f" => Some(TemperatureUnit::Fahrenheit),
        other => TemperatureUnit::from_label(other),
    }
    .ok_or_else(|| CliError::InvalidTemperatureUnit(s.to_string()))
}

/// Parses a wind speed unit argument (case-insensitive)
pub fn parse_wind_speed_arg(s: &str) -> Result<WindSpeedUnit, CliError> {
    WindSpeedUnit::from_label(&s.to_lowercase())
        .ok_or_else(|| CliError::InvalidWindSpeedUnit(s.to_string()))
}

/// Parses a precipitation unit argument (case-insensitive)
pub fn parse_precipitation_arg(s: &str) -> Result<PrecipitationUnit, CliError> {
    PrecipitationUnit::from_label(&s.to_lowercase())
        .ok_or_else(|| CliError::InvalidPrecipitationUnit(s.to_string()))
}
