//! meteocache - Open-Meteo weather from the command line
//!
//! Prints current conditions, 7-day forecasts and place-name matches, serving
//! them from the local cache whenever it is still fresh.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

use meteocache::cache::ForecastStore;
use meteocache::cli::{Cli, Command, LocationArgs};
use meteocache::config::{default_db_path, SyncConfig};
use meteocache::data::{
    weather_code_to_condition, Coordinates, CurrentWeatherSnapshot, ForecastView, GeocodingEntry,
    OpenMeteoClient, Settings, TemperatureUnit, WindDirection, DEFAULT_LOCATION_NAME,
};
use meteocache::sync::{Repository, ServedFrom, Synced};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let db_path: PathBuf = cli.db.clone().unwrap_or_else(default_db_path);
    let store = ForecastStore::open(&db_path)?;

    let config = SyncConfig::default();
    let client = OpenMeteoClient::new()
        .with_base_urls(config.forecast_url.clone(), config.geocoding_url.clone());
    let repository = Repository::new(Arc::new(Mutex::new(store)), Arc::new(client), config).await?;

    match cli.command {
        Command::Current { location } => {
            let settings = repository.settings().await?;
            let synced = repository
                .refresh_current_weather(resolve_location(&location))
                .await?;
            print_current(&synced, &settings);
        }
        Command::Forecast {
            location,
            name,
            place,
            hourly,
        } => {
            let (coordinates, location_name) = match place {
                Some(query) => match resolve_place(&repository, &query).await? {
                    Some(entry) => (entry.coordinates(), entry.name),
                    None => return Err(format!("No place found matching '{}'", query).into()),
                },
                None => (
                    resolve_location(&location),
                    name.unwrap_or_else(|| DEFAULT_LOCATION_NAME.to_string()),
                ),
            };

            let settings = repository.settings().await?;
            let synced = repository
                .refresh_forecast(coordinates, &location_name)
                .await?;
            print_forecast(&synced, &settings, hourly);
        }
        Command::Search { name } => {
            let synced = repository.search_locations(&name).await?;
            print_places(&synced);
        }
        Command::Settings(change) => {
            let settings = if change.is_empty() {
                repository.settings().await?
            } else {
                let current = repository.settings().await?;
                repository.update_settings(change.apply(current)).await?
            };
            print_settings(&settings);
        }
        Command::Watch { location, interval } => {
            let coordinates = resolve_location(&location);
            watch(&repository, coordinates, Duration::from_secs(interval)).await?;
        }
        Command::Reset => {
            repository.reset_cache().await?;
            println!("Cache cleared: {}", db_path.display());
        }
    }

    Ok(())
}

/// Uses the requested coordinates, or the default location when none are given
fn resolve_location(location: &LocationArgs) -> Coordinates {
    location.coordinates().unwrap_or_else(|| {
        tracing::warn!(
            "No location given, using default {}, {}",
            Coordinates::DEFAULT.latitude,
            Coordinates::DEFAULT.longitude
        );
        Coordinates::DEFAULT
    })
}

async fn resolve_place(
    repository: &Repository,
    query: &str,
) -> Result<Option<GeocodingEntry>, Box<dyn std::error::Error>> {
    let synced = repository.search_locations(query).await?;
    Ok(synced.value.into_iter().next())
}

/// Refreshes current conditions and the default forecast on every tick until Ctrl-C
async fn watch(
    repository: &Repository,
    location: Coordinates,
    every: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut interval = tokio::time::interval(every);
    let mut loading = repository.subscribe_loading();

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let settings = repository.settings().await?;
                let (current, forecast) = futures::future::join(
                    repository.refresh_current_weather(location),
                    repository.refresh_forecast(location, DEFAULT_LOCATION_NAME),
                )
                .await;
                print_current(&current?, &settings);
                if let Synced { value: Some(view), source } = forecast? {
                    if let Some(today) = view.days.first() {
                        println!(
                            "Today: {} {:.1} / {:.1}{}",
                            weather_code_to_condition(today.day.weather_code).description(),
                            today.day.temperature_min,
                            today.day.temperature_max,
                            served_note(source)
                        );
                    }
                }
            }
            changed = loading.changed() => {
                if changed.is_ok() {
                    tracing::debug!("Loading: {}", *loading.borrow_and_update());
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Stopping watch");
                return Ok(());
            }
        }
    }
}

fn served_note(source: ServedFrom) -> &'static str {
    match source {
        ServedFrom::Network => "",
        ServedFrom::Cache => " (cached)",
        ServedFrom::NoUpdate => " (cached, update failed)",
        ServedFrom::Superseded => " (newer request pending)",
    }
}

fn temperature_symbol(settings: &Settings) -> &'static str {
    match settings.temperature_unit {
        TemperatureUnit::Celsius => "°C",
        TemperatureUnit::Fahrenheit => "°F",
    }
}

fn print_current(synced: &Synced<Option<CurrentWeatherSnapshot>>, settings: &Settings) {
    let Some(snapshot) = &synced.value else {
        println!("No data yet{}", served_note(synced.source));
        return;
    };

    let symbol = temperature_symbol(settings);
    println!(
        "{} ({} {}){}",
        snapshot.time,
        snapshot.timezone,
        snapshot.timezone_abbreviation,
        served_note(synced.source)
    );
    println!(
        "  {}  {:.1}{} (feels like {:.1}{})",
        weather_code_to_condition(snapshot.weather_code).description(),
        snapshot.temperature,
        symbol,
        snapshot.apparent_temperature,
        symbol
    );
    println!("  Humidity: {}%", snapshot.relative_humidity);
    println!(
        "  Wind: {:.1} {} {} (gusts {:.1})",
        snapshot.wind_speed,
        settings.wind_speed_unit.label(),
        WindDirection::from_degrees(snapshot.wind_direction).label(),
        snapshot.wind_gusts
    );
    println!(
        "  Precipitation: {:.1} {}",
        snapshot.precipitation,
        settings.precipitation_unit.label()
    );
}

fn print_forecast(synced: &Synced<Option<ForecastView>>, settings: &Settings, hourly: bool) {
    let Some(view) = &synced.value else {
        println!("No data yet{}", served_note(synced.source));
        return;
    };

    let units = &view.metadata.units;
    println!(
        "7-day forecast for {} ({:.2}, {:.2}, {}){}",
        view.metadata.location_name,
        view.metadata.latitude,
        view.metadata.longitude,
        view.metadata.timezone,
        served_note(synced.source)
    );
    for day in &view.days {
        println!(
            "  {}  {:<16} {:>5.1} / {:>5.1}{}  {:>3}% {:>5.1} {}  UV {:.1}  {}",
            day.day.date,
            weather_code_to_condition(day.day.weather_code).description(),
            day.day.temperature_min,
            day.day.temperature_max,
            units.temperature,
            day.day.precipitation_probability_max,
            day.day.precipitation_sum,
            units.precipitation,
            day.day.uv_index_max,
            WindDirection::from_degrees(day.day.wind_direction_dominant).label()
        );
    }

    if hourly {
        if let Some(first) = view.days.first() {
            println!("Hourly, {}:", first.day.date);
            for hour in &first.hours {
                println!(
                    "  {}  {:>5.1}{}  {:>3}%  {:>4.1} {} {}",
                    hour.time,
                    hour.temperature,
                    units.temperature,
                    hour.precipitation_probability,
                    hour.wind_speed,
                    settings.wind_speed_unit.label(),
                    WindDirection::from_degrees(hour.wind_direction).label()
                );
            }
        }
    }
}

fn print_places(synced: &Synced<Vec<GeocodingEntry>>) {
    if synced.value.is_empty() {
        println!("No places found{}", served_note(synced.source));
        return;
    }
    for entry in &synced.value {
        println!(
            "{:<32} {:>8.4} {:>9.4}  {}",
            entry.name, entry.latitude, entry.longitude, entry.timezone
        );
    }
}

fn print_settings(settings: &Settings) {
    println!("Temperature:   {}", settings.temperature_unit.label());
    println!("Wind speed:    {}", settings.wind_speed_unit.label());
    println!("Precipitation: {}", settings.precipitation_unit.label());
    println!(
        "Theme:         {}",
        if settings.light_mode { "light" } else { "dark" }
    );
}
