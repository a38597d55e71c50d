//! Integration tests for the synchronization repository
//!
//! A counting mock source stands in for Open-Meteo so every test can assert
//! exactly how many network calls a sequence of requests caused.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::StatusCode;
use tokio::sync::Mutex;

use meteocache::cache::ForecastStore;
use meteocache::config::SyncConfig;
use meteocache::data::weather::fixtures;
use meteocache::data::{
    Coordinates, CurrentWeatherResponse, ForecastResponse, ForecastSource, GeocodingResult,
    PrecipitationUnit, Settings, SourceError, TemperatureUnit, FORECAST_DAYS, HOURS_PER_DAY,
};
use meteocache::sync::{format_stored_at, Repository, ServedFrom};

const HELSINKI: Coordinates = Coordinates {
    latitude: 60.17,
    longitude: 24.94,
};

const PLACES: [&str; 12] = [
    "Tampere", "Tammela", "Taivassalo", "Tammisaari", "Tallinn", "Tartu", "Tarvasjoki", "Taipale",
    "Tanhua", "Taavetti", "Talsi", "Tapiola",
];

/// What the mock does on the next call
#[derive(Default)]
struct MockSource {
    current_calls: AtomicUsize,
    forecast_calls: AtomicUsize,
    search_calls: AtomicUsize,
    /// Fail every call with a transport error
    unreachable: AtomicBool,
    /// Return forecasts with too few hourly entries
    truncated: AtomicBool,
    /// Delay the first forecast response
    slow_first_forecast: AtomicBool,
    last_settings: std::sync::Mutex<Option<Settings>>,
}

impl MockSource {
    fn current_calls(&self) -> usize {
        self.current_calls.load(Ordering::SeqCst)
    }

    fn forecast_calls(&self) -> usize {
        self.forecast_calls.load(Ordering::SeqCst)
    }

    fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    fn check_reachable(&self) -> Result<(), SourceError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(SourceError::Status(StatusCode::SERVICE_UNAVAILABLE));
        }
        Ok(())
    }
}

#[async_trait]
impl ForecastSource for MockSource {
    async fn fetch_current(
        &self,
        _location: Coordinates,
        settings: &Settings,
    ) -> Result<CurrentWeatherResponse, SourceError> {
        let call = self.current_calls.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_settings.lock().unwrap() = Some(*settings);
        self.check_reachable()?;
        Ok(serde_json::from_value(fixtures::current_json(20.0 + call as f64))?)
    }

    async fn fetch_forecast(
        &self,
        _location: Coordinates,
        settings: &Settings,
    ) -> Result<ForecastResponse, SourceError> {
        let call = self.forecast_calls.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_settings.lock().unwrap() = Some(*settings);
        if call == 1 && self.slow_first_forecast.load(Ordering::SeqCst) {
            tokio::time::sleep(StdDuration::from_millis(200)).await;
        }
        self.check_reachable()?;

        let mut json = fixtures::forecast_json(10.0 * call as f64);
        if self.truncated.load(Ordering::SeqCst) {
            json["hourly"]["temperature_2m"] = serde_json::json!(vec![1.0; 100]);
        }
        Ok(serde_json::from_value(json)?)
    }

    async fn search_locations(&self, _name: &str) -> Result<Vec<GeocodingResult>, SourceError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;
        Ok(PLACES
            .iter()
            .enumerate()
            .map(|(i, name)| GeocodingResult {
                name: name.to_string(),
                latitude: 60.0 + i as f64 * 0.1,
                longitude: 23.0,
                timezone: Some("Europe/Helsinki".to_string()),
            })
            .collect())
    }
}

async fn setup() -> (Repository, Arc<MockSource>) {
    let store = ForecastStore::open_in_memory().unwrap();
    let source = Arc::new(MockSource::default());
    let repository = Repository::new(
        Arc::new(Mutex::new(store)),
        source.clone(),
        SyncConfig::default(),
    )
    .await
    .unwrap();
    (repository, source)
}

/// Re-stamp the cached current weather as stored `age` ago
async fn age_current_weather(repository: &Repository, age: Duration) {
    let store = repository.store();
    let store = store.lock().await;
    let mut snapshot = store.get_current_weather().unwrap().unwrap();
    snapshot.stored_at = format_stored_at(Utc::now() - age);
    store.save_current_weather(&snapshot).unwrap();
}

/// Replace the cached forecast for `name` with one stored `age` ago
async fn age_forecast(repository: &Repository, name: &str, base: f64, age: Duration) {
    let response: ForecastResponse =
        serde_json::from_value(fixtures::forecast_json(base)).unwrap();
    let hierarchy = response
        .into_hierarchy(name, format_stored_at(Utc::now() - age))
        .unwrap();
    let store = repository.store();
    store.lock().await.save_hierarchy(&hierarchy).unwrap();
}

#[tokio::test]
async fn test_same_request_within_window_makes_no_network_call() {
    let (repository, source) = setup().await;

    let first = repository
        .refresh_current_weather(Coordinates::DEFAULT)
        .await
        .unwrap();
    assert_eq!(first.source, ServedFrom::Network);
    assert_eq!(source.current_calls(), 1);

    let second = repository
        .refresh_current_weather(Coordinates::DEFAULT)
        .await
        .unwrap();
    assert_eq!(second.source, ServedFrom::Cache);
    assert_eq!(source.current_calls(), 1);
    assert_eq!(first.value, second.value);
}

#[tokio::test]
async fn test_forecast_within_window_is_served_from_cache() {
    let (repository, source) = setup().await;

    repository
        .refresh_forecast(Coordinates::DEFAULT, "Tampere")
        .await
        .unwrap();
    let again = repository
        .refresh_forecast(Coordinates::DEFAULT, "Tampere")
        .await
        .unwrap();

    assert_eq!(again.source, ServedFrom::Cache);
    assert_eq!(source.forecast_calls(), 1);
}

#[tokio::test]
async fn test_refreshed_forecast_is_read_back_from_store() {
    let (repository, _source) = setup().await;

    let synced = repository
        .refresh_forecast(Coordinates::DEFAULT, "Tampere")
        .await
        .unwrap();
    let view = synced.value.expect("forecast should be cached");

    assert!(view.metadata.id > 0);
    assert_eq!(view.days.len(), FORECAST_DAYS);
    for day in &view.days {
        assert_eq!(day.day.metadata_id, view.metadata.id);
        assert_eq!(day.hours.len(), HOURS_PER_DAY);
        assert!(day.hours.iter().all(|hour| hour.day_id == day.day.id));
        assert!(day.hours[0].time.starts_with(&day.day.date));
    }
    assert_eq!(
        repository.load_forecast("Tampere").await.unwrap(),
        Some(view)
    );
}

#[tokio::test]
async fn test_refetching_same_name_replaces_hierarchy() {
    let (repository, source) = setup().await;

    repository
        .refresh_forecast(Coordinates::DEFAULT, "Home")
        .await
        .unwrap();
    // A different location under the same name forces a second fetch
    let second = repository.refresh_forecast(HELSINKI, "Home").await.unwrap();

    assert_eq!(second.source, ServedFrom::Network);
    assert_eq!(source.forecast_calls(), 2);

    let store = repository.store();
    let store = store.lock().await;
    assert_eq!(store.forecast_row_counts("Home").unwrap(), (7, 168));
    assert_eq!(store.list_forecast_locations().unwrap(), vec!["Home".to_string()]);
    let view = store.get_complete_forecast("Home").unwrap().unwrap();
    assert!((view.days[0].day.temperature_min - 20.0).abs() < 0.01);
}

#[tokio::test]
async fn test_location_change_forces_refetch() {
    let (repository, source) = setup().await;

    repository
        .refresh_current_weather(Coordinates::DEFAULT)
        .await
        .unwrap();
    let moved = repository.refresh_current_weather(HELSINKI).await.unwrap();

    assert_eq!(moved.source, ServedFrom::Network);
    assert_eq!(source.current_calls(), 2);
}

#[tokio::test]
async fn test_settings_change_forces_refetch_inside_window() {
    let (repository, source) = setup().await;

    repository
        .refresh_current_weather(Coordinates::DEFAULT)
        .await
        .unwrap();
    repository
        .refresh_forecast(Coordinates::DEFAULT, "Tampere")
        .await
        .unwrap();

    let fahrenheit = Settings {
        temperature_unit: TemperatureUnit::Fahrenheit,
        ..Settings::default()
    };
    repository.update_settings(fahrenheit).await.unwrap();

    let current = repository
        .refresh_current_weather(Coordinates::DEFAULT)
        .await
        .unwrap();
    assert_eq!(current.source, ServedFrom::Network);
    assert_eq!(source.current_calls(), 2);

    let forecast = repository
        .refresh_forecast(Coordinates::DEFAULT, "Tampere")
        .await
        .unwrap();
    assert_eq!(forecast.source, ServedFrom::Network);
    assert_eq!(source.forecast_calls(), 2);
    assert_eq!(*source.last_settings.lock().unwrap(), Some(fahrenheit));

    // The new settings are now the markers; no further fetch
    repository
        .refresh_current_weather(Coordinates::DEFAULT)
        .await
        .unwrap();
    assert_eq!(source.current_calls(), 2);
}

#[tokio::test]
async fn test_transport_error_leaves_cache_unchanged() {
    let (repository, source) = setup().await;

    let good = repository
        .refresh_current_weather(Coordinates::DEFAULT)
        .await
        .unwrap()
        .value
        .unwrap();

    source.unreachable.store(true, Ordering::SeqCst);
    let failed = repository.refresh_current_weather(HELSINKI).await.unwrap();

    assert_eq!(failed.source, ServedFrom::NoUpdate);
    assert_eq!(failed.value.as_ref(), Some(&good));
    assert_eq!(
        repository.load_current_weather().await.unwrap().as_ref(),
        Some(&good)
    );

    // Markers were not advanced, so the retry re-evaluates and fetches again
    source.unreachable.store(false, Ordering::SeqCst);
    let retried = repository.refresh_current_weather(HELSINKI).await.unwrap();
    assert_eq!(retried.source, ServedFrom::Network);
    assert_eq!(source.current_calls(), 3);
}

#[tokio::test]
async fn test_failure_with_empty_cache_yields_no_data() {
    let (repository, source) = setup().await;
    source.unreachable.store(true, Ordering::SeqCst);

    let current = repository
        .refresh_current_weather(Coordinates::DEFAULT)
        .await
        .unwrap();
    assert_eq!(current.source, ServedFrom::NoUpdate);
    assert!(current.value.is_none());

    let forecast = repository
        .refresh_forecast(Coordinates::DEFAULT, "Tampere")
        .await
        .unwrap();
    assert_eq!(forecast.source, ServedFrom::NoUpdate);
    assert!(forecast.value.is_none());
}

#[tokio::test]
async fn test_malformed_forecast_is_not_stored() {
    let (repository, source) = setup().await;

    repository
        .refresh_forecast(Coordinates::DEFAULT, "Tampere")
        .await
        .unwrap();

    source.truncated.store(true, Ordering::SeqCst);
    let result = repository.refresh_forecast(HELSINKI, "Tampere").await.unwrap();

    assert_eq!(result.source, ServedFrom::NoUpdate);
    let view = result.value.unwrap();
    assert!((view.days[0].day.temperature_min - 10.0).abs() < 0.01);

    let store = repository.store();
    assert_eq!(
        store.lock().await.forecast_row_counts("Tampere").unwrap(),
        (7, 168)
    );
}

#[tokio::test]
async fn test_geocoding_miss_calls_remote_once_then_serves_cache() {
    let (repository, source) = setup().await;

    let first = repository.search_locations("Ta").await.unwrap();
    assert_eq!(first.source, ServedFrom::Network);
    assert_eq!(source.search_calls(), 1);
    assert_eq!(first.value.len(), 10);
    assert!(first.value.windows(2).all(|w| w[0].name <= w[1].name));
    assert_eq!(first.value[0].name, "Taavetti");

    let repeat = repository.search_locations("Ta").await.unwrap();
    assert_eq!(repeat.source, ServedFrom::Cache);
    assert_eq!(repeat.value, first.value);

    let narrower = repository.search_locations("Tam").await.unwrap();
    assert_eq!(narrower.source, ServedFrom::Cache);
    let names: Vec<&str> = narrower.value.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["Tammela", "Tammisaari", "Tampere"]);

    assert_eq!(source.search_calls(), 1);
}

#[tokio::test]
async fn test_geocoding_search_is_case_sensitive() {
    let (repository, source) = setup().await;

    repository.search_locations("Ta").await.unwrap();
    // Nothing cached starts with lower-case "ta", so the remote is asked again
    let lower = repository.search_locations("ta").await.unwrap();

    assert_eq!(source.search_calls(), 2);
    assert_eq!(lower.source, ServedFrom::Network);
    assert!(lower.value.is_empty());
}

#[tokio::test]
async fn test_geocoding_failure_yields_empty_result() {
    let (repository, source) = setup().await;
    source.unreachable.store(true, Ordering::SeqCst);

    let result = repository.search_locations("Ta").await.unwrap();

    assert_eq!(result.source, ServedFrom::NoUpdate);
    assert!(result.value.is_empty());
}

#[tokio::test]
async fn test_stale_forecast_is_refetched() {
    let (repository, source) = setup().await;
    repository
        .refresh_forecast(Coordinates::DEFAULT, "Tampere")
        .await
        .unwrap();

    age_forecast(&repository, "Tampere", 5.0, Duration::minutes(20)).await;
    let synced = repository
        .refresh_forecast(Coordinates::DEFAULT, "Tampere")
        .await
        .unwrap();

    assert_eq!(synced.source, ServedFrom::Network);
    assert_eq!(source.forecast_calls(), 2);
}

#[tokio::test]
async fn test_recent_forecast_is_served_from_cache() {
    let (repository, source) = setup().await;
    repository
        .refresh_forecast(Coordinates::DEFAULT, "Tampere")
        .await
        .unwrap();

    age_forecast(&repository, "Tampere", 5.0, Duration::minutes(10)).await;
    let synced = repository
        .refresh_forecast(Coordinates::DEFAULT, "Tampere")
        .await
        .unwrap();

    assert_eq!(synced.source, ServedFrom::Cache);
    assert_eq!(source.forecast_calls(), 1);
    let view = synced.value.unwrap();
    assert!((view.days[0].day.temperature_min - 5.0).abs() < 0.01);
}

#[tokio::test]
async fn test_current_weather_threshold_is_five_minutes() {
    let (repository, source) = setup().await;
    repository
        .refresh_current_weather(Coordinates::DEFAULT)
        .await
        .unwrap();

    age_current_weather(&repository, Duration::minutes(2)).await;
    let fresh = repository
        .refresh_current_weather(Coordinates::DEFAULT)
        .await
        .unwrap();
    assert_eq!(fresh.source, ServedFrom::Cache);
    assert_eq!(source.current_calls(), 1);

    age_current_weather(&repository, Duration::minutes(6)).await;
    let stale = repository
        .refresh_current_weather(Coordinates::DEFAULT)
        .await
        .unwrap();
    assert_eq!(stale.source, ServedFrom::Network);
    assert_eq!(source.current_calls(), 2);
}

#[tokio::test]
async fn test_new_repository_fetches_despite_fresh_cache() {
    let (repository, source) = setup().await;
    repository
        .refresh_current_weather(Coordinates::DEFAULT)
        .await
        .unwrap();

    let restarted = Repository::new(repository.store(), source.clone(), SyncConfig::default())
        .await
        .unwrap();
    let synced = restarted
        .refresh_current_weather(Coordinates::DEFAULT)
        .await
        .unwrap();

    assert_eq!(synced.source, ServedFrom::Network);
    assert_eq!(source.current_calls(), 2);
}

#[tokio::test]
async fn test_late_response_is_discarded_after_newer_commit() {
    let (repository, source) = setup().await;
    source.slow_first_forecast.store(true, Ordering::SeqCst);
    let forecast_rx = repository.channels().subscribe_forecast();

    let (first, second) = tokio::join!(
        repository.refresh_forecast(Coordinates::DEFAULT, "Tampere"),
        repository.refresh_forecast(Coordinates::DEFAULT, "Tampere"),
    );

    let first = first.unwrap();
    let second = second.unwrap();
    assert_eq!(source.forecast_calls(), 2);
    assert!(matches!(
        (first.source, second.source),
        (ServedFrom::Network, ServedFrom::Superseded) | (ServedFrom::Superseded, ServedFrom::Network)
    ));

    // The delayed first response (base 10) lost to the second one (base 20)
    let stored = repository.load_forecast("Tampere").await.unwrap().unwrap();
    assert!((stored.days[0].day.temperature_min - 20.0).abs() < 0.01);
    assert_eq!(first.value.as_ref(), Some(&stored));
    assert_eq!(second.value.as_ref(), Some(&stored));

    let published = forecast_rx.borrow().clone().unwrap();
    assert_eq!(published, stored);
}

#[tokio::test]
async fn test_channels_publish_latest_values() {
    let (repository, _source) = setup().await;
    let channels = repository.channels();
    let current_rx = channels.subscribe_current();
    let suggestions_rx = channels.subscribe_suggestions();
    let settings_rx = channels.subscribe_settings();
    let loading_rx = repository.subscribe_loading();

    let synced = repository
        .refresh_current_weather(Coordinates::DEFAULT)
        .await
        .unwrap();
    assert_eq!(*current_rx.borrow(), synced.value);

    let places = repository.search_locations("Tam").await.unwrap();
    assert_eq!(*suggestions_rx.borrow(), places.value);

    let inches = Settings {
        precipitation_unit: PrecipitationUnit::Inches,
        ..Settings::default()
    };
    repository.update_settings(inches).await.unwrap();
    assert_eq!(*settings_rx.borrow(), inches);

    assert!(!*loading_rx.borrow());
}

#[tokio::test]
async fn test_reset_cache_keeps_settings_and_refetches() {
    let (repository, source) = setup().await;
    let light = Settings {
        light_mode: true,
        ..Settings::default()
    };
    repository.update_settings(light).await.unwrap();
    repository
        .refresh_current_weather(Coordinates::DEFAULT)
        .await
        .unwrap();
    repository
        .refresh_forecast(Coordinates::DEFAULT, "Tampere")
        .await
        .unwrap();
    repository.search_locations("Ta").await.unwrap();

    repository.reset_cache().await.unwrap();

    assert!(repository.load_current_weather().await.unwrap().is_none());
    assert!(repository.load_forecast("Tampere").await.unwrap().is_none());
    assert!(repository.channels().subscribe_current().borrow().is_none());
    assert_eq!(repository.settings().await.unwrap(), light);

    repository
        .refresh_current_weather(Coordinates::DEFAULT)
        .await
        .unwrap();
    assert_eq!(source.current_calls(), 2);
}
