//! Cache-or-fetch synchronization repository
//!
//! For every data kind the repository decides whether the cached record can
//! be served or a fresh copy must be fetched. A fetch is triggered when any of
//! the following holds:
//!
//! - nothing is cached for the requested key
//! - the cached record is older than the kind's threshold
//! - the requested location differs from the last successful fetch
//! - the active settings differ from those of the last successful fetch
//!
//! Whatever happens, callers receive the value re-read from the store, never
//! the network payload.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use super::channels::SyncChannels;
use super::staleness::{format_stored_at, is_stale};
use super::SyncError;
use crate::cache::ForecastStore;
use crate::config::SyncConfig;
use crate::data::{
    Coordinates, CurrentWeatherSnapshot, ForecastSource, ForecastView, GeocodingEntry,
    GeocodingResult, Settings,
};

/// Where a returned value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServedFrom {
    /// Fetched, committed and read back
    Network,
    /// Cached record was fresh for the same location and settings
    Cache,
    /// The fetch failed; the value is the last good cached one, if any
    NoUpdate,
    /// The fetch succeeded but a newer request for the same kind committed first
    Superseded,
}

/// A store-shaped value together with its provenance
#[derive(Debug, Clone, PartialEq)]
pub struct Synced<T> {
    pub value: T,
    pub source: ServedFrom,
}

impl<T> Synced<T> {
    fn new(value: T, source: ServedFrom) -> Self {
        Self { value, source }
    }
}

/// Per-kind session state: last-fetch markers and the request sequence
#[derive(Debug, Default)]
struct KindSession {
    last_location: Option<Coordinates>,
    last_settings: Option<Settings>,
    /// Highest token handed out
    issued: u64,
    /// Token of the newest request whose result was written to the store
    committed: u64,
    /// Token of the newest request whose result was published
    published: u64,
}

impl KindSession {
    fn next_token(&mut self) -> u64 {
        self.issued += 1;
        self.issued
    }

    fn needs_refresh(&self, location: Coordinates, settings: &Settings) -> bool {
        self.last_location != Some(location) || self.last_settings.as_ref() != Some(settings)
    }

    /// Records a publication, returning whether `token` is newer than the last one
    fn claim_publication(&mut self, token: u64) -> bool {
        if token > self.published {
            self.published = token;
            true
        } else {
            false
        }
    }
}

/// Synchronizes the forecast store with a remote [`ForecastSource`]
pub struct Repository {
    store: Arc<Mutex<ForecastStore>>,
    source: Arc<dyn ForecastSource>,
    config: SyncConfig,
    channels: SyncChannels,
    current: Mutex<KindSession>,
    forecast: Mutex<KindSession>,
    geocoding: Mutex<KindSession>,
}

impl Repository {
    /// Creates a repository over an opened store
    ///
    /// The settings channel is seeded from the store. Session markers start
    /// empty, so the first request of each kind always fetches.
    pub async fn new(
        store: Arc<Mutex<ForecastStore>>,
        source: Arc<dyn ForecastSource>,
        config: SyncConfig,
    ) -> Result<Self, SyncError> {
        let settings = store.lock().await.get_settings()?;
        Ok(Self {
            store,
            source,
            config,
            channels: SyncChannels::new(settings),
            current: Mutex::new(KindSession::default()),
            forecast: Mutex::new(KindSession::default()),
            geocoding: Mutex::new(KindSession::default()),
        })
    }

    /// Observer channels for every data kind
    pub fn channels(&self) -> &SyncChannels {
        &self.channels
    }

    pub fn subscribe_loading(&self) -> watch::Receiver<bool> {
        self.channels.subscribe_loading()
    }

    /// Shared handle to the underlying store
    pub fn store(&self) -> Arc<Mutex<ForecastStore>> {
        Arc::clone(&self.store)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Current settings as stored
    pub async fn settings(&self) -> Result<Settings, SyncError> {
        Ok(self.store.lock().await.get_settings()?)
    }

    /// Persist new settings and publish them
    ///
    /// Cached records stay in place; the next request of each kind sees the
    /// settings change and refetches.
    pub async fn update_settings(&self, settings: Settings) -> Result<Settings, SyncError> {
        let _loading = self.channels.begin_request();
        let stored = {
            let store = self.store.lock().await;
            store.save_settings(&settings)?;
            store.get_settings()?
        };
        info!(
            "Settings updated: {}, {}, {}",
            stored.temperature_unit.label(),
            stored.wind_speed_unit.label(),
            stored.precipitation_unit.label()
        );
        self.channels.publish_settings(stored);
        Ok(stored)
    }

    /// Cached current conditions without any fetch decision
    pub async fn load_current_weather(&self) -> Result<Option<CurrentWeatherSnapshot>, SyncError> {
        Ok(self.store.lock().await.get_current_weather()?)
    }

    /// Cached forecast for `location_name` without any fetch decision
    pub async fn load_forecast(&self, location_name: &str) -> Result<Option<ForecastView>, SyncError> {
        Ok(self.store.lock().await.get_complete_forecast(location_name)?)
    }

    /// Clear every cached record and forget the session markers
    ///
    /// Settings survive the reset.
    pub async fn reset_cache(&self) -> Result<(), SyncError> {
        let _loading = self.channels.begin_request();
        let mut current = self.current.lock().await;
        let mut forecast = self.forecast.lock().await;
        let mut geocoding = self.geocoding.lock().await;

        self.store.lock().await.reset()?;

        for session in [&mut *current, &mut *forecast, &mut *geocoding] {
            session.last_location = None;
            session.last_settings = None;
            session.committed = session.issued;
            session.published = session.issued;
        }

        self.channels.publish_current(None);
        self.channels.publish_forecast(None);
        self.channels.publish_suggestions(Vec::new());
        Ok(())
    }

    /// Serve current conditions for `location`, refetching when required
    pub async fn refresh_current_weather(
        &self,
        location: Coordinates,
    ) -> Result<Synced<Option<CurrentWeatherSnapshot>>, SyncError> {
        let _loading = self.channels.begin_request();
        let token = self.current.lock().await.next_token();

        let (settings, cached) = {
            let store = self.store.lock().await;
            (store.get_settings()?, store.get_current_weather()?)
        };

        let now = Utc::now();
        let stale = match &cached {
            None => true,
            Some(snapshot) => {
                is_stale(&snapshot.stored_at, self.config.current_weather_ttl, now)
            }
        };

        if !stale && !self.current.lock().await.needs_refresh(location, &settings) {
            debug!("Serving cached current weather");
            self.publish_current(token, cached.clone()).await;
            return Ok(Synced::new(cached, ServedFrom::Cache));
        }

        debug!(
            "Fetching current weather for {}, {}",
            location.latitude, location.longitude
        );
        let response = match self.source.fetch_current(location, &settings).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Current weather update failed: {}", e);
                let cached = self.load_current_weather().await?;
                return Ok(Synced::new(cached, ServedFrom::NoUpdate));
            }
        };

        let mut session = self.current.lock().await;
        if session.committed > token {
            drop(session);
            debug!("Discarding superseded current weather response");
            let cached = self.load_current_weather().await?;
            return Ok(Synced::new(cached, ServedFrom::Superseded));
        }

        let snapshot = response.into_snapshot(format_stored_at(Utc::now()));
        let stored = {
            let store = self.store.lock().await;
            store.save_current_weather(&snapshot)?;
            store.get_current_weather()?
        };

        session.committed = token;
        session.last_location = Some(location);
        session.last_settings = Some(settings);
        if session.claim_publication(token) {
            self.channels.publish_current(stored.clone());
        }
        drop(session);

        info!("Current weather refreshed");
        Ok(Synced::new(stored, ServedFrom::Network))
    }

    /// Serve the 7-day forecast for `location`, cached under `location_name`
    pub async fn refresh_forecast(
        &self,
        location: Coordinates,
        location_name: &str,
    ) -> Result<Synced<Option<ForecastView>>, SyncError> {
        let _loading = self.channels.begin_request();
        let token = self.forecast.lock().await.next_token();

        let (settings, cached) = {
            let store = self.store.lock().await;
            (
                store.get_settings()?,
                store.get_complete_forecast(location_name)?,
            )
        };

        let now = Utc::now();
        let stale = match &cached {
            None => true,
            Some(view) => is_stale(&view.metadata.stored_at, self.config.forecast_ttl, now),
        };

        if !stale && !self.forecast.lock().await.needs_refresh(location, &settings) {
            debug!("Serving cached forecast for {}", location_name);
            self.publish_forecast(token, cached.clone()).await;
            return Ok(Synced::new(cached, ServedFrom::Cache));
        }

        debug!("Fetching forecast for {}", location_name);
        let fetched = self
            .source
            .fetch_forecast(location, &settings)
            .await
            .and_then(|response| {
                response.into_hierarchy(location_name, format_stored_at(Utc::now()))
            });
        let hierarchy = match fetched {
            Ok(hierarchy) => hierarchy,
            Err(e) => {
                warn!("Forecast update for {} failed: {}", location_name, e);
                let cached = self.load_forecast(location_name).await?;
                return Ok(Synced::new(cached, ServedFrom::NoUpdate));
            }
        };

        let mut session = self.forecast.lock().await;
        if session.committed > token {
            drop(session);
            debug!("Discarding superseded forecast for {}", location_name);
            let cached = self.load_forecast(location_name).await?;
            return Ok(Synced::new(cached, ServedFrom::Superseded));
        }

        let stored = {
            let mut store = self.store.lock().await;
            store.save_hierarchy(&hierarchy)?;
            store.get_complete_forecast(location_name)?
        };

        session.committed = token;
        session.last_location = Some(location);
        session.last_settings = Some(settings);
        if session.claim_publication(token) {
            self.channels.publish_forecast(stored.clone());
        }
        drop(session);

        info!("Forecast for {} refreshed", location_name);
        Ok(Synced::new(stored, ServedFrom::Network))
    }

    /// Resolve place names starting with `prefix`
    ///
    /// The store is searched first; the remote endpoint is only asked when
    /// nothing is cached, and all of its results are persisted before the
    /// store is queried again.
    pub async fn search_locations(
        &self,
        prefix: &str,
    ) -> Result<Synced<Vec<GeocodingEntry>>, SyncError> {
        let _loading = self.channels.begin_request();
        let token = self.geocoding.lock().await.next_token();

        let cached = self.store.lock().await.search_geocoding_entries(prefix)?;
        if !cached.is_empty() {
            debug!("Serving {} cached places for '{}'", cached.len(), prefix);
            self.publish_suggestions(token, cached.clone()).await;
            return Ok(Synced::new(cached, ServedFrom::Cache));
        }

        let results = match self.source.search_locations(prefix).await {
            Ok(results) => results,
            Err(e) => {
                warn!("Place search for '{}' failed: {}", prefix, e);
                return Ok(Synced::new(Vec::new(), ServedFrom::NoUpdate));
            }
        };

        let entries: Vec<GeocodingEntry> = results
            .into_iter()
            .map(GeocodingResult::into_entry)
            .collect();

        let mut session = self.geocoding.lock().await;
        let found = {
            let mut store = self.store.lock().await;
            let inserted = store.upsert_geocoding_entries(&entries)?;
            debug!("Cached {} new places for '{}'", inserted, prefix);
            store.search_geocoding_entries(prefix)?
        };
        session.committed = session.committed.max(token);
        let publish = session.claim_publication(token);
        drop(session);

        if publish {
            self.channels.publish_suggestions(found.clone());
        }
        let source = if publish {
            ServedFrom::Network
        } else {
            ServedFrom::Superseded
        };
        Ok(Synced::new(found, source))
    }

    async fn publish_current(&self, token: u64, value: Option<CurrentWeatherSnapshot>) {
        if self.current.lock().await.claim_publication(token) {
            self.channels.publish_current(value);
        }
    }

    async fn publish_forecast(&self, token: u64, value: Option<ForecastView>) {
        if self.forecast.lock().await.claim_publication(token) {
            self.channels.publish_forecast(value);
        }
    }

    async fn publish_suggestions(&self, token: u64, value: Vec<GeocodingEntry>) {
        if self.geocoding.lock().await.claim_publication(token) {
            self.channels.publish_suggestions(value);
        }
    }
}
