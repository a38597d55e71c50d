//! Observe-latest channels for synchronized data
//!
//! Each data kind has exactly one current value. Subscribers hold a
//! [`watch::Receiver`] and read the most recent value; new values replace old
//! ones rather than queueing.

use std::sync::Mutex;

use tokio::sync::watch;

use crate::data::{CurrentWeatherSnapshot, ForecastView, GeocodingEntry, Settings};

/// Senders for every data kind the repository publishes
#[derive(Debug)]
pub struct SyncChannels {
    current: watch::Sender<Option<CurrentWeatherSnapshot>>,
    forecast: watch::Sender<Option<ForecastView>>,
    settings: watch::Sender<Settings>,
    suggestions: watch::Sender<Vec<GeocodingEntry>>,
    loading: watch::Sender<bool>,
    in_flight: Mutex<usize>,
}

impl SyncChannels {
    /// Creates channels seeded with the given settings and empty data
    pub fn new(settings: Settings) -> Self {
        Self {
            current: watch::Sender::new(None),
            forecast: watch::Sender::new(None),
            settings: watch::Sender::new(settings),
            suggestions: watch::Sender::new(Vec::new()),
            loading: watch::Sender::new(false),
            in_flight: Mutex::new(0),
        }
    }

    pub fn subscribe_current(&self) -> watch::Receiver<Option<CurrentWeatherSnapshot>> {
        self.current.subscribe()
    }

    pub fn subscribe_forecast(&self) -> watch::Receiver<Option<ForecastView>> {
        self.forecast.subscribe()
    }

    pub fn subscribe_settings(&self) -> watch::Receiver<Settings> {
        self.settings.subscribe()
    }

    pub fn subscribe_suggestions(&self) -> watch::Receiver<Vec<GeocodingEntry>> {
        self.suggestions.subscribe()
    }

    /// `true` while at least one request is in flight
    pub fn subscribe_loading(&self) -> watch::Receiver<bool> {
        self.loading.subscribe()
    }

    pub(crate) fn publish_current(&self, value: Option<CurrentWeatherSnapshot>) {
        self.current.send_replace(value);
    }

    pub(crate) fn publish_forecast(&self, value: Option<ForecastView>) {
        self.forecast.send_replace(value);
    }

    pub(crate) fn publish_settings(&self, value: Settings) {
        self.settings.send_replace(value);
    }

    pub(crate) fn publish_suggestions(&self, value: Vec<GeocodingEntry>) {
        self.suggestions.send_replace(value);
    }

    /// Marks a request as in flight until the returned guard is dropped
    pub(crate) fn begin_request(&self) -> LoadingGuard<'_> {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *in_flight += 1;
        if *in_flight == 1 {
            self.loading.send_replace(true);
        }
        LoadingGuard { channels: self }
    }

    fn end_request(&self) {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *in_flight = in_flight.saturating_sub(1);
        if *in_flight == 0 {
            self.loading.send_replace(false);
        }
    }
}

/// Keeps the loading flag raised for the lifetime of one request
pub(crate) struct LoadingGuard<'a> {
    channels: &'a SyncChannels,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.channels.end_request();
    }
}
