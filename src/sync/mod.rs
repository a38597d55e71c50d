//! Forecast synchronization
//!
//! Decides, per data kind, whether to serve the cached record or fetch a fresh
//! one, commits fetched data to the [`ForecastStore`](crate::cache::ForecastStore)
//! and publishes results on observe-latest channels.

mod channels;
mod repository;
mod staleness;

pub use channels::SyncChannels;
pub use repository::{Repository, ServedFrom, Synced};
pub use staleness::{format_stored_at, is_stale, parse_stored_at};

use thiserror::Error;

use crate::cache::StoreError;

/// Errors surfaced by the repository
///
/// Remote fetch failures never appear here; they degrade to
/// [`ServedFrom::NoUpdate`].
#[derive(Debug, Error)]
pub enum SyncError {
    /// The local cache could not be read or written
    #[error("Cache error: {0}")]
    Store(#[from] StoreError),
}
