//! SQLite forecast store.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use tracing::{debug, info};

use super::error::{Result, StoreError};
use super::schema;
use crate::data::{
    CurrentWeatherSnapshot, DailyForecastItem, DailyForecastView, ForecastHierarchy,
    ForecastMetadata, ForecastView, GeocodingEntry, HourlyForecastItem, MeasurementUnits,
    PrecipitationUnit, Settings, TemperatureUnit, WindSpeedUnit, FORECAST_DAYS, HOURS_PER_DAY,
};

/// Maximum number of rows returned by a geocoding prefix search
pub const GEOCODING_SEARCH_LIMIT: usize = 10;

const SETTINGS_ID: i64 = 0;
const CURRENT_WEATHER_ID: i64 = 1;

const METADATA_COLUMNS: &str = "id, stored_at, location_name, latitude, longitude, timezone,
     timezone_abbreviation, temperature_unit, relative_humidity_unit,
     apparent_temperature_unit, precipitation_probability_unit, precipitation_unit,
     rain_unit, showers_unit, snowfall_unit, weather_code_unit, wind_speed_unit,
     wind_direction_unit, uv_index_unit";

const DAILY_COLUMNS: &str = "id, metadata_id, date, weather_code, temperature_max,
     temperature_min, uv_index_max, precipitation_sum, rain_sum,
     precipitation_probability_max, wind_direction_dominant";

const HOURLY_COLUMNS: &str = "id, day_id, time, temperature, relative_humidity,
     apparent_temperature, precipitation_probability, precipitation, rain, showers,
     snowfall, weather_code, wind_speed, wind_direction, uv_index";

/// Relational cache for settings, current conditions, forecasts and place names.
pub struct ForecastStore {
    conn: Connection,
}

impl ForecastStore {
    /// Open or create a database at the given path.
    ///
    /// The default settings row is created on first open, so
    /// [`get_settings`](Self::get_settings) succeeds on any opened store.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::CreateDirectory {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }

        info!("Opening forecast cache at {}", path.display());
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        Self::from_connection(conn)
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::config::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        schema::initialize(&conn)?;
        let store = Self { conn };
        store.seed_settings()?;
        Ok(store)
    }

    fn seed_settings(&self) -> Result<()> {
        let defaults = Settings::default();
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO settings
             (id, temperature_unit, wind_speed_unit, precipitation_unit, light_mode)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                SETTINGS_ID,
                defaults.temperature_unit.label(),
                defaults.wind_speed_unit.label(),
                defaults.precipitation_unit.label(),
                defaults.light_mode,
            ],
        )?;
        if inserted > 0 {
            info!("Created default settings");
        }
        Ok(())
    }
}

// Settings operations
impl ForecastStore {
    /// Get the settings singleton.
    pub fn get_settings(&self) -> Result<Settings> {
        let row = self
            .conn
            .query_row(
                "SELECT temperature_unit, wind_speed_unit, precipitation_unit, light_mode
                 FROM settings WHERE id = ?",
                [SETTINGS_ID],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, bool>(3)?,
                    ))
                },
            )
            .optional()?;

        let (temperature, wind, precipitation, light_mode) =
            row.ok_or(StoreError::NotFound("settings"))?;

        Ok(Settings {
            temperature_unit: TemperatureUnit::from_label(&temperature)
                .ok_or_else(|| StoreError::InvalidValue(format!("temperature unit {temperature}")))?,
            wind_speed_unit: WindSpeedUnit::from_label(&wind)
                .ok_or_else(|| StoreError::InvalidValue(format!("wind speed unit {wind}")))?,
            precipitation_unit: PrecipitationUnit::from_label(&precipitation).ok_or_else(|| {
                StoreError::InvalidValue(format!("precipitation unit {precipitation}"))
            })?,
            light_mode,
        })
    }

    /// Save the settings singleton, replacing the previous values.
    pub fn save_settings(&self, settings: &Settings) -> Result<()> {
        self.conn.execute(
            "INSERT INTO settings
             (id, temperature_unit, wind_speed_unit, precipitation_unit, light_mode)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                temperature_unit = ?2,
                wind_speed_unit = ?3,
                precipitation_unit = ?4,
                light_mode = ?5",
            params![
                SETTINGS_ID,
                settings.temperature_unit.label(),
                settings.wind_speed_unit.label(),
                settings.precipitation_unit.label(),
                settings.light_mode,
            ],
        )?;
        debug!("Saved settings: {:?}", settings);
        Ok(())
    }
}

// Current weather operations
impl ForecastStore {
    /// Get the cached current conditions, `None` if nothing was ever stored.
    pub fn get_current_weather(&self) -> Result<Option<CurrentWeatherSnapshot>> {
        let snapshot = self
            .conn
            .query_row(
                "SELECT stored_at, time, interval, temperature, relative_humidity,
                 apparent_temperature, precipitation, rain, showers, snowfall, weather_code,
                 wind_speed, wind_direction, wind_gusts, timezone, timezone_abbreviation,
                 elevation
                 FROM current_weather WHERE id = ?",
                [CURRENT_WEATHER_ID],
                |row| {
                    Ok(CurrentWeatherSnapshot {
                        stored_at: row.get(0)?,
                        time: row.get(1)?,
                        interval: row.get(2)?,
                        temperature: row.get(3)?,
                        relative_humidity: row.get(4)?,
                        apparent_temperature: row.get(5)?,
                        precipitation: row.get(6)?,
                        rain: row.get(7)?,
                        showers: row.get(8)?,
                        snowfall: row.get(9)?,
                        weather_code: row.get(10)?,
                        wind_speed: row.get(11)?,
                        wind_direction: row.get(12)?,
                        wind_gusts: row.get(13)?,
                        timezone: row.get(14)?,
                        timezone_abbreviation: row.get(15)?,
                        elevation: row.get(16)?,
                    })
                },
            )
            .optional()?;

        Ok(snapshot)
    }

    /// Replace the cached current conditions.
    pub fn save_current_weather(&self, snapshot: &CurrentWeatherSnapshot) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO current_weather (id, stored_at, time, interval, temperature,
             relative_humidity, apparent_temperature, precipitation, rain, showers, snowfall,
             weather_code, wind_speed, wind_direction, wind_gusts, timezone,
             timezone_abbreviation, elevation)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
            params![
                CURRENT_WEATHER_ID,
                snapshot.stored_at,
                snapshot.time,
                snapshot.interval,
                snapshot.temperature,
                snapshot.relative_humidity,
                snapshot.apparent_temperature,
                snapshot.precipitation,
                snapshot.rain,
                snapshot.showers,
                snapshot.snowfall,
                snapshot.weather_code,
                snapshot.wind_speed,
                snapshot.wind_direction,
                snapshot.wind_gusts,
                snapshot.timezone,
                snapshot.timezone_abbreviation,
                snapshot.elevation,
            ],
        )?;
        debug!("Saved current weather stored at {}", snapshot.stored_at);
        Ok(())
    }
}

// Forecast hierarchy operations
impl ForecastStore {
    /// Save a complete forecast hierarchy, replacing any previous one for the
    /// same location name.
    ///
    /// Runs in one transaction: the old metadata row is deleted (its days and
    /// hours cascade), the new metadata row is inserted and its id captured,
    /// then each day is inserted and its id stamped into that day's hours.
    /// Returns the new metadata id.
    pub fn save_forecast_hierarchy(
        &mut self,
        metadata: &ForecastMetadata,
        days: &[DailyForecastItem],
        hours: &[Vec<HourlyForecastItem>],
    ) -> Result<i64> {
        check_hierarchy_shape(days, hours)?;

        let tx = self.conn.transaction()?;

        let replaced = tx.execute(
            "DELETE FROM forecast_metadata WHERE location_name = ?",
            [&metadata.location_name],
        )?;

        let metadata_id = insert_metadata(&tx, metadata)?;

        for (day, day_hours) in days.iter().zip(hours) {
            let day_id = insert_day(&tx, metadata_id, day)?;
            insert_hours(&tx, day_id, day_hours)?;
        }

        tx.commit()?;

        info!(
            "Stored forecast for {} (metadata id {}, replaced: {})",
            metadata.location_name,
            metadata_id,
            replaced > 0
        );
        Ok(metadata_id)
    }

    /// Convenience wrapper for [`save_forecast_hierarchy`](Self::save_forecast_hierarchy).
    pub fn save_hierarchy(&mut self, hierarchy: &ForecastHierarchy) -> Result<i64> {
        self.save_forecast_hierarchy(&hierarchy.metadata, &hierarchy.days, &hierarchy.hours)
    }

    /// Read back a complete forecast: metadata, days and hours in stored order.
    pub fn get_complete_forecast(&self, location_name: &str) -> Result<Option<ForecastView>> {
        let metadata = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM forecast_metadata WHERE location_name = ?",
                    METADATA_COLUMNS
                ),
                [location_name],
                metadata_from_row,
            )
            .optional()?;

        let Some(metadata) = metadata else {
            return Ok(None);
        };

        let mut day_stmt = self.conn.prepare(&format!(
            "SELECT {} FROM daily_forecast WHERE metadata_id = ? ORDER BY id",
            DAILY_COLUMNS
        ))?;
        let days = day_stmt
            .query_map([metadata.id], day_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut hour_stmt = self.conn.prepare(&format!(
            "SELECT {} FROM hourly_forecast WHERE day_id = ? ORDER BY id",
            HOURLY_COLUMNS
        ))?;

        let mut views = Vec::with_capacity(days.len());
        for day in days {
            let hours = hour_stmt
                .query_map([day.id], hour_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            views.push(DailyForecastView { day, hours });
        }

        Ok(Some(ForecastView {
            metadata,
            days: views,
        }))
    }

    /// Count the day and hour rows stored for a location.
    pub fn forecast_row_counts(&self, location_name: &str) -> Result<(u64, u64)> {
        let days: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM daily_forecast d
             JOIN forecast_metadata m ON d.metadata_id = m.id
             WHERE m.location_name = ?",
            [location_name],
            |row| row.get(0),
        )?;
        let hours: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM hourly_forecast h
             JOIN daily_forecast d ON h.day_id = d.id
             JOIN forecast_metadata m ON d.metadata_id = m.id
             WHERE m.location_name = ?",
            [location_name],
            |row| row.get(0),
        )?;

        Ok((days as u64, hours as u64))
    }

    /// Names of all cached forecast locations, sorted.
    pub fn list_forecast_locations(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT location_name FROM forecast_metadata ORDER BY location_name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// Time of the first hourly row of a hierarchy.
    pub fn first_hour_time(&self, metadata_id: i64) -> Result<Option<String>> {
        let time = self
            .conn
            .query_row(
                "SELECT h.time FROM hourly_forecast h
                 JOIN daily_forecast d ON h.day_id = d.id
                 WHERE d.metadata_id = ?
                 ORDER BY h.id LIMIT 1",
                [metadata_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(time)
    }
}

// Geocoding operations
impl ForecastStore {
    /// Insert place names, ignoring names already cached. Returns how many were new.
    pub fn upsert_geocoding_entries(&mut self, entries: &[GeocodingEntry]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO geocoding (name, latitude, longitude, timezone)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for entry in entries {
                inserted += stmt.execute(params![
                    entry.name,
                    entry.latitude,
                    entry.longitude,
                    entry.timezone
                ])?;
            }
        }
        tx.commit()?;

        debug!("Cached {} new geocoding entries", inserted);
        Ok(inserted)
    }

    /// Case-sensitive prefix search on place names, sorted by name, at most 10 rows.
    pub fn search_geocoding_entries(&self, prefix: &str) -> Result<Vec<GeocodingEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, latitude, longitude, timezone FROM geocoding
             WHERE substr(name, 1, length(?1)) = ?1
             ORDER BY name LIMIT ?2",
        )?;
        let entries = stmt
            .query_map(params![prefix, GEOCODING_SEARCH_LIMIT as i64], |row| {
                Ok(GeocodingEntry {
                    name: row.get(0)?,
                    latitude: row.get(1)?,
                    longitude: row.get(2)?,
                    timezone: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(entries)
    }
}

// Maintenance
impl ForecastStore {
    /// Remove every cached record. Settings are kept.
    pub fn reset(&mut self) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM current_weather", [])?;
        tx.execute("DELETE FROM hourly_forecast", [])?;
        tx.execute("DELETE FROM daily_forecast", [])?;
        tx.execute("DELETE FROM forecast_metadata", [])?;
        tx.execute("DELETE FROM geocoding", [])?;
        tx.commit()?;

        info!("Cleared forecast cache");
        Ok(())
    }
}

fn check_hierarchy_shape(days: &[DailyForecastItem], hours: &[Vec<HourlyForecastItem>]) -> Result<()> {
    if days.len() != FORECAST_DAYS {
        return Err(StoreError::Integrity(format!(
            "expected {} days, got {}",
            FORECAST_DAYS,
            days.len()
        )));
    }
    if hours.len() != FORECAST_DAYS {
        return Err(StoreError::Integrity(format!(
            "expected hours for {} days, got {}",
            FORECAST_DAYS,
            hours.len()
        )));
    }
    if let Some((day, day_hours)) = hours
        .iter()
        .enumerate()
        .find(|(_, day_hours)| day_hours.len() != HOURS_PER_DAY)
    {
        return Err(StoreError::Integrity(format!(
            "day {} has {} hours, expected {}",
            day,
            day_hours.len(),
            HOURS_PER_DAY
        )));
    }
    Ok(())
}

fn insert_metadata(tx: &Transaction<'_>, metadata: &ForecastMetadata) -> Result<i64> {
    let units = &metadata.units;
    tx.execute(
        "INSERT INTO forecast_metadata (stored_at, location_name, latitude, longitude,
         timezone, timezone_abbreviation, temperature_unit, relative_humidity_unit,
         apparent_temperature_unit, precipitation_probability_unit, precipitation_unit,
         rain_unit, showers_unit, snowfall_unit, weather_code_unit, wind_speed_unit,
         wind_direction_unit, uv_index_unit)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
        params![
            metadata.stored_at,
            metadata.location_name,
            metadata.latitude,
            metadata.longitude,
            metadata.timezone,
            metadata.timezone_abbreviation,
            units.temperature,
            units.relative_humidity,
            units.apparent_temperature,
            units.precipitation_probability,
            units.precipitation,
            units.rain,
            units.showers,
            units.snowfall,
            units.weather_code,
            units.wind_speed,
            units.wind_direction,
            units.uv_index,
        ],
    )?;
    Ok(tx.last_insert_rowid())
}

fn insert_day(tx: &Transaction<'_>, metadata_id: i64, day: &DailyForecastItem) -> Result<i64> {
    tx.execute(
        "INSERT INTO daily_forecast (metadata_id, date, weather_code, temperature_max,
         temperature_min, uv_index_max, precipitation_sum, rain_sum,
         precipitation_probability_max, wind_direction_dominant)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            metadata_id,
            day.date,
            day.weather_code,
            day.temperature_max,
            day.temperature_min,
            day.uv_index_max,
            day.precipitation_sum,
            day.rain_sum,
            day.precipitation_probability_max,
            day.wind_direction_dominant,
        ],
    )?;
    Ok(tx.last_insert_rowid())
}

fn insert_hours(tx: &Transaction<'_>, day_id: i64, hours: &[HourlyForecastItem]) -> Result<()> {
    let mut stmt = tx.prepare_cached(
        "INSERT INTO hourly_forecast (day_id, time, temperature, relative_humidity,
         apparent_temperature, precipitation_probability, precipitation, rain, showers,
         snowfall, weather_code, wind_speed, wind_direction, uv_index)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
    )?;
    for hour in hours {
        stmt.execute(params![
            day_id,
            hour.time,
            hour.temperature,
            hour.relative_humidity,
            hour.apparent_temperature,
            hour.precipitation_probability,
            hour.precipitation,
            hour.rain,
            hour.showers,
            hour.snowfall,
            hour.weather_code,
            hour.wind_speed,
            hour.wind_direction,
            hour.uv_index,
        ])?;
    }
    Ok(())
}

fn metadata_from_row(row: &Row<'_>) -> rusqlite::Result<ForecastMetadata> {
    Ok(ForecastMetadata {
        id: row.get(0)?,
        stored_at: row.get(1)?,
        location_name: row.get(2)?,
        latitude: row.get(3)?,
        longitude: row.get(4)?,
        timezone: row.get(5)?,
        timezone_abbreviation: row.get(6)?,
        units: MeasurementUnits {
            temperature: row.get(7)?,
            relative_humidity: row.get(8)?,
            apparent_temperature: row.get(9)?,
            precipitation_probability: row.get(10)?,
            precipitation: row.get(11)?,
            rain: row.get(12)?,
            showers: row.get(13)?,
            snowfall: row.get(14)?,
            weather_code: row.get(15)?,
            wind_speed: row.get(16)?,
            wind_direction: row.get(17)?,
            uv_index: row.get(18)?,
        },
    })
}

fn day_from_row(row: &Row<'_>) -> rusqlite::Result<DailyForecastItem> {
    Ok(DailyForecastItem {
        id: row.get(0)?,
        metadata_id: row.get(1)?,
        date: row.get(2)?,
        weather_code: row.get(3)?,
        temperature_max: row.get(4)?,
        temperature_min: row.get(5)?,
        uv_index_max: row.get(6)?,
        precipitation_sum: row.get(7)?,
        rain_sum: row.get(8)?,
        precipitation_probability_max: row.get(9)?,
        wind_direction_dominant: row.get(10)?,
    })
}

fn hour_from_row(row: &Row<'_>) -> rusqlite::Result<HourlyForecastItem> {
    Ok(HourlyForecastItem {
        id: row.get(0)?,
        day_id: row.get(1)?,
        time: row.get(2)?,
        temperature: row.get(3)?,
        relative_humidity: row.get(4)?,
        apparent_temperature: row.get(5)?,
        precipitation_probability: row.get(6)?,
        precipitation: row.get(7)?,
        rain: row.get(8)?,
        showers: row.get(9)?,
        snowfall: row.get(10)?,
        weather_code: row.get(11)?,
        wind_speed: row.get(12)?,
        wind_direction: row.get(13)?,
        uv_index: row.get(14)?,
    })
}
