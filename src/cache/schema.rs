//! Database schema and migrations.

use rusqlite::Connection;

use super::error::Result;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema.
pub fn initialize(conn: &Connection) -> Result<()> {
    let version = get_schema_version(conn)?;

    if version == 0 {
        create_schema_v1(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if version < SCHEMA_VERSION {
        migrate(conn, version)?;
    }

    Ok(())
}

/// Get the current schema version, 0 for a fresh database.
fn get_schema_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 =
        conn.query_row("SELECT version FROM schema_version", [], |row| row.get(0))?;

    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?)",
        [version],
    )?;
    Ok(())
}

/// Create the initial schema (version 1).
fn create_schema_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL
        );

        -- User preferences, exactly one row
        CREATE TABLE IF NOT EXISTS settings (
            id INTEGER PRIMARY KEY CHECK (id = 0),
            temperature_unit TEXT NOT NULL,
            wind_speed_unit TEXT NOT NULL,
            precipitation_unit TEXT NOT NULL,
            light_mode INTEGER NOT NULL
        );

        -- Latest current-conditions reading, at most one row
        CREATE TABLE IF NOT EXISTS current_weather (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            stored_at TEXT NOT NULL,
            time TEXT NOT NULL,
            interval INTEGER NOT NULL,
            temperature REAL NOT NULL,
            relative_humidity INTEGER NOT NULL,
            apparent_temperature REAL NOT NULL,
            precipitation REAL NOT NULL,
            rain REAL NOT NULL,
            showers REAL NOT NULL,
            snowfall REAL NOT NULL,
            weather_code INTEGER NOT NULL,
            wind_speed REAL NOT NULL,
            wind_direction INTEGER NOT NULL,
            wind_gusts REAL NOT NULL,
            timezone TEXT NOT NULL,
            timezone_abbreviation TEXT NOT NULL,
            elevation REAL NOT NULL
        );

        -- One forecast hierarchy root per location name
        CREATE TABLE IF NOT EXISTS forecast_metadata (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            stored_at TEXT NOT NULL,
            location_name TEXT NOT NULL UNIQUE,
            latitude REAL NOT NULL,
            longitude REAL NOT NULL,
            timezone TEXT NOT NULL,
            timezone_abbreviation TEXT NOT NULL,
            temperature_unit TEXT NOT NULL,
            relative_humidity_unit TEXT NOT NULL,
            apparent_temperature_unit TEXT NOT NULL,
            precipitation_probability_unit TEXT NOT NULL,
            precipitation_unit TEXT NOT NULL,
            rain_unit TEXT NOT NULL,
            showers_unit TEXT NOT NULL,
            snowfall_unit TEXT NOT NULL,
            weather_code_unit TEXT NOT NULL,
            wind_speed_unit TEXT NOT NULL,
            wind_direction_unit TEXT NOT NULL,
            uv_index_unit TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS daily_forecast (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            metadata_id INTEGER NOT NULL
                REFERENCES forecast_metadata(id) ON DELETE CASCADE,
            date TEXT NOT NULL,
            weather_code INTEGER NOT NULL,
            temperature_max REAL NOT NULL,
            temperature_min REAL NOT NULL,
            uv_index_max REAL NOT NULL,
            precipitation_sum REAL NOT NULL,
            rain_sum REAL NOT NULL,
            precipitation_probability_max INTEGER NOT NULL,
            wind_direction_dominant INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_daily_metadata
            ON daily_forecast(metadata_id);

        CREATE TABLE IF NOT EXISTS hourly_forecast (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            day_id INTEGER NOT NULL
                REFERENCES daily_forecast(id) ON DELETE CASCADE,
            time TEXT NOT NULL,
            temperature REAL NOT NULL,
            relative_humidity INTEGER NOT NULL,
            apparent_temperature REAL NOT NULL,
            precipitation_probability INTEGER NOT NULL,
            precipitation REAL NOT NULL,
            rain REAL NOT NULL,
            showers REAL NOT NULL,
            snowfall REAL NOT NULL,
            weather_code INTEGER NOT NULL,
            wind_speed REAL NOT NULL,
            wind_direction INTEGER NOT NULL,
            uv_index REAL NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_hourly_day
            ON hourly_forecast(day_id);

        -- Place names resolved through the geocoding endpoint, never expired
        CREATE TABLE IF NOT EXISTS geocoding (
            name TEXT PRIMARY KEY,
            latitude REAL NOT NULL,
            longitude REAL NOT NULL,
            timezone TEXT NOT NULL
        );
        "#,
    )?;

    Ok(())
}

/// Run migrations from old_version to current.
fn migrate(conn: &Connection, old_version: i32) -> Result<()> {
    tracing::info!(
        "Migrating cache schema from v{} to v{}",
        old_version,
        SCHEMA_VERSION
    );
    set_schema_version(conn, SCHEMA_VERSION)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_fresh_database() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        for table in [
            "schema_version",
            "settings",
            "current_weather",
            "forecast_metadata",
            "daily_forecast",
            "hourly_forecast",
            "geocoding",
        ] {
            assert!(tables.contains(&table.to_string()), "missing table {}", table);
        }
    }

    #[test]
    fn test_schema_version_tracking() {
        let conn = Connection::open_in_memory().unwrap();

        assert_eq!(get_schema_version(&conn).unwrap(), 0);

        initialize(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);

        // Re-initializing an existing database is a no-op
        initialize(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_location_name_is_unique() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();

        let insert = "INSERT INTO forecast_metadata (stored_at, location_name, latitude, longitude,
             timezone, timezone_abbreviation, temperature_unit, relative_humidity_unit,
             apparent_temperature_unit, precipitation_probability_unit, precipitation_unit,
             rain_unit, showers_unit, snowfall_unit, weather_code_unit, wind_speed_unit,
             wind_direction_unit, uv_index_unit)
             VALUES ('', 'Oulu', 65.0, 25.5, '', '', '', '', '', '', '', '', '', '', '', '', '', '')";
        conn.execute(insert, []).unwrap();
        assert!(conn.execute(insert, []).is_err());
    }
}
