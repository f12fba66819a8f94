//! Schema Bootstrapper.
//!
//! Brings a freshly opened database up to the layout the import pipeline
//! needs. Problems are logged and collected into a [`BootstrapReport`]
//! instead of failing the open, so a damaged file stays partially usable.

use super::defaults::SURVEY_SCHEMA;
use super::migrations::{CURRENT_CONFIG_VERSION, ConfigVersion};
use super::schema::{self, HISTORY_TABLE};
use super::settings::{self, StoredSettings};
use crate::error::Result;
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Import history table.
pub(crate) const HISTORY_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS app_import_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    filename TEXT NOT NULL,
    target_table TEXT NOT NULL,
    import_date DATETIME DEFAULT CURRENT_TIMESTAMP,
    row_count INTEGER,
    backup_table_name TEXT
);";

/// Key/value configuration store.
pub(crate) const CONFIG_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS app_config (
    key TEXT PRIMARY KEY,
    value TEXT
);";

pub(crate) const SAVED_QUERIES_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS app_saved_queries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    sql TEXT NOT NULL,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
);";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapOptions {
    /// Create the default survey tables when they are missing.
    pub seed_survey_tables: bool,
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        Self {
            seed_survey_tables: true,
        }
    }
}

/// What bootstrapping did, and what went wrong without stopping it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BootstrapReport {
    pub problems: Vec<String>,
    /// No settings document existed and one was written.
    pub seeded_defaults: bool,
    /// The history table existed without `backup_table_name` and was extended.
    pub migrated_history: bool,
    /// Version of the settings document found on open.
    pub config_version_found: Option<ConfigVersion>,
}

impl BootstrapReport {
    pub fn is_clean(&self) -> bool {
        self.problems.is_empty()
    }

    fn record<T>(&mut self, step: &str, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(step = %step, error = %e, "Bootstrap step failed");
                self.problems.push(format!("{}: {}", step, e));
                None
            }
        }
    }
}

/// Add `backup_table_name` to a history table created before backups existed.
fn ensure_backup_column(conn: &Connection) -> Result<bool> {
    let columns = schema::column_names(conn, HISTORY_TABLE)?;
    if columns.iter().any(|c| c == "backup_table_name") {
        return Ok(false);
    }
    conn.execute_batch(&format!(
        "ALTER TABLE {} ADD COLUMN backup_table_name TEXT",
        HISTORY_TABLE
    ))?;
    info!("Added backup_table_name to import history");
    Ok(true)
}

enum SeedOutcome {
    Seeded,
    Found(ConfigVersion),
}

/// Write a settings document if there is none, or upgrade an old one in place.
///
/// An unreadable document is left alone; reads fall back to defaults.
fn seed_settings(conn: &Connection, seed_survey_tables: bool) -> Result<SeedOutcome> {
    let Some(raw) = settings::read_raw(conn)? else {
        let seeded = if seed_survey_tables {
            StoredSettings::defaults()
        } else {
            StoredSettings::default()
        };
        settings::write_settings(conn, &seeded)?;
        info!("Seeded default column mappings");
        return Ok(SeedOutcome::Seeded);
    };

    match StoredSettings::decode(&raw) {
        Ok((stored, found)) => {
            if found < CURRENT_CONFIG_VERSION {
                settings::write_settings(conn, &stored)?;
                info!(from = found, to = CURRENT_CONFIG_VERSION, "Upgraded stored settings");
            }
            Ok(SeedOutcome::Found(found))
        }
        Err(reason) => Err(crate::error::Error::invalid_input(
            "settings",
            format!("stored settings are unreadable ({}); using defaults", reason),
        )),
    }
}

pub(crate) fn bootstrap(conn: &Connection, options: BootstrapOptions) -> BootstrapReport {
    let mut report = BootstrapReport::default();

    if options.seed_survey_tables {
        report.record("survey tables", conn.execute_batch(SURVEY_SCHEMA).map_err(Into::into));
    }
    report.record("history table", conn.execute_batch(HISTORY_SCHEMA).map_err(Into::into));
    if let Some(migrated) = report.record("history migration", ensure_backup_column(conn)) {
        report.migrated_history = migrated;
    }
    report.record("config table", conn.execute_batch(CONFIG_SCHEMA).map_err(Into::into));
    report.record(
        "saved queries table",
        conn.execute_batch(SAVED_QUERIES_SCHEMA).map_err(Into::into),
    );

    match report.record("settings", seed_settings(conn, options.seed_survey_tables)) {
        Some(SeedOutcome::Seeded) => report.seeded_defaults = true,
        Some(SeedOutcome::Found(version)) => report.config_version_found = Some(version),
        None => {}
    }

    debug!(problems = report.problems.len(), "Bootstrap finished");
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_database() {
        let conn = Connection::open_in_memory().unwrap();
        let report = bootstrap(&conn, BootstrapOptions::default());
        assert!(report.is_clean(), "{:?}", report.problems);
        assert!(report.seeded_defaults);
        assert!(!report.migrated_history);
        for table in ["shumske", "bregunice", "naturalist", HISTORY_TABLE] {
            assert!(schema::table_exists(&conn, table).unwrap(), "{}", table);
        }
    }

    #[test]
    fn test_bootstrap_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        bootstrap(&conn, BootstrapOptions::default());
        let report = bootstrap(&conn, BootstrapOptions::default());
        assert!(report.is_clean());
        assert!(!report.seeded_defaults);
        assert_eq!(report.config_version_found, Some(CURRENT_CONFIG_VERSION));
    }

    #[test]
    fn test_legacy_history_table_gains_backup_column() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE app_import_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                filename TEXT NOT NULL,
                target_table TEXT NOT NULL,
                import_date DATETIME DEFAULT CURRENT_TIMESTAMP,
                row_count INTEGER
            );
            INSERT INTO app_import_history (filename, target_table, row_count)
            VALUES ('old.csv', 'shumske', 4);",
        )
        .unwrap();

        let report = bootstrap(&conn, BootstrapOptions::default());
        assert!(report.is_clean());
        assert!(report.migrated_history);

        let backup: Option<String> = conn
            .query_row(
                "SELECT backup_table_name FROM app_import_history WHERE filename = 'old.csv'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(backup.is_none());
    }

    #[test]
    fn test_legacy_settings_are_upgraded_in_place() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(CONFIG_SCHEMA).unwrap();
        conn.execute(
            "INSERT INTO app_config (key, value) VALUES ('mappings', ?1)",
            [r#"{"shumske": {"vrsta": ["Vrsta"]}}"#],
        )
        .unwrap();

        let report = bootstrap(&conn, BootstrapOptions::default());
        assert_eq!(report.config_version_found, Some(1));

        let raw = settings::read_raw(&conn).unwrap().unwrap();
        assert!(raw.contains("\"version\":3"));
    }

    #[test]
    fn test_unreadable_settings_are_reported_not_raised() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(CONFIG_SCHEMA).unwrap();
        conn.execute(
            "INSERT INTO app_config (key, value) VALUES ('mappings', 'garbage')",
            [],
        )
        .unwrap();

        let report = bootstrap(&conn, BootstrapOptions::default());
        assert_eq!(report.problems.len(), 1);
        assert!(report.problems[0].starts_with("settings"));
        // the document is left as found
        assert_eq!(settings::read_raw(&conn).unwrap().as_deref(), Some("garbage"));
    }

    #[test]
    fn test_without_survey_tables() {
        let conn = Connection::open_in_memory().unwrap();
        let report = bootstrap(
            &conn,
            BootstrapOptions {
                seed_survey_tables: false,
            },
        );
        assert!(report.is_clean());
        assert!(!schema::table_exists(&conn, "shumske").unwrap());
        let stored = settings::read_settings(&conn).unwrap();
        assert!(stored.mappings.is_empty());
    }
}
