//! Mapping Store: column mappings, coordinate roles and main tables.
//!
//! Everything lives in one JSON document under the `mappings` key of the
//! configuration table, so the settings travel with the database file.
//! Reads detect and migrate older document versions; writes always emit the
//! current version and keep any top-level keys this build does not know.

use super::Database;
use super::defaults::{default_main_tables, default_mappings};
use super::migrations::{CURRENT_CONFIG_VERSION, ConfigVersion, build_default_registry};
use super::schema::{self, CONFIG_TABLE};
use crate::error::{Error, Result};
use crate::ident::{validate_column_name, validate_table_name};
use crate::types::{ColumnRoles, CoordinateColumns, MappingSet, TableMapping};
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Configuration key holding the settings document.
pub const SETTINGS_KEY: &str = "mappings";

fn current_version() -> ConfigVersion {
    CURRENT_CONFIG_VERSION
}

/// Typed form of the persisted settings document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSettings {
    #[serde(default = "current_version")]
    pub version: ConfigVersion,
    #[serde(default)]
    pub mappings: MappingSet,
    #[serde(default)]
    pub column_roles: BTreeMap<String, ColumnRoles>,
    #[serde(default)]
    pub main_tables: Vec<String>,
    /// Top-level keys owned by someone else; written back untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for StoredSettings {
    fn default() -> Self {
        Self {
            version: CURRENT_CONFIG_VERSION,
            mappings: MappingSet::new(),
            column_roles: BTreeMap::new(),
            main_tables: Vec::new(),
            extra: Map::new(),
        }
    }
}

impl StoredSettings {
    /// Built-in mappings for the default survey tables.
    pub fn defaults() -> Self {
        Self {
            mappings: default_mappings(),
            main_tables: default_main_tables(),
            ..Self::default()
        }
    }

    /// Parse a stored document of any known version.
    ///
    /// Returns the settings upgraded to the current version together with
    /// the version the document was stored in.
    pub fn decode(raw: &str) -> std::result::Result<(Self, ConfigVersion), String> {
        let (mut settings, found) = Self::decode_preserving(raw)?;
        settings.discard_unsafe_names();
        Ok((settings, found))
    }

    /// Like [`StoredSettings::decode`] but keeps entries with unsafe names,
    /// so a read-modify-write does not lose them.
    fn decode_preserving(raw: &str) -> std::result::Result<(Self, ConfigVersion), String> {
        let doc: Value = serde_json::from_str(raw).map_err(|e| e.to_string())?;
        let (doc, found) = build_default_registry()
            .upgrade(doc)
            .map_err(|e| e.to_string())?;
        let mut settings: StoredSettings =
            serde_json::from_value(doc).map_err(|e| e.to_string())?;
        settings.version = CURRENT_CONFIG_VERSION;
        Ok((settings, found))
    }

    /// Serialize as a current-version document.
    pub fn encode(&self) -> Result<String> {
        let mut current = self.clone();
        current.version = CURRENT_CONFIG_VERSION;
        Ok(serde_json::to_string(&current)?)
    }

    /// Drop entries whose table or column names would not be safe to put in SQL.
    fn discard_unsafe_names(&mut self) {
        self.mappings.retain(|table, mapping| {
            if validate_table_name(table).is_err() {
                warn!(table = %table, "Ignoring stored mapping with invalid table name");
                return false;
            }
            let unsafe_column = mapping.iter().any(|(canonical, aliases)| {
                validate_column_name(canonical).is_err()
                    || aliases.iter().any(|a| validate_column_name(a).is_err())
            });
            if unsafe_column {
                warn!(table = %table, "Ignoring stored mapping with invalid column names");
            }
            !unsafe_column
        });
        self.column_roles
            .retain(|table, _| validate_table_name(table).is_ok());
        self.main_tables
            .retain(|table| validate_table_name(table).is_ok());
    }
}

/// Raw settings document, if one was ever written.
pub(crate) fn read_raw(conn: &Connection) -> Result<Option<String>> {
    let sql = format!("SELECT value FROM {} WHERE key = ?1", CONFIG_TABLE);
    let raw = conn
        .query_row(&sql, params![SETTINGS_KEY], |row| row.get::<_, Option<String>>(0))
        .optional()?;
    Ok(raw.flatten())
}

/// Current settings. A missing or unreadable document yields the built-in defaults.
pub(crate) fn read_settings(conn: &Connection) -> Result<StoredSettings> {
    let Some(raw) = read_raw(conn)? else {
        return Ok(StoredSettings::defaults());
    };
    match StoredSettings::decode(&raw) {
        Ok((settings, _)) => Ok(settings),
        Err(reason) => {
            warn!(reason = %reason, "Stored settings are unreadable; using built-in defaults");
            Ok(StoredSettings::defaults())
        }
    }
}

/// Settings about to be modified and written back.
///
/// Unlike [`read_settings`], an unreadable document is an error: writing
/// defaults over it would erase whatever it held.
pub(crate) fn read_settings_for_update(conn: &Connection) -> Result<StoredSettings> {
    let Some(raw) = read_raw(conn)? else {
        return Ok(StoredSettings::defaults());
    };
    StoredSettings::decode_preserving(&raw)
        .map(|(settings, _)| settings)
        .map_err(Error::UnreadableSettings)
}

pub(crate) fn write_settings(conn: &Connection, settings: &StoredSettings) -> Result<()> {
    let sql = format!(
        "INSERT INTO {} (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        CONFIG_TABLE
    );
    conn.execute(&sql, params![SETTINGS_KEY, settings.encode()?])?;
    Ok(())
}

fn require_table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    if !schema::table_exists(conn, table)? {
        return Err(Error::TableNotFound(table.to_string()));
    }
    schema::column_names(conn, table)
}

impl Database {
    /// Read-modify-write of the settings document in one transaction.
    fn update_settings<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection, &mut StoredSettings) -> Result<T>,
    {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut stored = read_settings_for_update(&tx)?;
            let out = f(&tx, &mut stored)?;
            write_settings(&tx, &stored)?;
            tx.commit()?;
            Ok(out)
        })
    }

    pub fn settings(&self) -> Result<StoredSettings> {
        self.with_conn(read_settings)
    }

    /// Mappings for every table.
    pub fn mappings(&self) -> Result<MappingSet> {
        Ok(self.settings()?.mappings)
    }

    /// Mapping for one table, if one is defined.
    pub fn table_mapping(&self, table: &str) -> Result<Option<TableMapping>> {
        validate_table_name(table)?;
        Ok(self.settings()?.mappings.remove(table))
    }

    /// Replace the mapping of one table.
    ///
    /// Every canonical column must be a column of the existing table. Other
    /// tables' mappings and unrelated settings are kept.
    pub fn set_table_mapping(&self, table: &str, mapping: TableMapping) -> Result<()> {
        validate_table_name(table)?;
        if mapping.is_empty() {
            return Err(Error::invalid_input(
                "mapping",
                format!("Mapping for table '{}' has no columns", table),
            ));
        }
        for (canonical, aliases) in mapping.iter() {
            validate_column_name(canonical)?;
            for alias in aliases {
                validate_column_name(alias)?;
            }
        }

        self.update_settings(|conn, stored| {
            let columns = require_table_columns(conn, table)?;
            if let Some(unknown) = mapping
                .canonical_columns()
                .find(|c| !columns.iter().any(|col| col == c))
            {
                return Err(Error::invalid_input(
                    "mapping",
                    format!("Column '{}' does not exist in table '{}'", unknown, table),
                ));
            }
            info!(table = %table, columns = mapping.len(), "Updated column mapping");
            stored.mappings.insert(table.to_string(), mapping);
            Ok(())
        })
    }

    /// Coordinate column roles of a table (empty when never set).
    pub fn column_roles(&self, table: &str) -> Result<ColumnRoles> {
        validate_table_name(table)?;
        Ok(self
            .settings()?
            .column_roles
            .remove(table)
            .unwrap_or_default())
    }

    pub fn set_column_roles(&self, table: &str, roles: ColumnRoles) -> Result<()> {
        validate_table_name(table)?;
        self.update_settings(|conn, stored| {
            let columns = require_table_columns(conn, table)?;
            for role in [&roles.lat, &roles.lon].into_iter().flatten() {
                if !columns.iter().any(|c| c == role) {
                    return Err(Error::invalid_input(
                        "column_roles",
                        format!("Column '{}' does not exist in table '{}'", role, table),
                    ));
                }
            }
            if roles == ColumnRoles::default() {
                stored.column_roles.remove(table);
            } else {
                stored.column_roles.insert(table.to_string(), roles);
            }
            Ok(())
        })
    }

    /// Tables offered as primary import targets.
    pub fn main_tables(&self) -> Result<Vec<String>> {
        Ok(self.settings()?.main_tables)
    }

    pub fn set_main_tables(&self, tables: Vec<String>) -> Result<()> {
        for table in &tables {
            validate_table_name(table)?;
        }
        self.update_settings(|_, stored| {
            let mut unique = Vec::with_capacity(tables.len());
            for table in tables {
                if !unique.contains(&table) {
                    unique.push(table);
                }
            }
            stored.main_tables = unique;
            Ok(())
        })
    }

    /// Resolve which of `columns` hold latitude and longitude for `table`.
    pub fn locate_coordinates(&self, table: &str, columns: &[String]) -> Result<CoordinateColumns> {
        Ok(self.column_roles(table)?.locate(columns))
    }
}
