//! Schema introspection for the working database.

use super::Database;
use super::settings;
use crate::error::{Error, Result};
use crate::ident::{BACKUP_TABLE_PREFIX, quote_ident, validate_table_name};
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Import history table.
pub const HISTORY_TABLE: &str = "app_import_history";
/// Key/value configuration table.
pub const CONFIG_TABLE: &str = "app_config";
/// Saved console queries.
pub const SAVED_QUERIES_TABLE: &str = "app_saved_queries";

/// Information about a table column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default_value: Option<String>,
    pub primary_key: bool,
}

/// What a table is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    /// Survey data.
    Data,
    /// Raw rows staged by an import, kept for undo.
    Backup,
    /// Application bookkeeping (history, configuration, saved queries).
    Control,
}

impl TableKind {
    pub fn classify(name: &str) -> Self {
        if name == HISTORY_TABLE || name == CONFIG_TABLE || name == SAVED_QUERIES_TABLE {
            TableKind::Control
        } else if name.starts_with(BACKUP_TABLE_PREFIX) {
            TableKind::Backup
        } else {
            TableKind::Data
        }
    }
}

/// Summary of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSummary {
    pub name: String,
    pub kind: TableKind,
    pub row_count: i64,
}

pub(crate) fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
            params![name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Live column list of a table, in declaration order. Empty if the table does not exist.
pub(crate) fn table_columns(conn: &Connection, name: &str) -> Result<Vec<ColumnInfo>> {
    let mut stmt = conn.prepare(
        "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?1) ORDER BY cid",
    )?;
    let columns = stmt
        .query_map(params![name], |row| {
            Ok(ColumnInfo {
                name: row.get(0)?,
                data_type: row.get::<_, String>(1)?.to_uppercase(),
                nullable: row.get::<_, i32>(2)? == 0,
                default_value: row.get(3)?,
                primary_key: row.get::<_, i32>(4)? > 0,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(columns)
}

pub(crate) fn column_names(conn: &Connection, name: &str) -> Result<Vec<String>> {
    Ok(table_columns(conn, name)?
        .into_iter()
        .map(|c| c.name)
        .collect())
}

pub(crate) fn row_count(conn: &Connection, name: &str) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(name));
    Ok(conn.query_row(&sql, [], |row| row.get(0))?)
}

pub(crate) fn list_table_names(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master
         WHERE type = 'table'
         AND name NOT LIKE 'sqlite_%'
         ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(names)
}

impl Database {
    /// All user tables with their kind and row count.
    pub fn list_tables(&self) -> Result<Vec<TableSummary>> {
        self.with_conn(|conn| {
            list_table_names(conn)?
                .into_iter()
                .map(|name| {
                    let row_count = row_count(conn, &name)?;
                    Ok(TableSummary {
                        kind: TableKind::classify(&name),
                        name,
                        row_count,
                    })
                })
                .collect()
        })
    }

    pub fn table_exists(&self, name: &str) -> Result<bool> {
        self.with_conn(|conn| table_exists(conn, name))
    }

    /// Column list of a table, introspected live.
    pub fn table_columns(&self, name: &str) -> Result<Vec<ColumnInfo>> {
        validate_table_name(name)?;
        self.with_conn(|conn| {
            if !table_exists(conn, name)? {
                return Err(Error::TableNotFound(name.to_string()));
            }
            table_columns(conn, name)
        })
    }

    pub fn table_row_count(&self, name: &str) -> Result<i64> {
        validate_table_name(name)?;
        self.with_conn(|conn| {
            if !table_exists(conn, name)? {
                return Err(Error::TableNotFound(name.to_string()));
            }
            row_count(conn, name)
        })
    }

    /// Permanently drop a data table and forget its mapping.
    ///
    /// Control tables cannot be dropped. Backup tables can, which makes the
    /// corresponding import impossible to undo.
    pub fn drop_table(&self, name: &str) -> Result<()> {
        validate_table_name(name)?;
        if TableKind::classify(name) == TableKind::Control {
            return Err(Error::invalid_input(
                "table",
                format!("'{}' is an application table and cannot be dropped", name),
            ));
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if !table_exists(&tx, name)? {
                return Err(Error::TableNotFound(name.to_string()));
            }
            tx.execute_batch(&format!("DROP TABLE {}", quote_ident(name)))?;

            let mut stored = settings::read_settings_for_update(&tx)?;
            let before = stored.main_tables.len();
            stored.main_tables.retain(|t| t != name);
            let changed = stored.mappings.remove(name).is_some()
                | stored.column_roles.remove(name).is_some()
                | (stored.main_tables.len() != before);
            if changed {
                settings::write_settings(&tx, &stored)?;
            }
            tx.commit()?;

            info!(table = %name, "Dropped table");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(TableKind::classify(HISTORY_TABLE), TableKind::Control);
        assert_eq!(TableKind::classify("import_a_csv_1_0"), TableKind::Backup);
        assert_eq!(TableKind::classify("shumske"), TableKind::Data);
    }

    #[test]
    fn test_columns_of_missing_table_are_empty() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(table_columns(&conn, "nope").unwrap().is_empty());
        assert!(!table_exists(&conn, "nope").unwrap());
    }

    #[test]
    fn test_table_exists_ignores_case() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE shumske (vrsta TEXT)").unwrap();
        assert!(table_exists(&conn, "Shumske").unwrap());
        assert!(table_exists(&conn, "SHUMSKE").unwrap());
    }

    #[test]
    fn test_columns_keep_declaration_order() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (\"Tip šume \" TEXT, b INTEGER NOT NULL, a REAL)")
            .unwrap();
        let cols = table_columns(&conn, "t").unwrap();
        let names: Vec<&str> = cols.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Tip šume ", "b", "a"]);
        assert_eq!(cols[1].data_type, "INTEGER");
        assert!(!cols[1].nullable);
    }
}
