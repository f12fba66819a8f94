//! Import history records.

use super::Database;
use super::schema::HISTORY_TABLE;
use crate::error::{Error, Result};
use crate::types::ImportRecord;
use rusqlite::{Connection, OptionalExtension, Row, params};

const RECORD_COLUMNS: &str = "id, filename, target_table, import_date, row_count, backup_table_name";

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<ImportRecord> {
    Ok(ImportRecord {
        id: row.get(0)?,
        filename: row.get(1)?,
        target_table: row.get(2)?,
        import_date: row.get(3)?,
        row_count: row.get::<_, Option<i64>>(4)?.unwrap_or(0),
        backup_table_name: row.get(5)?,
    })
}

/// Whether `filename` was already imported into `table`.
pub(crate) fn import_exists(conn: &Connection, filename: &str, table: &str) -> Result<bool> {
    let sql = format!(
        "SELECT 1 FROM {} WHERE filename = ?1 AND target_table = ?2 LIMIT 1",
        HISTORY_TABLE
    );
    let found: Option<i64> = conn
        .query_row(&sql, params![filename, table], |row| row.get(0))
        .optional()?;
    Ok(found.is_some())
}

pub(crate) fn insert_record(
    conn: &Connection,
    filename: &str,
    table: &str,
    row_count: i64,
    backup_table: &str,
) -> Result<i64> {
    let sql = format!(
        "INSERT INTO {} (filename, target_table, row_count, backup_table_name)
         VALUES (?1, ?2, ?3, ?4)",
        HISTORY_TABLE
    );
    conn.execute(&sql, params![filename, table, row_count, backup_table])?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn get_record(conn: &Connection, id: i64) -> Result<Option<ImportRecord>> {
    let sql = format!("SELECT {} FROM {} WHERE id = ?1", RECORD_COLUMNS, HISTORY_TABLE);
    Ok(conn.query_row(&sql, params![id], row_to_record).optional()?)
}

pub(crate) fn delete_record(conn: &Connection, id: i64) -> Result<usize> {
    let sql = format!("DELETE FROM {} WHERE id = ?1", HISTORY_TABLE);
    Ok(conn.execute(&sql, params![id])?)
}

impl Database {
    /// All import records, newest first.
    pub fn import_history(&self) -> Result<Vec<ImportRecord>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM {} ORDER BY import_date DESC, id DESC",
                RECORD_COLUMNS, HISTORY_TABLE
            );
            let mut stmt = conn.prepare(&sql)?;
            let records = stmt
                .query_map([], row_to_record)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(records)
        })
    }

    pub fn import_record(&self, id: i64) -> Result<ImportRecord> {
        self.with_conn(|conn| get_record(conn, id)?.ok_or(Error::HistoryNotFound(id)))
    }
}
