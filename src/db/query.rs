//! SQL console and saved queries.
//!
//! The console passes SQL straight to the engine and reports its errors
//! verbatim. [`QueryMode::ReadOnly`] restricts it to a single SELECT.

use super::Database;
use super::schema::SAVED_QUERIES_TABLE;
use crate::error::{Error, Result};
use crate::types::SavedQuery;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info};

/// Statements that modify data or settings.
const FORBIDDEN_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER", "TRUNCATE", "REPLACE", "UPSERT",
    "MERGE", "GRANT", "REVOKE", "ATTACH", "DETACH", "VACUUM", "REINDEX", "ANALYZE", "PRAGMA",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryMode {
    /// Any SQL, including modifying and multi-statement scripts.
    #[default]
    Any,
    /// A single SELECT (or WITH ... SELECT).
    ReadOnly,
}

/// Columns and rows returned by a statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    /// Rows changed by a statement that returns no columns.
    pub rows_affected: usize,
    /// More rows were available than the limit allowed.
    pub truncated: bool,
}

impl QueryResult {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Rows as objects keyed by column name.
    pub fn to_objects(&self) -> Vec<Value> {
        self.rows
            .iter()
            .map(|row| {
                let obj: serde_json::Map<String, Value> = self
                    .columns
                    .iter()
                    .zip(row.iter())
                    .map(|(col, val)| (col.clone(), val.clone()))
                    .collect();
                Value::Object(obj)
            })
            .collect()
    }
}

/// Validate that a SQL query is read-only (SELECT only).
pub fn validate_readonly_sql(sql: &str) -> Result<()> {
    let normalized = sql.trim().to_uppercase();
    let first_word = normalized.split_whitespace().next().unwrap_or("");

    if first_word != "SELECT" && first_word != "WITH" {
        let shown: String = first_word.chars().take(20).collect();
        return Err(Error::invalid_input(
            "sql",
            format!("Only SELECT queries are allowed. Got: {}", shown),
        ));
    }

    if sql.trim().trim_end_matches(';').contains(';') {
        return Err(Error::invalid_input(
            "sql",
            "Multiple SQL statements are not allowed",
        ));
    }

    for forbidden in FORBIDDEN_KEYWORDS {
        // word boundary so DELETED_AT and friends pass
        let pattern = format!(r"\b{}\b", forbidden);
        if let Ok(re) = regex_lite::Regex::new(&pattern)
            && re.is_match(&normalized)
        {
            return Err(Error::invalid_input(
                "sql",
                format!("{} statements are not allowed", forbidden),
            ));
        }
    }

    Ok(())
}

fn value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => json!(i),
        ValueRef::Real(f) => json!(f),
        ValueRef::Text(s) => json!(String::from_utf8_lossy(s).to_string()),
        ValueRef::Blob(b) => json!(base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            b
        )),
    }
}

fn run_statement(conn: &Connection, sql: &str, limit: Option<usize>) -> Result<QueryResult> {
    let mut stmt = match conn.prepare(sql) {
        Ok(stmt) => stmt,
        Err(rusqlite::Error::MultipleStatement) => {
            conn.execute_batch(sql)?;
            return Ok(QueryResult::default());
        }
        Err(e) => return Err(e.into()),
    };

    let column_count = stmt.column_count();
    if column_count == 0 {
        let rows_affected = stmt.execute([])?;
        return Ok(QueryResult {
            rows_affected,
            ..QueryResult::default()
        });
    }

    let columns: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(String::from)
        .collect();
    let mut result = QueryResult {
        columns,
        ..QueryResult::default()
    };

    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        if limit.is_some_and(|max| result.rows.len() >= max) {
            result.truncated = true;
            break;
        }
        let values = (0..column_count)
            .map(|i| row.get_ref(i).map(value_to_json))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        result.rows.push(values);
    }
    Ok(result)
}

fn row_to_saved(row: &rusqlite::Row<'_>) -> rusqlite::Result<SavedQuery> {
    Ok(SavedQuery {
        id: row.get(0)?,
        name: row.get(1)?,
        sql: row.get(2)?,
        created_at: row.get(3)?,
    })
}

impl Database {
    /// Run SQL from the console, returning at most `limit` rows.
    pub fn run_query(&self, sql: &str, mode: QueryMode, limit: Option<usize>) -> Result<QueryResult> {
        if sql.trim().is_empty() {
            return Err(Error::missing_field("sql"));
        }
        if mode == QueryMode::ReadOnly {
            validate_readonly_sql(sql)?;
        }
        debug!(sql = %sql, "Running console query");
        self.with_conn(|conn| run_statement(conn, sql, limit))
    }

    /// Save a query under `name`, replacing the SQL of an existing one.
    pub fn save_query(&self, name: &str, sql: &str) -> Result<SavedQuery> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::missing_field("name"));
        }
        if sql.trim().is_empty() {
            return Err(Error::missing_field("sql"));
        }
        self.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO {} (name, sql) VALUES (?1, ?2)
                     ON CONFLICT(name) DO UPDATE SET sql = excluded.sql",
                    SAVED_QUERIES_TABLE
                ),
                params![name, sql],
            )?;
            let saved = conn.query_row(
                &format!(
                    "SELECT id, name, sql, created_at FROM {} WHERE name = ?1",
                    SAVED_QUERIES_TABLE
                ),
                params![name],
                row_to_saved,
            )?;
            info!(name = %name, "Saved query");
            Ok(saved)
        })
    }

    pub fn list_saved_queries(&self) -> Result<Vec<SavedQuery>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT id, name, sql, created_at FROM {} ORDER BY name",
                SAVED_QUERIES_TABLE
            ))?;
            let queries = stmt
                .query_map([], row_to_saved)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(queries)
        })
    }

    pub fn saved_query(&self, name: &str) -> Result<Option<SavedQuery>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    &format!(
                        "SELECT id, name, sql, created_at FROM {} WHERE name = ?1",
                        SAVED_QUERIES_TABLE
                    ),
                    params![name],
                    row_to_saved,
                )
                .optional()?)
        })
    }

    /// Delete a saved query. Returns whether it existed.
    pub fn delete_saved_query(&self, name: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                &format!("DELETE FROM {} WHERE name = ?1", SAVED_QUERIES_TABLE),
                params![name],
            )?;
            Ok(deleted > 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_readonly_select() {
        assert!(validate_readonly_sql("SELECT * FROM shumske").is_ok());
        assert!(validate_readonly_sql("  select vrsta from shumske where broj = '2';  ").is_ok());
        assert!(
            validate_readonly_sql(
                "WITH c AS (SELECT vrsta, COUNT(*) n FROM shumske GROUP BY vrsta) SELECT * FROM c"
            )
            .is_ok()
        );
    }

    #[test]
    fn test_validate_readonly_rejects_writes() {
        for sql in [
            "INSERT INTO shumske (vrsta) VALUES ('x')",
            "UPDATE shumske SET vrsta = 'x'",
            "DELETE FROM shumske",
            "DROP TABLE shumske",
            "WITH x AS (SELECT 1) DELETE FROM shumske",
        ] {
            assert!(validate_readonly_sql(sql).is_err(), "{}", sql);
        }
    }

    #[test]
    fn test_validate_readonly_rejects_multiple_statements() {
        let err = validate_readonly_sql("SELECT 1; DROP TABLE shumske;").unwrap_err();
        assert!(err.to_string().contains("Multiple"));
    }

    #[test]
    fn test_validate_readonly_allows_keyword_like_columns() {
        assert!(validate_readonly_sql("SELECT deleted_at, created_by FROM t").is_ok());
    }

    #[test]
    fn test_value_to_json() {
        assert_eq!(value_to_json(ValueRef::Null), Value::Null);
        assert_eq!(value_to_json(ValueRef::Integer(4)), json!(4));
        assert_eq!(value_to_json(ValueRef::Text(b"Parus")), json!("Parus"));
        assert_eq!(value_to_json(ValueRef::Blob(&[1, 2, 3])), json!("AQID"));
    }
}
