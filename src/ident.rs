//! SQL identifier handling.
//!
//! Table names must be plain `[A-Za-z0-9_]+`. Column identifiers that come
//! from survey sheets keep their original spelling (spaces, diacritics,
//! slashes) and are always emitted through [`quote_ident`]. Values are never
//! interpolated; they go through parameter binding.

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicU64, Ordering};

/// Prefix of every backup table created by an import.
pub const BACKUP_TABLE_PREFIX: &str = "import_";

/// Default number of filename characters kept in a backup table name.
pub const DEFAULT_BACKUP_PREFIX_LEN: usize = 30;

static BACKUP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Check a table name against the `[A-Za-z0-9_]+` allow-list.
pub fn validate_table_name(name: &str) -> Result<&str> {
    if name.is_empty() {
        return Err(Error::missing_field("table"));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(Error::invalid_input(
            "table",
            format!(
                "Table name '{}' may only contain letters, digits and underscores",
                name
            ),
        ));
    }
    Ok(name)
}

/// Check a column identifier taken from a CSV header or a configured alias.
pub fn validate_column_name(name: &str) -> Result<&str> {
    if name.is_empty() {
        return Err(Error::invalid_input("column", "Column name must not be empty"));
    }
    if name.chars().any(char::is_control) {
        return Err(Error::invalid_input(
            "column",
            format!("Column name {:?} contains control characters", name),
        ));
    }
    Ok(name)
}

/// Quote an identifier for SQLite, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Turn a free-form header into a column identifier: trimmed, each run of
/// characters outside `[A-Za-z0-9_]` collapsed to `_`, lowercased.
pub fn sanitize_column_name(header: &str) -> String {
    let mut out = String::with_capacity(header.len());
    let mut in_run = false;
    for c in header.trim().chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c.to_ascii_lowercase());
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }
    if out.is_empty() {
        out.push('_');
    }
    out
}

/// Generate a backup table name unique within this process and across sessions:
/// `import_<filename stem>_<unix millis>_<sequence>`.
pub fn backup_table_name(filename: &str, prefix_len: usize) -> String {
    let stem: String = filename
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(prefix_len)
        .collect();
    let millis = chrono::Utc::now().timestamp_millis();
    let seq = BACKUP_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{}{}_{}_{}", BACKUP_TABLE_PREFIX, stem, millis, seq)
}
