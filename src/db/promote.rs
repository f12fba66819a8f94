//! Table promotion: create a new survey table shaped like a CSV sheet.

use super::Database;
use super::import::{ImportOptions, ImportOutcome, ImportRequest};
use super::schema;
use super::settings;
use crate::error::{Error, Result};
use crate::ident::{quote_ident, sanitize_column_name, validate_column_name, validate_table_name};
use crate::ingest::{ColumnMatch, ParsedCsv};
use crate::types::{ColumnType, TableMapping};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info};

/// A column of a promoted table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InferredColumn {
    /// Sanitized column identifier.
    pub name: String,
    /// Header as it appeared in the CSV.
    pub original: String,
    pub column_type: ColumnType,
}

/// Storage type for a sample value: a number without a fractional part is
/// INTEGER, any other number REAL, everything else (blank included) TEXT.
pub fn infer_type(sample: Option<&str>) -> ColumnType {
    let Some(value) = sample.map(str::trim).filter(|v| !v.is_empty()) else {
        return ColumnType::Text;
    };
    match value.parse::<f64>() {
        Ok(n) if n.is_finite() && n.fract() == 0.0 => ColumnType::Integer,
        Ok(n) if n.is_finite() => ColumnType::Real,
        _ => ColumnType::Text,
    }
}

/// One column per header, typed from the first data row.
///
/// Headers that sanitize to the same identifier get `_1`, `_2`, ... so every
/// column is distinct. Names SQLite reserves for the row id are suffixed too.
pub fn infer_columns(csv: &ParsedCsv) -> Vec<InferredColumn> {
    let first = csv.first_row();
    let mut taken: HashSet<String> = ["rowid", "oid", "_rowid_"]
        .into_iter()
        .map(String::from)
        .collect();

    csv.headers
        .iter()
        .enumerate()
        .map(|(idx, header)| {
            let base = sanitize_column_name(header);
            let mut name = base.clone();
            let mut suffix = 1;
            while taken.contains(&name) {
                name = format!("{}_{}", base, suffix);
                suffix += 1;
            }
            taken.insert(name.clone());

            let sample = first.and_then(|row| row.get(idx)).and_then(Option::as_deref);
            InferredColumn {
                name,
                original: header.clone(),
                column_type: infer_type(sample),
            }
        })
        .collect()
}

/// Mapping from each inferred column to itself and its original header.
pub fn default_mapping(columns: &[InferredColumn]) -> TableMapping {
    let mut mapping = TableMapping::new();
    for column in columns {
        mapping.insert(column.name.clone(), vec![column.original.clone()]);
    }
    mapping
}

impl Database {
    /// Create `table` from the CSV's headers and store its default mapping.
    ///
    /// The table is added to the main tables. Returns the generated mapping.
    pub fn create_table_from_csv(&self, table: &str, csv: &ParsedCsv) -> Result<TableMapping> {
        validate_table_name(table)?;
        if csv.headers.is_empty() {
            return Err(Error::invalid_input("headers", "CSV has no columns"));
        }
        for header in &csv.headers {
            validate_column_name(header)?;
        }

        let columns = infer_columns(csv);
        let mapping = default_mapping(&columns);
        let definitions: Vec<String> = columns
            .iter()
            .map(|c| format!("{} {}", quote_ident(&c.name), c.column_type))
            .collect();
        let create = format!("CREATE TABLE {} ({})", quote_ident(table), definitions.join(", "));

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if schema::table_exists(&tx, table)? {
                return Err(Error::TableExists(table.to_string()));
            }
            debug!(sql = %create, "Creating promoted table");
            tx.execute_batch(&create)?;

            let mut stored = settings::read_settings_for_update(&tx)?;
            stored.mappings.insert(table.to_string(), mapping.clone());
            if !stored.main_tables.iter().any(|t| t == table) {
                stored.main_tables.push(table.to_string());
            }
            settings::write_settings(&tx, &stored)?;
            tx.commit()?;

            info!(table = %table, columns = columns.len(), "Created table from CSV");
            Ok(())
        })?;

        Ok(mapping)
    }

    /// Create `table` from the CSV, then import the CSV into it using the
    /// freshly generated mapping.
    ///
    /// The new table is committed before the import starts, so it remains
    /// if the import fails or is declined.
    pub fn promote_and_import<F>(
        &self,
        filename: &str,
        table: &str,
        csv: &ParsedCsv,
        options: &ImportOptions,
        confirm: F,
    ) -> Result<ImportOutcome>
    where
        F: FnMut(&ColumnMatch) -> bool,
    {
        let mapping = self.create_table_from_csv(table, csv)?;
        let request = ImportRequest::new(filename, table, csv).with_mapping(&mapping);
        self.import_csv(&request, options, confirm)
    }
}
