//! Import Transaction Manager.
//!
//! Loads a parsed CSV into a survey table in one transaction:
//! - Rejects a (filename, table) pair that was already imported, before
//!   anything is written
//! - Stages every raw row in a fresh all-TEXT backup table
//! - Reconciles the staged headers against the table's column mapping
//! - Asks for confirmation when the match quality is below the threshold
//! - Copies the matched columns into the target table and records history
//!
//! Any failure after staging rolls the whole transaction back, the backup
//! table included. The sequencing lives in [`ImportMachine`]; this module
//! only executes its effects.

use super::Database;
use super::history;
use super::schema;
use super::settings;
use crate::error::{Error, Result};
use crate::ident::{
    DEFAULT_BACKUP_PREFIX_LEN, backup_table_name, quote_ident, validate_column_name,
    validate_table_name,
};
use crate::ingest::{ColumnMatch, DEFAULT_HEADER_SCAN_LINES, ParsedCsv, read_csv, reconcile};
use crate::pipeline::{DEFAULT_QUALITY_THRESHOLD, ImportEffect, ImportEvent, ImportMachine};
use crate::types::TableMapping;
use rusqlite::{Connection, params_from_iter};
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

/// One import attempt.
#[derive(Debug, Clone, Copy)]
pub struct ImportRequest<'a> {
    /// Source file name, recorded in history and used for duplicate detection.
    pub filename: &'a str,
    pub target_table: &'a str,
    pub csv: &'a ParsedCsv,
    /// Mapping to reconcile against. `None` reads the stored mapping inside
    /// the import transaction.
    pub mapping: Option<&'a TableMapping>,
}

impl<'a> ImportRequest<'a> {
    pub fn new(filename: &'a str, target_table: &'a str, csv: &'a ParsedCsv) -> Self {
        Self {
            filename,
            target_table,
            csv,
            mapping: None,
        }
    }

    /// Reconcile against this mapping instead of the stored one.
    pub fn with_mapping(mut self, mapping: &'a TableMapping) -> Self {
        self.mapping = Some(mapping);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.filename.trim().is_empty() {
            return Err(Error::missing_field("filename"));
        }
        validate_table_name(self.target_table)?;
        if self.csv.headers.is_empty() || self.csv.is_empty() {
            return Err(Error::EmptyCsv(self.filename.to_string()));
        }
        let mut seen = HashSet::new();
        for header in &self.csv.headers {
            validate_column_name(header)?;
            if !seen.insert(header.as_str()) {
                return Err(Error::invalid_input(
                    "headers",
                    format!("Header '{}' appears more than once", header),
                ));
            }
        }
        Ok(())
    }
}

/// Options for controlling import behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportOptions {
    /// Match quality (percent) below which the import needs confirmation.
    pub quality_threshold: u8,
    /// Filename characters kept in the backup table name.
    pub backup_prefix_len: usize,
    /// Lines scanned for the header row when reading a file.
    pub header_scan_lines: usize,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            quality_threshold: DEFAULT_QUALITY_THRESHOLD,
            backup_prefix_len: DEFAULT_BACKUP_PREFIX_LEN,
            header_scan_lines: DEFAULT_HEADER_SCAN_LINES,
        }
    }
}

impl ImportOptions {
    pub fn with_threshold(mut self, quality_threshold: u8) -> Self {
        self.quality_threshold = quality_threshold;
        self
    }
}

/// Result of a committed import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportOutcome {
    pub history_id: i64,
    pub target_table: String,
    pub backup_table: String,
    pub rows_inserted: i64,
    pub column_match: ColumnMatch,
    /// The match quality was below the threshold and the caller accepted it.
    pub confirmed_low_quality: bool,
}

impl ImportOutcome {
    pub fn quality(&self) -> u8 {
        self.column_match.quality()
    }
}

/// Create the backup table and copy every parsed row into it verbatim.
fn stage_backup(conn: &Connection, csv: &ParsedCsv, backup: &str) -> Result<()> {
    let columns: Vec<String> = csv
        .headers
        .iter()
        .map(|h| format!("{} TEXT", quote_ident(h)))
        .collect();
    let create = format!("CREATE TABLE {} ({})", quote_ident(backup), columns.join(", "));
    debug!(sql = %create, "Creating backup table");
    conn.execute_batch(&create)?;

    let placeholders: Vec<String> = (1..=csv.headers.len()).map(|i| format!("?{}", i)).collect();
    let insert = format!(
        "INSERT INTO {} VALUES ({})",
        quote_ident(backup),
        placeholders.join(", ")
    );
    let mut stmt = conn.prepare(&insert)?;
    for row in &csv.rows {
        stmt.execute(params_from_iter(row.iter()))?;
    }
    Ok(())
}

/// `INSERT INTO target (canonical...) SELECT source... FROM backup`; returns rows inserted.
fn insert_matched(
    conn: &Connection,
    table: &str,
    backup: &str,
    column_match: &ColumnMatch,
) -> Result<i64> {
    let targets: Vec<String> = column_match
        .target_columns
        .iter()
        .map(|c| quote_ident(c))
        .collect();
    let sources: Vec<String> = column_match
        .source_columns
        .iter()
        .map(|c| quote_ident(c))
        .collect();
    let sql = format!(
        "INSERT INTO {} ({}) SELECT {} FROM {}",
        quote_ident(table),
        targets.join(", "),
        sources.join(", "),
        quote_ident(backup)
    );
    debug!(sql = %sql, "Copying matched columns");
    let inserted = conn.execute(&sql, [])?;
    Ok(inserted as i64)
}

/// State of one import between effects.
struct ImportRun<'a> {
    conn: &'a Connection,
    request: &'a ImportRequest<'a>,
    backup_table: String,
    column_match: ColumnMatch,
    rows_inserted: i64,
    history_id: i64,
}

impl<'a> ImportRun<'a> {
    fn new(conn: &'a Connection, request: &'a ImportRequest<'a>, options: &ImportOptions) -> Self {
        Self {
            conn,
            request,
            backup_table: backup_table_name(request.filename, options.backup_prefix_len),
            column_match: ColumnMatch::default(),
            rows_inserted: 0,
            history_id: 0,
        }
    }

    fn mapping(&self) -> Result<TableMapping> {
        if let Some(mapping) = self.request.mapping {
            return Ok(mapping.clone());
        }
        settings::read_settings(self.conn)?
            .mappings
            .remove(self.request.target_table)
            .ok_or_else(|| Error::MissingMapping(self.request.target_table.to_string()))
    }

    fn execute(&mut self, effect: ImportEffect) -> Result<ImportEvent> {
        let table = self.request.target_table;
        match effect {
            ImportEffect::StageBackup => {
                stage_backup(self.conn, self.request.csv, &self.backup_table)?;
                Ok(ImportEvent::Staged)
            }
            ImportEffect::Reconcile => {
                let mapping = self.mapping()?;
                if mapping.is_empty() {
                    return Err(Error::MissingMapping(table.to_string()));
                }
                let staged = schema::column_names(self.conn, &self.backup_table)?;
                self.column_match = reconcile(&staged, &mapping);
                if self.column_match.is_empty() {
                    return Err(Error::NoMatchedColumns(table.to_string()));
                }
                Ok(ImportEvent::Reconciled {
                    quality: self.column_match.quality(),
                })
            }
            ImportEffect::InsertRows => {
                self.rows_inserted =
                    insert_matched(self.conn, table, &self.backup_table, &self.column_match)?;
                Ok(ImportEvent::Inserted)
            }
            ImportEffect::RecordHistory => {
                self.history_id = history::insert_record(
                    self.conn,
                    self.request.filename,
                    table,
                    self.rows_inserted,
                    &self.backup_table,
                )?;
                Ok(ImportEvent::Recorded)
            }
            other => Err(Error::InvalidTransition {
                machine: "import",
                state: "driver".to_string(),
                event: format!("{:?}", other),
            }),
        }
    }

    fn into_outcome(self, confirmed_low_quality: bool) -> ImportOutcome {
        ImportOutcome {
            history_id: self.history_id,
            target_table: self.request.target_table.to_string(),
            backup_table: self.backup_table,
            rows_inserted: self.rows_inserted,
            column_match: self.column_match,
            confirmed_low_quality,
        }
    }
}

impl Database {
    /// Import a parsed CSV into an existing table.
    ///
    /// `confirm` is called only when the match quality is below
    /// `options.quality_threshold`; returning `false` aborts the import and
    /// rolls back everything staged so far.
    pub fn import_csv<F>(
        &self,
        request: &ImportRequest<'_>,
        options: &ImportOptions,
        mut confirm: F,
    ) -> Result<ImportOutcome>
    where
        F: FnMut(&ColumnMatch) -> bool,
    {
        request.validate()?;
        let table = request.target_table;

        self.with_conn_mut(|conn| {
            if !schema::table_exists(conn, table)? {
                return Err(Error::TableNotFound(table.to_string()));
            }

            let mut machine = ImportMachine::new(options.quality_threshold);
            machine.advance(ImportEvent::Begin)?;

            // No transaction is open yet: a duplicate is a plain rejection.
            let mut effect = match history::import_exists(conn, request.filename, table) {
                Ok(false) => machine.advance(ImportEvent::NoDuplicate)?,
                Ok(true) => {
                    machine.advance(ImportEvent::DuplicateFound)?;
                    info!(filename = %request.filename, table = %table, "Rejected duplicate import");
                    return Err(Error::DuplicateImport {
                        filename: request.filename.to_string(),
                        table: table.to_string(),
                    });
                }
                Err(e) => {
                    machine.advance(ImportEvent::Failed)?;
                    return Err(e);
                }
            };

            let tx = conn.transaction()?;
            let mut run = ImportRun::new(&tx, request, options);
            let mut failure: Option<Error> = None;
            let mut confirmed_low_quality = false;

            let last = loop {
                let event = match effect {
                    ImportEffect::Commit | ImportEffect::Rollback => break effect,
                    ImportEffect::RequestConfirmation => {
                        let column_match = &run.column_match;
                        warn!(
                            table = %table,
                            matched = column_match.matched(),
                            total = column_match.total,
                            quality = column_match.quality(),
                            "Low column match quality"
                        );
                        let accepted = confirm(column_match);
                        if accepted {
                            confirmed_low_quality = true;
                        } else {
                            failure = Some(Error::ImportDeclined {
                                table: table.to_string(),
                                matched: column_match.matched(),
                                total: column_match.total,
                                quality: column_match.quality(),
                            });
                        }
                        ImportEvent::Confirmed(accepted)
                    }
                    other => run.execute(other).unwrap_or_else(|e| {
                        failure = Some(e);
                        ImportEvent::Failed
                    }),
                };
                effect = machine.advance(event)?;
            };

            if last == ImportEffect::Rollback {
                drop(run);
                if let Err(e) = tx.rollback() {
                    warn!(error = %e, "Rollback failed");
                }
                let err = failure.unwrap_or_else(|| Error::InvalidTransition {
                    machine: "import",
                    state: machine.state().to_string(),
                    event: "Rollback".to_string(),
                });
                warn!(filename = %request.filename, table = %table, error = %err, "Import rolled back");
                return Err(err);
            }

            let outcome = run.into_outcome(confirmed_low_quality);
            if let Err(e) = tx.commit() {
                machine.advance(ImportEvent::Failed)?;
                return Err(e.into());
            }
            machine.advance(ImportEvent::Committed)?;

            info!(
                filename = %request.filename,
                table = %table,
                rows = outcome.rows_inserted,
                quality = outcome.quality(),
                backup = %outcome.backup_table,
                "Import committed"
            );
            Ok(outcome)
        })
    }

    /// Read, preprocess and import a CSV file. The history filename is the
    /// file's name without its directory.
    pub fn import_file<F>(
        &self,
        path: &Path,
        target_table: &str,
        options: &ImportOptions,
        confirm: F,
    ) -> Result<ImportOutcome>
    where
        F: FnMut(&ColumnMatch) -> bool,
    {
        let filename = file_name(path)?;
        let csv = read_csv(path, options.header_scan_lines)?;
        self.import_csv(&ImportRequest::new(&filename, target_table, &csv), options, confirm)
    }
}

pub(crate) fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::invalid_input("file", format!("'{}' is not a file", path.display())))
}
