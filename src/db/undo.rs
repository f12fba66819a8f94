//! Undo Engine.
//!
//! Reverses one import: deletes the rows it added, forgets its history
//! record and drops its backup table, all in one transaction. Rows are found
//! by value: a target row is removed when it equals some backup row on every
//! column pair the current mapping reconstructs. Comparison uses `IS`, so
//! fields that were missing in the CSV (NULL on both sides) still match.
//! A hand-entered row that happens to equal an imported one on all those
//! columns is removed too.

use super::Database;
use super::history;
use super::schema;
use super::settings;
use crate::error::{Error, ErrorCode, Result};
use crate::ident::quote_ident;
use crate::ingest::{ColumnMatch, reconcile};
use crate::pipeline::{UndoEffect, UndoEvent, UndoMachine};
use crate::types::ImportRecord;
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Result of a committed undo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UndoOutcome {
    pub history_id: i64,
    pub target_table: String,
    pub backup_table: String,
    pub rows_deleted: i64,
    /// Row count recorded at import time.
    pub rows_recorded: i64,
}

fn delete_matching_sql(table: &str, backup: &str, join: &ColumnMatch) -> String {
    let conditions: Vec<String> = join
        .pairs()
        .map(|(target, source)| {
            format!(
                "main_tbl.{} IS backup_tbl.{}",
                quote_ident(target),
                quote_ident(source)
            )
        })
        .collect();
    format!(
        "DELETE FROM {table} WHERE rowid IN (
            SELECT main_tbl.rowid FROM {table} AS main_tbl
            INNER JOIN {backup} AS backup_tbl ON {conditions}
        )",
        table = quote_ident(table),
        backup = quote_ident(backup),
        conditions = conditions.join(" AND ")
    )
}

/// Whether an error means a precondition does not hold, as opposed to an engine failure.
fn is_unsatisfied(err: &Error) -> bool {
    matches!(
        err.code(),
        ErrorCode::NoBackupReference
            | ErrorCode::BackupMissing
            | ErrorCode::UndoMissingMapping
            | ErrorCode::NoJoinColumns
    )
}

struct UndoRun<'a> {
    record: &'a ImportRecord,
    backup_table: String,
    join: ColumnMatch,
    rows_deleted: i64,
}

impl<'a> UndoRun<'a> {
    fn new(record: &'a ImportRecord) -> Self {
        Self {
            record,
            backup_table: String::new(),
            join: ColumnMatch::default(),
            rows_deleted: 0,
        }
    }

    /// Run one precondition check. Nothing is written.
    fn check(&mut self, conn: &Connection, effect: UndoEffect) -> Result<()> {
        let id = self.record.id;
        let table = &self.record.target_table;
        match effect {
            UndoEffect::CheckReference => {
                self.backup_table = self
                    .record
                    .backup_table_name
                    .clone()
                    .ok_or(Error::NoBackupReference(id))?;
            }
            UndoEffect::CheckBackupExists => {
                if !schema::table_exists(conn, &self.backup_table)? {
                    return Err(Error::BackupMissing {
                        id,
                        table: self.backup_table.clone(),
                    });
                }
            }
            UndoEffect::ResolveMapping => {
                let has_mapping = settings::read_settings(conn)?
                    .mappings
                    .get(table)
                    .is_some_and(|m| !m.is_empty());
                if !has_mapping {
                    return Err(Error::UndoMissingMapping {
                        id,
                        table: table.clone(),
                    });
                }
            }
            UndoEffect::ReconstructJoin => {
                let mapping = settings::read_settings(conn)?
                    .mappings
                    .remove(table)
                    .ok_or_else(|| Error::UndoMissingMapping {
                        id,
                        table: table.clone(),
                    })?;
                let staged = schema::column_names(conn, &self.backup_table)?;
                self.join = reconcile(&staged, &mapping);
                if self.join.is_empty() {
                    return Err(Error::NoJoinColumns(id));
                }
            }
            other => return Err(unexpected(other)),
        }
        Ok(())
    }

    fn execute(&mut self, conn: &Connection, effect: UndoEffect) -> Result<()> {
        match effect {
            UndoEffect::DeleteRows => {
                let sql =
                    delete_matching_sql(&self.record.target_table, &self.backup_table, &self.join);
                debug!(sql = %sql, "Deleting imported rows");
                self.rows_deleted = conn.execute(&sql, [])? as i64;
            }
            UndoEffect::DeleteHistory => {
                history::delete_record(conn, self.record.id)?;
            }
            UndoEffect::DropBackup => {
                conn.execute_batch(&format!("DROP TABLE {}", quote_ident(&self.backup_table)))?;
            }
            other => return Err(unexpected(other)),
        }
        Ok(())
    }

    fn into_outcome(self) -> UndoOutcome {
        UndoOutcome {
            history_id: self.record.id,
            target_table: self.record.target_table.clone(),
            backup_table: self.backup_table,
            rows_deleted: self.rows_deleted,
            rows_recorded: self.record.row_count,
        }
    }
}

fn unexpected(effect: UndoEffect) -> Error {
    Error::InvalidTransition {
        machine: "undo",
        state: "driver".to_string(),
        event: format!("{:?}", effect),
    }
}

impl Database {
    /// Undo the import with history id `id`.
    pub fn undo_import_by_id(&self, id: i64) -> Result<UndoOutcome> {
        let record = self.import_record(id)?;
        self.undo_import(&record)
    }

    /// Undo one import.
    ///
    /// Preconditions are checked in order and the first one that fails is
    /// reported with nothing changed.
    pub fn undo_import(&self, record: &ImportRecord) -> Result<UndoOutcome> {
        self.with_conn_mut(|conn| {
            let mut machine = UndoMachine::new();
            let mut run = UndoRun::new(record);
            let mut effect = machine.advance(UndoEvent::Begin)?;

            while machine.state().is_precondition() {
                match run.check(conn, effect) {
                    Ok(()) => effect = machine.advance(UndoEvent::Satisfied)?,
                    Err(e) => {
                        let event = if is_unsatisfied(&e) {
                            UndoEvent::Unsatisfied
                        } else {
                            UndoEvent::Failed
                        };
                        machine.advance(event)?;
                        warn!(id = record.id, error = %e, "Undo aborted");
                        return Err(e);
                    }
                }
            }

            let tx = conn.transaction()?;
            let mut failure: Option<Error> = None;
            let last = loop {
                let event = match effect {
                    UndoEffect::Commit | UndoEffect::Rollback => break effect,
                    other => match run.execute(&tx, other) {
                        Ok(()) => UndoEvent::Executed,
                        Err(e) => {
                            failure = Some(e);
                            UndoEvent::Failed
                        }
                    },
                };
                effect = machine.advance(event)?;
            };

            if last == UndoEffect::Rollback {
                if let Err(e) = tx.rollback() {
                    warn!(error = %e, "Rollback failed");
                }
                let err = failure.unwrap_or_else(|| unexpected(last));
                warn!(id = record.id, error = %err, "Undo rolled back");
                return Err(err);
            }

            if let Err(e) = tx.commit() {
                machine.advance(UndoEvent::Failed)?;
                return Err(e.into());
            }
            machine.advance(UndoEvent::Committed)?;

            let outcome = run.into_outcome();
            if outcome.rows_deleted != outcome.rows_recorded {
                warn!(
                    id = record.id,
                    deleted = outcome.rows_deleted,
                    recorded = outcome.rows_recorded,
                    "Undo removed a different number of rows than the import added"
                );
            }
            info!(
                id = record.id,
                table = %record.target_table,
                rows = outcome.rows_deleted,
                "Import undone"
            );
            Ok(outcome)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delete_sql_joins_on_every_pair() {
        let join = ColumnMatch {
            target_columns: vec!["latituda".into(), "vrsta".into()],
            source_columns: vec!["Lat".into(), "Vrsta \"x\"".into()],
            unmatched_columns: vec!["longituda".into()],
            total: 3,
        };
        let sql = delete_matching_sql("shumske", "import_a_1_0", &join);
        assert!(sql.starts_with("DELETE FROM \"shumske\" WHERE rowid IN"));
        assert!(sql.contains("INNER JOIN \"import_a_1_0\" AS backup_tbl"));
        assert!(sql.contains(
            "main_tbl.\"latituda\" IS backup_tbl.\"Lat\" AND main_tbl.\"vrsta\" IS backup_tbl.\"Vrsta \"\"x\"\"\""
        ));
    }

    #[test]
    fn test_precondition_errors_are_unsatisfied() {
        assert!(is_unsatisfied(&Error::NoBackupReference(1)));
        assert!(is_unsatisfied(&Error::NoJoinColumns(1)));
        assert!(!is_unsatisfied(&Error::HistoryNotFound(1)));
    }

    #[test]
    fn test_legacy_record_cannot_be_undone() {
        let db = Database::open_in_memory().unwrap();
        let record = ImportRecord {
            id: 9,
            filename: "old.csv".into(),
            target_table: "shumske".into(),
            import_date: None,
            row_count: 2,
            backup_table_name: None,
        };
        let err = db.undo_import(&record).unwrap_err();
        assert!(matches!(err, Error::NoBackupReference(9)));
    }
}
