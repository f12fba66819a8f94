//! Import and undo subcommands.

use super::confirm;
use crate::config::AppConfig;
use crate::db::import::file_name;
use crate::db::{Database, ImportOutcome, ImportRequest};
use crate::ingest::{ColumnMatch, read_csv};
use anyhow::Result;
use clap::Args;
use std::cell::RefCell;
use std::path::PathBuf;

/// Arguments for the import subcommand
#[derive(Args, Debug)]
pub struct ImportArgs {
    /// CSV sheet to import
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Target table
    #[arg(short, long)]
    pub table: String,

    /// Create the table from the CSV's headers first
    ///
    /// Column types are inferred from the first data row and a mapping from
    /// each sanitized column to its original header is stored.
    #[arg(long)]
    pub new_table: bool,

    /// Accept a low match quality without asking
    #[arg(short, long)]
    pub yes: bool,

    /// Match quality threshold in percent (overrides config)
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub threshold: Option<u8>,
}

impl ImportArgs {
    /// Describe the import mode for logging
    pub fn import_mode(&self) -> &'static str {
        if self.new_table {
            "new-table"
        } else {
            "append"
        }
    }
}

/// Arguments for the undo subcommand
#[derive(Args, Debug)]
pub struct UndoArgs {
    /// History id of the import to undo
    pub id: i64,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

fn describe_match(column_match: &ColumnMatch) -> String {
    let mut text = format!(
        "Only {} of {} columns matched ({}%).",
        column_match.matched(),
        column_match.total,
        column_match.quality()
    );
    let missing: Vec<&str> = column_match.unmatched().collect();
    if !missing.is_empty() {
        text.push_str(&format!(" Unmatched: {}.", missing.join(", ")));
    }
    text
}

fn print_outcome(outcome: &ImportOutcome) {
    println!(
        "Imported {} row(s) into '{}' ({}% of columns matched). History id: {}",
        outcome.rows_inserted,
        outcome.target_table,
        outcome.quality(),
        outcome.history_id
    );
    for (target, source) in outcome.column_match.pairs() {
        println!("  {} <- {}", target, source);
    }
}

pub fn run_import(db: &Database, config: &AppConfig, args: &ImportArgs) -> Result<()> {
    let mut options = config.import.options();
    if let Some(threshold) = args.threshold {
        options.quality_threshold = threshold;
    }
    tracing::debug!(mode = args.import_mode(), file = %args.file.display(), "Starting import");

    let filename = file_name(&args.file)?;
    let csv = read_csv(&args.file, options.header_scan_lines)?;

    // The prompt cannot return an io::Error, so a failed read is kept and
    // reported after the import has rolled back.
    let prompt_error = RefCell::new(None);
    let ask = |column_match: &ColumnMatch| {
        println!("{}", describe_match(column_match));
        match confirm("Import anyway?", args.yes) {
            Ok(answer) => answer,
            Err(e) => {
                *prompt_error.borrow_mut() = Some(e);
                false
            }
        }
    };

    let result = if args.new_table {
        db.promote_and_import(&filename, &args.table, &csv, &options, ask)
    } else {
        let request = ImportRequest::new(&filename, &args.table, &csv);
        db.import_csv(&request, &options, ask)
    };

    if let Some(e) = prompt_error.into_inner() {
        return Err(e);
    }
    print_outcome(&result?);
    Ok(())
}

pub fn run_undo(db: &Database, args: &UndoArgs) -> Result<()> {
    let record = db.import_record(args.id)?;
    let question = format!(
        "Undo import {} of '{}' into '{}' ({} row(s))?",
        record.id, record.filename, record.target_table, record.row_count
    );
    if !confirm(&question, args.yes)? {
        println!("Cancelled.");
        return Ok(());
    }

    let outcome = db.undo_import(&record)?;
    println!(
        "Removed {} row(s) from '{}' and dropped backup '{}'.",
        outcome.rows_deleted, outcome.target_table, outcome.backup_table
    );
    if outcome.rows_deleted != outcome.rows_recorded {
        println!(
            "Note: the import recorded {} row(s); rows equal to imported ones are removed too.",
            outcome.rows_recorded
        );
    }
    Ok(())
}
