//! CLI command definitions for biodata
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.

pub mod import;
pub mod mappings;
pub mod query;

use crate::db::Database;
use crate::format::{OutputFormat, format_history_markdown, format_tables_markdown};
use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use import::{ImportArgs, UndoArgs};
use mappings::MappingsArgs;
use query::{QueryArgs, SavedArgs};
use std::io::Write;
use std::path::PathBuf;

/// Output format selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Json,
    Csv,
    Markdown,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Json => OutputFormat::Json,
            FormatArg::Csv => OutputFormat::Csv,
            FormatArg::Markdown => OutputFormat::Markdown,
        }
    }
}

/// Survey data manager: import field sheets, undo imports, query the data
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Path to database file (overrides config)
    #[arg(short, long, global = true)]
    pub database: Option<PathBuf>,

    /// Output format (overrides config)
    #[arg(short, long, value_enum, global = true)]
    pub format: Option<FormatArg>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create or upgrade the working database and report bootstrap problems
    Init,

    /// Import a CSV sheet into a survey table
    Import(ImportArgs),

    /// Undo a previous import by its history id
    Undo(UndoArgs),

    /// List import history, newest first
    History,

    /// List tables with row counts
    Tables,

    /// Permanently drop a table and forget its mapping
    DropTable(DropTableArgs),

    /// Show or edit column mappings
    Mappings(MappingsArgs),

    /// Run SQL against the working database
    Query(QueryArgs),

    /// Manage saved queries
    Saved(SavedArgs),

    /// Write a standalone copy of the database
    SaveAs(SaveAsArgs),
}

#[derive(Args, Debug)]
pub struct DropTableArgs {
    pub table: String,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Args, Debug)]
pub struct SaveAsArgs {
    /// Destination file; replaced if it exists
    #[arg(value_name = "FILE")]
    pub path: PathBuf,
}

/// Ask a yes/no question on stdin. `--yes` answers for the user.
pub fn confirm(question: &str, assume_yes: bool) -> Result<bool> {
    if assume_yes {
        return Ok(true);
    }
    print!("{} [y/N] ", question);
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

pub fn run_init(db: &Database) -> Result<()> {
    let report = db.bootstrap_report();
    if report.seeded_defaults {
        println!("Seeded default column mappings.");
    }
    if report.migrated_history {
        println!("Added backup tracking to existing import history.");
    }
    if let Some(version) = report.config_version_found {
        println!("Stored settings version: {}", version);
    }
    if report.is_clean() {
        println!("Database ready.");
    } else {
        println!("Database opened with problems:");
        for problem in &report.problems {
            println!("  - {}", problem);
        }
    }
    Ok(())
}

pub fn run_history(db: &Database, format: OutputFormat) -> Result<()> {
    let records = db.import_history()?;
    match format {
        OutputFormat::Markdown => print!("{}", format_history_markdown(&records)),
        _ => println!("{}", serde_json::to_string_pretty(&records)?),
    }
    Ok(())
}

pub fn run_tables(db: &Database, format: OutputFormat) -> Result<()> {
    let tables = db.list_tables()?;
    match format {
        OutputFormat::Markdown => print!("{}", format_tables_markdown(&tables)),
        _ => println!("{}", serde_json::to_string_pretty(&tables)?),
    }
    Ok(())
}

pub fn run_drop_table(db: &Database, args: &DropTableArgs) -> Result<()> {
    let question = format!("Permanently drop table '{}'?", args.table);
    if !confirm(&question, args.yes)? {
        println!("Cancelled.");
        return Ok(());
    }
    db.drop_table(&args.table)?;
    println!("Dropped table '{}'.", args.table);
    Ok(())
}

pub fn run_save_as(db: &Database, args: &SaveAsArgs) -> Result<()> {
    db.save_to(&args.path)?;
    println!("Saved database to {}", args.path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_global_options() {
        let cli = Cli::try_parse_from([
            "biodata", "-d", "survey.db", "--format", "json", "-v", "tables",
        ])
        .unwrap();
        assert_eq!(cli.database, Some(PathBuf::from("survey.db")));
        assert_eq!(cli.format, Some(FormatArg::Json));
        assert!(cli.verbose);
        assert_eq!(cli.log, "2");
        assert!(matches!(cli.command, Command::Tables));
    }

    #[test]
    fn test_parse_drop_table() {
        let cli = Cli::try_parse_from(["biodata", "drop-table", "obs", "--yes"]).unwrap();
        match cli.command {
            Command::DropTable(args) => {
                assert_eq!(args.table, "obs");
                assert!(args.yes);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_subcommand_is_required() {
        assert!(Cli::try_parse_from(["biodata"]).is_err());
    }

    #[test]
    fn test_confirm_assume_yes() {
        assert!(confirm("Proceed?", true).unwrap());
    }
}
