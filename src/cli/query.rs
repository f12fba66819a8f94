//! SQL console and saved query subcommands.

use crate::db::{Database, QueryMode};
use crate::format::{OutputFormat, format_query_result};
use anyhow::{Result, anyhow};
use clap::{Args, Subcommand};

/// Default row limit for console output.
const DEFAULT_ROW_LIMIT: usize = 100;

#[derive(Args, Debug)]
pub struct QueryArgs {
    /// SQL to run
    pub sql: String,

    /// Only allow a single SELECT
    #[arg(long)]
    pub read_only: bool,

    /// Maximum rows to print (0 for no limit)
    #[arg(long, default_value_t = DEFAULT_ROW_LIMIT)]
    pub limit: usize,
}

impl QueryArgs {
    pub fn mode(&self) -> QueryMode {
        if self.read_only {
            QueryMode::ReadOnly
        } else {
            QueryMode::Any
        }
    }

    pub fn row_limit(&self) -> Option<usize> {
        (self.limit > 0).then_some(self.limit)
    }
}

#[derive(Args, Debug)]
pub struct SavedArgs {
    #[command(subcommand)]
    pub command: SavedCommand,
}

#[derive(Subcommand, Debug)]
pub enum SavedCommand {
    /// List saved queries
    List,
    /// Save (or replace) a named query
    Save { name: String, sql: String },
    /// Run a saved query
    Run {
        name: String,
        #[arg(long, default_value_t = DEFAULT_ROW_LIMIT)]
        limit: usize,
    },
    /// Delete a saved query
    Delete { name: String },
}

pub fn run_query(db: &Database, format: OutputFormat, args: &QueryArgs) -> Result<()> {
    let result = db.run_query(&args.sql, args.mode(), args.row_limit())?;
    print!("{}", format_query_result(&result, format)?);
    Ok(())
}

pub fn run_saved(db: &Database, format: OutputFormat, args: &SavedArgs) -> Result<()> {
    match &args.command {
        SavedCommand::List => {
            let queries = db.list_saved_queries()?;
            match format {
                OutputFormat::Markdown => {
                    for query in &queries {
                        println!("- **{}**: `{}`", query.name, query.sql);
                    }
                }
                _ => println!("{}", serde_json::to_string_pretty(&queries)?),
            }
        }
        SavedCommand::Save { name, sql } => {
            let saved = db.save_query(name, sql)?;
            println!("Saved query '{}' (id {})", saved.name, saved.id);
        }
        SavedCommand::Run { name, limit } => {
            let saved = db
                .saved_query(name)?
                .ok_or_else(|| anyhow!("No saved query named '{}'", name))?;
            let limit = (*limit > 0).then_some(*limit);
            let result = db.run_query(&saved.sql, QueryMode::Any, limit)?;
            print!("{}", format_query_result(&result, format)?);
        }
        SavedCommand::Delete { name } => {
            if db.delete_saved_query(name)? {
                println!("Deleted saved query '{}'", name);
            } else {
                println!("No saved query named '{}'", name);
            }
        }
    }
    Ok(())
}
