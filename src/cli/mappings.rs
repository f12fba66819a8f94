//! Mapping subcommands: inspect and edit column aliases, coordinate roles
//! and the main table list.

use crate::db::Database;
use crate::format::{OutputFormat, format_mappings_markdown};
use crate::types::{ColumnRoles, MappingSet, parse_alias_list};
use anyhow::{Result, bail};
use clap::{Args, Subcommand};

#[derive(Args, Debug)]
pub struct MappingsArgs {
    #[command(subcommand)]
    pub command: MappingsCommand,
}

#[derive(Subcommand, Debug)]
pub enum MappingsCommand {
    /// Show mappings for one table, or all tables
    Show {
        table: Option<String>,
    },

    /// Set the aliases of one canonical column
    Set {
        table: String,
        /// Canonical (database) column name
        column: String,
        /// Comma-separated list of accepted CSV headers
        aliases: String,
    },

    /// Set which columns hold coordinates
    Roles {
        table: String,
        #[arg(long)]
        lat: Option<String>,
        #[arg(long)]
        lon: Option<String>,
    },

    /// Show or replace the main tables
    Main {
        tables: Vec<String>,
    },
}

pub fn run_mappings(db: &Database, format: OutputFormat, args: &MappingsArgs) -> Result<()> {
    match &args.command {
        MappingsCommand::Show { table } => {
            let mut mappings = db.mappings()?;
            if let Some(table) = table {
                let Some(mapping) = mappings.remove(table) else {
                    bail!("No column mapping is defined for table '{}'", table);
                };
                mappings = MappingSet::from([(table.clone(), mapping)]);
            }
            match format {
                OutputFormat::Markdown => print!("{}", format_mappings_markdown(&mappings)),
                _ => println!("{}", serde_json::to_string_pretty(&mappings)?),
            }
        }
        MappingsCommand::Set {
            table,
            column,
            aliases,
        } => {
            let mut mapping = db.table_mapping(table)?.unwrap_or_default();
            mapping.insert(column.clone(), parse_alias_list(aliases));
            db.set_table_mapping(table, mapping)?;
            println!("Updated mapping for {}.{}", table, column);
        }
        MappingsCommand::Roles { table, lat, lon } => {
            db.set_column_roles(
                table,
                ColumnRoles {
                    lat: lat.clone(),
                    lon: lon.clone(),
                },
            )?;
            println!("Updated coordinate columns for {}", table);
        }
        MappingsCommand::Main { tables } => {
            if !tables.is_empty() {
                db.set_main_tables(tables.clone())?;
            }
            println!("{}", db.main_tables()?.join(", "));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Command};
    use clap::Parser;

    #[test]
    fn test_parse_set() {
        let cli = Cli::try_parse_from([
            "biodata", "mappings", "set", "shumske", "vrsta", "Vrsta, Species",
        ])
        .unwrap();
        let Command::Mappings(MappingsArgs {
            command: MappingsCommand::Set { table, column, aliases },
        }) = cli.command
        else {
            panic!("expected mappings set");
        };
        assert_eq!(table, "shumske");
        assert_eq!(column, "vrsta");
        assert_eq!(parse_alias_list(&aliases), vec!["Vrsta", "Species"]);
    }

    #[test]
    fn test_set_merges_into_existing_mapping() {
        let db = Database::open_in_memory().unwrap();
        let args = MappingsArgs {
            command: MappingsCommand::Set {
                table: "shumske".into(),
                column: "vrsta".into(),
                aliases: "Species,Vrsta".into(),
            },
        };
        run_mappings(&db, OutputFormat::Json, &args).unwrap();

        let mapping = db.table_mapping("shumske").unwrap().unwrap();
        assert_eq!(mapping.aliases("vrsta").unwrap(), ["Species", "Vrsta", "vrsta"]);
        // other columns untouched
        assert!(mapping.aliases("latituda").is_some());
    }
}
