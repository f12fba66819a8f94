//! biodata: survey CSV import and reconciliation tool
//!
//! Imports field survey sheets into a SQLite working database, keeps a
//! backup of every imported batch so the import can be undone, and
//! provides a SQL console over the data.

use anyhow::{Context, Result};
use biodata_manager::cli::{self, Cli, Command, import, mappings, query};
use biodata_manager::config::{AppConfig, ConfigLoader, ConfigPaths, ENV_CONFIG_PATH};
use biodata_manager::db::Database;
use biodata_manager::format::OutputFormat;
use clap::Parser;
use std::fs::OpenOptions;
use tracing::{Level, debug, info, warn};
use tracing_subscriber::FmtSubscriber;

fn init_logging(cli: &Cli) -> Result<()> {
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    match cli.log.as_str() {
        "0" | "off" => {
            // No logging
        }
        "1" | "stdout" => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_writer(std::io::stdout)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        "2" | "stderr" => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        filename => {
            // Log to file (append mode)
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(filename)?;
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_writer(file)
                .with_ansi(false)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }
    Ok(())
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    // An explicit --config takes the place of the environment variable.
    let explicit = cli.config.clone();
    let loader = ConfigLoader::load_with(ConfigPaths::discover(), |key| {
        if key == ENV_CONFIG_PATH && explicit.is_some() {
            return explicit.clone();
        }
        std::env::var(key).ok()
    })?;
    for source in loader.sources() {
        debug!(path = %source.display(), "Loaded config");
    }

    let mut config = loader.into_config();
    if let Some(path) = &cli.database {
        config.database.path = path.clone();
    }
    config.validate()?;
    Ok(config)
}

fn open_database(config: &AppConfig) -> Result<Database> {
    let path = &config.database.path;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let db = Database::open(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    for problem in &db.bootstrap_report().problems {
        warn!(problem = %problem, "Database bootstrap problem");
    }
    Ok(db)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let config = load_config(&cli)?;
    let format: OutputFormat = cli
        .format
        .map(Into::into)
        .unwrap_or(config.output.format);

    let db = open_database(&config)?;
    info!(path = %config.database.path.display(), "Working database ready");

    match &cli.command {
        Command::Init => cli::run_init(&db),
        Command::Import(args) => import::run_import(&db, &config, args),
        Command::Undo(args) => import::run_undo(&db, args),
        Command::History => cli::run_history(&db, format),
        Command::Tables => cli::run_tables(&db, format),
        Command::DropTable(args) => cli::run_drop_table(&db, args),
        Command::Mappings(args) => mappings::run_mappings(&db, format, args),
        Command::Query(args) => query::run_query(&db, format, args),
        Command::Saved(args) => query::run_saved(&db, format, args),
        Command::SaveAs(args) => cli::run_save_as(&db, args),
    }
}
