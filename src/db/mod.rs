//! Database layer: the working survey database and every operation on it.

pub mod bootstrap;
pub mod defaults;
pub mod history;
pub mod import;
pub mod migrations;
pub mod promote;
pub mod query;
pub mod schema;
pub mod settings;
pub mod undo;

pub use bootstrap::{BootstrapOptions, BootstrapReport};
pub use import::{ImportOptions, ImportOutcome, ImportRequest};
pub use promote::InferredColumn;
pub use query::{QueryMode, QueryResult};
pub use schema::{ColumnInfo, TableKind, TableSummary};
pub use settings::StoredSettings;
pub use undo::UndoOutcome;

use crate::error::Result;
use rusqlite::{Connection, params};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::info;

/// Database handle wrapping the working SQLite connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    report: Arc<BootstrapReport>,
}

impl Database {
    /// Open or create the database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, BootstrapOptions::default())
    }

    pub fn open_with<P: AsRef<Path>>(path: P, options: BootstrapOptions) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;

        conn.execute_batch(
            "PRAGMA journal_mode=DELETE;
             PRAGMA foreign_keys=ON;
             PRAGMA busy_timeout=5000;",
        )?;

        info!(path = %path.as_ref().display(), "Opened database");
        Ok(Self::from_connection(conn, options))
    }

    /// Open a fresh in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::open_in_memory_with(BootstrapOptions::default())
    }

    pub fn open_in_memory_with(options: BootstrapOptions) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self::from_connection(conn, options))
    }

    fn from_connection(conn: Connection, options: BootstrapOptions) -> Self {
        let report = bootstrap::bootstrap(&conn, options);
        Self {
            conn: Arc::new(Mutex::new(conn)),
            report: Arc::new(report),
        }
    }

    /// Problems found while bootstrapping this database.
    pub fn bootstrap_report(&self) -> &BootstrapReport {
        &self.report
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Execute a function with exclusive access to the connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.lock();
        f(&conn)
    }

    /// Execute a function with mutable access to the connection (for transactions).
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.lock();
        f(&mut conn)
    }

    /// Write a standalone copy of the database to `path`, replacing any existing file.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let target = path.as_ref();
        let staging = staging_path(target);
        if staging.exists() {
            std::fs::remove_file(&staging)?;
        }

        self.with_conn(|conn| {
            conn.execute("VACUUM INTO ?1", params![staging.to_string_lossy()])?;
            Ok(())
        })?;
        std::fs::rename(&staging, target)?;

        info!(path = %target.display(), "Saved database copy");
        Ok(())
    }
}

fn staging_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "database".into());
    name.push(format!(".{}.partial", chrono::Utc::now().timestamp_millis()));
    target.with_file_name(name)
}
