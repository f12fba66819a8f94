//! Survey data manager library
//!
//! CSV intake, column reconciliation, transactional import with undo, and
//! the settings store for the working survey database.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod format;
pub mod ident;
pub mod ingest;
pub mod pipeline;
pub mod types;
