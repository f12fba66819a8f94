//! Error types for import, undo and settings operations.
//!
//! Every failure carries an [`ErrorCode`] so callers can tell which
//! precondition or pipeline stage failed without matching on message text.

use serde::Serialize;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // User input errors
    InvalidInput,
    TableNotFound,
    TableExists,
    EmptyCsv,

    // Import pipeline
    DuplicateImport,
    ImportDeclined,
    MissingMapping,
    NoMatchedColumns,

    // Undo preconditions
    NoBackupReference,
    BackupMissing,
    UndoMissingMapping,
    NoJoinColumns,
    HistoryNotFound,

    // Internal errors
    DatabaseError,
    CsvError,
    ConfigError,
    IoError,
    InvalidTransition,
}

/// Failure of a core operation.
///
/// Messages are meant to be shown to the user as-is.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{message}")]
    InvalidInput {
        field: &'static str,
        message: String,
    },

    #[error("Table '{0}' does not exist")]
    TableNotFound(String),

    #[error("Table '{0}' already exists")]
    TableExists(String),

    #[error("CSV file '{0}' contains no data rows")]
    EmptyCsv(String),

    #[error("File '{filename}' has already been imported into table '{table}'")]
    DuplicateImport { filename: String, table: String },

    #[error(
        "Import cancelled by user: only {matched} of {total} columns matched ({quality}%) for table '{table}'"
    )]
    ImportDeclined {
        table: String,
        matched: usize,
        total: usize,
        quality: u8,
    },

    #[error("No column mapping is defined for table '{0}'")]
    MissingMapping(String),

    #[error("No matching columns found between the CSV headers and the mapping for table '{0}'")]
    NoMatchedColumns(String),

    #[error("Cannot undo import {0}: no backup reference was stored")]
    NoBackupReference(i64),

    #[error("Cannot undo import {id}: backup table '{table}' no longer exists")]
    BackupMissing { id: i64, table: String },

    #[error("Cannot undo import {id}: no mapping available for table '{table}' to determine join")]
    UndoMissingMapping { id: i64, table: String },

    #[error("Cannot undo import {0}: cannot determine column correspondence for deletion")]
    NoJoinColumns(i64),

    #[error("Import history record {0} not found")]
    HistoryNotFound(i64),

    #[error("Invalid {machine} transition: {event} in state {state}")]
    InvalidTransition {
        machine: &'static str,
        state: String,
        event: String,
    },

    #[error(transparent)]
    Database(#[from] rusqlite::Error),

    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Stored settings cannot be read and were left unchanged: {0}")]
    UnreadableSettings(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn invalid_input(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            message: message.into(),
        }
    }

    pub fn missing_field(field: &'static str) -> Self {
        Self::invalid_input(field, format!("{} is required", field))
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Error::InvalidInput { .. } => ErrorCode::InvalidInput,
            Error::TableNotFound(_) => ErrorCode::TableNotFound,
            Error::TableExists(_) => ErrorCode::TableExists,
            Error::EmptyCsv(_) => ErrorCode::EmptyCsv,
            Error::DuplicateImport { .. } => ErrorCode::DuplicateImport,
            Error::ImportDeclined { .. } => ErrorCode::ImportDeclined,
            Error::MissingMapping(_) => ErrorCode::MissingMapping,
            Error::NoMatchedColumns(_) => ErrorCode::NoMatchedColumns,
            Error::NoBackupReference(_) => ErrorCode::NoBackupReference,
            Error::BackupMissing { .. } => ErrorCode::BackupMissing,
            Error::UndoMissingMapping { .. } => ErrorCode::UndoMissingMapping,
            Error::NoJoinColumns(_) => ErrorCode::NoJoinColumns,
            Error::HistoryNotFound(_) => ErrorCode::HistoryNotFound,
            Error::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            Error::Database(_) => ErrorCode::DatabaseError,
            Error::Csv(_) => ErrorCode::CsvError,
            Error::Config(_) | Error::UnreadableSettings(_) => ErrorCode::ConfigError,
            Error::Io(_) => ErrorCode::IoError,
        }
    }

    /// Errors that are reported before any transaction opens.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self.code(),
            ErrorCode::InvalidInput
                | ErrorCode::TableNotFound
                | ErrorCode::TableExists
                | ErrorCode::EmptyCsv
                | ErrorCode::DuplicateImport
        )
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_match_variants() {
        let err = Error::DuplicateImport {
            filename: "a.csv".into(),
            table: "shumske".into(),
        };
        assert_eq!(err.code(), ErrorCode::DuplicateImport);
        assert!(err.is_rejection());

        let err = Error::NoJoinColumns(7);
        assert_eq!(err.code(), ErrorCode::NoJoinColumns);
        assert!(!err.is_rejection());
    }

    #[test]
    fn test_messages_name_the_failed_condition() {
        let err = Error::BackupMissing {
            id: 3,
            table: "import_x_1".into(),
        };
        assert_eq!(
            err.to_string(),
            "Cannot undo import 3: backup table 'import_x_1' no longer exists"
        );

        let err = Error::ImportDeclined {
            table: "shumske".into(),
            matched: 2,
            total: 3,
            quality: 67,
        };
        assert!(err.to_string().contains("2 of 3"));
        assert!(err.to_string().contains("67%"));
    }

    #[test]
    fn test_code_serializes_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::NoMatchedColumns).unwrap();
        assert_eq!(json, "\"NO_MATCHED_COLUMNS\"");
    }
}
