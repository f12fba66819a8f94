//! CSV intake: locating the real header line, tokenizing, and reconciling
//! source headers against canonical columns.
//!
//! Everything here is pure; nothing touches the database.

pub mod parse;
pub mod preprocess;
pub mod reconcile;

pub use parse::{ParsedCsv, parse_csv, read_csv};
pub use preprocess::{DEFAULT_HEADER_SCAN_LINES, Preprocessed, locate_header, strip_preamble};
pub use reconcile::{ColumnMatch, reconcile};
