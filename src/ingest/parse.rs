//! CSV tokenizing into header-keyed rows.

use super::preprocess::strip_preamble;
use crate::error::{Error, Result};
use csv::ReaderBuilder;
use std::collections::HashSet;
use std::path::Path;

/// A parsed CSV sheet: ordered headers and rows aligned to them.
///
/// Ragged rows are tolerated: fields missing at the end of a short row are
/// `None`, extra trailing fields on a long row are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedCsv {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl ParsedCsv {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value of `header` in row `row`, if the row has that field.
    pub fn field(&self, row: usize, header: &str) -> Option<&str> {
        let col = self.headers.iter().position(|h| h == header)?;
        self.rows.get(row)?.get(col)?.as_deref()
    }

    pub fn first_row(&self) -> Option<&[Option<String>]> {
        self.rows.first().map(Vec::as_slice)
    }
}

/// Make header names unique and non-empty.
///
/// A repeated header gets `_1`, `_2`, ... appended (the spelling spreadsheet
/// tools produce, which is why default mappings carry names such as
/// `Kvalitet brojanja_1`). A blank header becomes `column_<n>`.
fn normalize_headers(raw: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut headers = Vec::new();
    for (idx, header) in raw.into_iter().enumerate() {
        let base = if header.is_empty() {
            format!("column_{}", idx + 1)
        } else {
            header
        };
        let mut candidate = base.clone();
        let mut suffix = 1;
        while seen.contains(&candidate) {
            candidate = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        seen.insert(candidate.clone());
        headers.push(candidate);
    }
    headers
}

/// Parse CSV text whose first line is the header. Blank lines are skipped.
pub fn parse_csv(text: &str) -> Result<ParsedCsv> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = normalize_headers(reader.headers()?.iter().map(String::from));
    if headers.is_empty() {
        return Err(Error::invalid_input(
            "csv",
            "Could not detect any columns in the CSV file",
        ));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row: Vec<Option<String>> = (0..headers.len())
            .map(|i| record.get(i).map(String::from))
            .collect();
        rows.push(row);
    }

    Ok(ParsedCsv { headers, rows })
}

/// Read a CSV file from disk, drop any preamble before the header, and parse it.
///
/// Bytes that are not valid UTF-8 are replaced rather than rejected; survey
/// sheets regularly arrive in legacy encodings.
pub fn read_csv(path: &Path, header_scan_lines: usize) -> Result<ParsedCsv> {
    let bytes = std::fs::read(path)?;
    let text = String::from_utf8_lossy(&bytes);
    let pre = strip_preamble(&text, header_scan_lines);
    if pre.header_line > 0 {
        tracing::debug!(
            path = %path.display(),
            skipped = pre.header_line,
            "Discarded preamble lines before CSV header"
        );
    }
    parse_csv(pre.text)
}
