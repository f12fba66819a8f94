//! Header detection for survey-sheet exports.
//!
//! Spreadsheet exports often start with a title, a blank row or a block of
//! metadata before the real header. We look at the first few lines and keep
//! the text from the first line that plausibly is a header. This is a
//! heuristic: an unusual preamble can still be misdetected.

/// Number of leading lines inspected when looking for the header.
pub const DEFAULT_HEADER_SCAN_LINES: usize = 10;

/// CSV text with any preamble before the header removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preprocessed<'a> {
    /// Zero-based index of the header line in the original text.
    pub header_line: usize,
    /// Text starting at the header line.
    pub text: &'a str,
}

/// A line is a header candidate when it has at least 3 non-empty fields and
/// at least half of its comma-separated fields are non-empty.
fn looks_like_header(line: &str) -> bool {
    let fields: Vec<&str> = line.split(',').collect();
    let non_empty = fields
        .iter()
        .map(|f| unquote(f.trim()))
        .filter(|f| !f.is_empty())
        .count();
    non_empty >= 3 && non_empty * 2 >= fields.len()
}

fn unquote(field: &str) -> &str {
    field
        .strip_prefix('"')
        .and_then(|f| f.strip_suffix('"'))
        .map(str::trim)
        .unwrap_or(field)
}

fn strip_bom(text: &str) -> &str {
    text.strip_prefix('\u{feff}').unwrap_or(text)
}

/// Index of the header line among the first `scan_lines` lines, or 0 when
/// none of them qualifies.
pub fn locate_header(text: &str, scan_lines: usize) -> usize {
    strip_bom(text)
        .lines()
        .take(scan_lines)
        .position(looks_like_header)
        .unwrap_or(0)
}

/// Drop everything before the detected header line.
pub fn strip_preamble(text: &str, scan_lines: usize) -> Preprocessed<'_> {
    let text = strip_bom(text);
    let header_line = locate_header(text, scan_lines);

    let offset: usize = text
        .split_inclusive('\n')
        .take(header_line)
        .map(str::len)
        .sum();

    Preprocessed {
        header_line,
        text: &text[offset..],
    }
}
