//! Column reconciliation between source headers and canonical columns.

use crate::types::TableMapping;
use serde::Serialize;

/// Result of pairing source headers with a table's canonical columns.
///
/// `target_columns[i]` receives values from `source_columns[i]`. Canonical
/// columns without a matching header are left out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColumnMatch {
    pub target_columns: Vec<String>,
    pub source_columns: Vec<String>,
    /// Canonical columns that found no source header, in mapping order.
    pub unmatched_columns: Vec<String>,
    /// Number of canonical columns in the mapping.
    pub total: usize,
}

impl ColumnMatch {
    pub fn matched(&self) -> usize {
        self.target_columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.target_columns.is_empty()
    }

    /// Match quality in percent, `round(100 * matched / total)`.
    pub fn quality(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        let pct = (100.0 * self.matched() as f64 / self.total as f64).round();
        pct.clamp(0.0, 100.0) as u8
    }

    /// (target, source) pairs in canonical order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.target_columns
            .iter()
            .zip(&self.source_columns)
            .map(|(t, s)| (t.as_str(), s.as_str()))
    }

    /// Canonical columns that found no source header.
    pub fn unmatched(&self) -> impl Iterator<Item = &str> {
        self.unmatched_columns.iter().map(String::as_str)
    }
}

/// Pair each canonical column with a source header.
///
/// For every canonical column, in mapping order, the aliases are tried in
/// their listed order and the first alias present among `headers` wins.
/// Matching is exact and case-sensitive. Two canonical columns listing the
/// same alias both take that header.
pub fn reconcile<S: AsRef<str>>(headers: &[S], mapping: &TableMapping) -> ColumnMatch {
    let mut result = ColumnMatch {
        total: mapping.len(),
        ..ColumnMatch::default()
    };

    for (canonical, aliases) in mapping.iter() {
        let found = aliases
            .iter()
            .find(|alias| headers.iter().any(|h| h.as_ref() == alias.as_str()));
        match found {
            Some(source) => {
                result.target_columns.push(canonical.to_string());
                result.source_columns.push(source.clone());
            }
            None => result.unmatched_columns.push(canonical.to_string()),
        }
    }

    result
}
