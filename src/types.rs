//! Core types shared by the import pipeline, the undo engine and the settings store.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Alias table for one logical table: canonical column -> acceptable source headers.
///
/// Canonical column order is significant. It decides the column order of the
/// generated `INSERT` and is preserved through serialization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableMapping {
    entries: Vec<(String, Vec<String>)>,
}

impl TableMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a mapping from (canonical, aliases) pairs, normalizing each alias list.
    pub fn from_pairs<I, C, A, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (C, A)>,
        C: Into<String>,
        A: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut mapping = Self::new();
        for (canonical, aliases) in pairs {
            mapping.insert(canonical, aliases.into_iter().map(Into::into).collect());
        }
        mapping
    }

    /// Insert or replace the aliases of a canonical column.
    ///
    /// Aliases are deduplicated keeping first occurrence, and the canonical name
    /// is appended when missing so a file already using database column names
    /// always matches. Replacing keeps the column's original position.
    pub fn insert(&mut self, canonical: impl Into<String>, aliases: Vec<String>) {
        let canonical = canonical.into();
        let mut normalized: Vec<String> = Vec::with_capacity(aliases.len() + 1);
        for alias in aliases {
            if !normalized.contains(&alias) {
                normalized.push(alias);
            }
        }
        if !normalized.contains(&canonical) {
            normalized.push(canonical.clone());
        }

        match self.entries.iter_mut().find(|(name, _)| *name == canonical) {
            Some(entry) => entry.1 = normalized,
            None => self.entries.push((canonical, normalized)),
        }
    }

    /// Aliases of a canonical column, in match-priority order.
    pub fn aliases(&self, canonical: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(name, _)| name == canonical)
            .map(|(_, aliases)| aliases.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(name, aliases)| (name.as_str(), aliases.as_slice()))
    }

    pub fn canonical_columns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for TableMapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (canonical, aliases) in &self.entries {
            map.serialize_entry(canonical, aliases)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for TableMapping {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MappingVisitor;

        impl<'de> Visitor<'de> for MappingVisitor {
            type Value = TableMapping;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object of canonical column -> alias list")
            }

            fn visit_map<M: MapAccess<'de>>(self, mut access: M) -> Result<TableMapping, M::Error> {
                let mut mapping = TableMapping::new();
                while let Some((canonical, aliases)) = access.next_entry::<String, Vec<String>>()? {
                    mapping.insert(canonical, aliases);
                }
                Ok(mapping)
            }
        }

        deserializer.deserialize_map(MappingVisitor)
    }
}

/// Mappings for every logical table, keyed by table name.
pub type MappingSet = BTreeMap<String, TableMapping>;

/// Split a comma-separated alias list as typed in a settings form.
pub fn parse_alias_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Which columns of a table carry coordinates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRoles {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<String>,
}

/// Indices of the coordinate columns within a result column list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinateColumns {
    pub lat: Option<usize>,
    pub lon: Option<usize>,
}

impl CoordinateColumns {
    pub fn is_complete(&self) -> bool {
        self.lat.is_some() && self.lon.is_some()
    }
}

impl ColumnRoles {
    /// Resolve coordinate columns: an explicit role wins when the column is
    /// present, otherwise the first column starting with `latitud`/`longitud`,
    /// otherwise the first column containing it (case-insensitive).
    pub fn locate(&self, columns: &[String]) -> CoordinateColumns {
        CoordinateColumns {
            lat: locate_role(columns, self.lat.as_deref(), "latitud"),
            lon: locate_role(columns, self.lon.as_deref(), "longitud"),
        }
    }
}

fn locate_role(columns: &[String], explicit: Option<&str>, stem: &str) -> Option<usize> {
    if let Some(name) = explicit
        && let Some(idx) = columns.iter().position(|c| c == name)
    {
        return Some(idx);
    }
    let lowered: Vec<String> = columns.iter().map(|c| c.to_lowercase()).collect();
    lowered
        .iter()
        .position(|c| c.starts_with(stem))
        .or_else(|| lowered.iter().position(|c| c.contains(stem)))
}

/// One completed import, as stored in the history table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRecord {
    pub id: i64,
    pub filename: String,
    pub target_table: String,
    /// SQLite `CURRENT_TIMESTAMP` text (UTC, `YYYY-MM-DD HH:MM:SS`).
    pub import_date: Option<String>,
    pub row_count: i64,
    /// `None` for records written before backups were kept; such imports cannot be undone.
    pub backup_table_name: Option<String>,
}

impl ImportRecord {
    /// Parsed import timestamp, if the stored text is in SQLite's default format.
    pub fn imported_at(&self) -> Option<chrono::NaiveDateTime> {
        self.import_date.as_deref().and_then(|raw| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").ok()
        })
    }

    pub fn is_undoable(&self) -> bool {
        self.backup_table_name.is_some()
    }
}

/// Storage type inferred for a promoted column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnType {
    Text,
    Integer,
    Real,
}

impl ColumnType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// A named query kept inside the working database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedQuery {
    pub id: i64,
    pub name: String,
    pub sql: String,
    pub created_at: Option<String>,
}
