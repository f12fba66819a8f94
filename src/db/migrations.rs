//! Versioned migrations for the persisted settings document.
//!
//! The `mappings` entry of the configuration table holds a JSON document
//! whose shape changed over time:
//!
//! - **v1**: table-keyed mapping objects directly at the top level.
//! - **v2**: `{ mappings, column_roles, main_tables }`.
//! - **v3**: v2 plus an explicit `"version"` field.
//!
//! Readers detect the version once, then walk the registered migration
//! steps up to [`CURRENT_CONFIG_VERSION`] before deserializing.
//!
//! ```ignore
//! let registry = build_default_registry();
//! let (doc, found) = registry.upgrade(raw_doc)?;
//! assert_eq!(doc["version"], CURRENT_CONFIG_VERSION);
//! ```

use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

/// Settings document version.
pub type ConfigVersion = u32;

/// Version written by this build.
pub const CURRENT_CONFIG_VERSION: ConfigVersion = 3;

/// Field carrying the document version (v3 and later).
pub const VERSION_FIELD: &str = "version";

/// A migration function transforming a settings document in place.
pub type MigrationFn = fn(&mut Value) -> Result<(), String>;

/// A migration step with metadata.
#[derive(Clone)]
pub struct Migration {
    pub from: ConfigVersion,
    pub to: ConfigVersion,
    pub description: &'static str,
    pub migrate: MigrationFn,
}

impl fmt::Debug for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("description", &self.description)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MigrationError {
    #[error("Settings document is not a JSON object")]
    NotAnObject,

    #[error("Settings version {found} is newer than supported version {supported}")]
    NewerThanSupported {
        found: ConfigVersion,
        supported: ConfigVersion,
    },

    #[error("Invalid settings version field: {0}")]
    InvalidVersion(String),

    #[error("Cannot migrate settings from v{from} to v{to}")]
    NoPath { from: ConfigVersion, to: ConfigVersion },

    #[error("Settings migration v{from}->v{to} failed: {reason}")]
    MigrationFailed {
        from: ConfigVersion,
        to: ConfigVersion,
        reason: String,
    },
}

/// Registry of settings migrations between versions.
#[derive(Default)]
pub struct MigrationRegistry {
    migrations: HashMap<(ConfigVersion, ConfigVersion), Migration>,
    adjacency: HashMap<ConfigVersion, Vec<ConfigVersion>>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a forward migration step. Backward steps are ignored.
    pub fn register(
        mut self,
        from: ConfigVersion,
        to: ConfigVersion,
        description: &'static str,
        migrate: MigrationFn,
    ) -> Self {
        if from >= to {
            tracing::warn!(from, to, "Ignoring backward settings migration");
            return self;
        }
        self.migrations.insert(
            (from, to),
            Migration {
                from,
                to,
                description,
                migrate,
            },
        );
        self.adjacency.entry(from).or_default().push(to);
        self
    }

    pub fn migrations(&self) -> impl Iterator<Item = &Migration> {
        self.migrations.values()
    }

    /// Shortest chain of steps from `from` to `to` (BFS).
    pub fn find_path(
        &self,
        from: ConfigVersion,
        to: ConfigVersion,
    ) -> Result<Vec<&Migration>, MigrationError> {
        if from == to {
            return Ok(Vec::new());
        }

        let mut queue = VecDeque::from([from]);
        let mut visited = HashSet::from([from]);
        let mut parent: HashMap<ConfigVersion, ConfigVersion> = HashMap::new();

        while let Some(current) = queue.pop_front() {
            if current == to {
                let mut path = Vec::new();
                let mut node = to;
                while let Some(&prev) = parent.get(&node) {
                    let step = self
                        .migrations
                        .get(&(prev, node))
                        .ok_or(MigrationError::NoPath { from, to })?;
                    path.push(step);
                    node = prev;
                }
                path.reverse();
                return Ok(path);
            }

            for &next in self.adjacency.get(&current).into_iter().flatten() {
                if next <= to && visited.insert(next) {
                    parent.insert(next, current);
                    queue.push_back(next);
                }
            }
        }

        Err(MigrationError::NoPath { from, to })
    }

    /// Migrate a document in place and stamp the reached version.
    pub fn migrate(
        &self,
        doc: &mut Value,
        from: ConfigVersion,
        to: ConfigVersion,
    ) -> Result<(), MigrationError> {
        for step in self.find_path(from, to)? {
            (step.migrate)(doc).map_err(|reason| MigrationError::MigrationFailed {
                from: step.from,
                to: step.to,
                reason,
            })?;
            if let Some(obj) = doc.as_object_mut() {
                obj.insert(VERSION_FIELD.to_string(), Value::from(step.to));
            }
        }
        Ok(())
    }

    /// Detect the document's version and bring it to the current version.
    ///
    /// Returns the upgraded document and the version it was stored in.
    pub fn upgrade(&self, mut doc: Value) -> Result<(Value, ConfigVersion), MigrationError> {
        let found = detect_version(&doc)?;
        self.migrate(&mut doc, found, CURRENT_CONFIG_VERSION)?;
        Ok((doc, found))
    }
}

impl fmt::Debug for MigrationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationRegistry")
            .field("migrations", &self.migrations.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Work out which shape a stored settings document has.
///
/// An explicit `version` wins. Otherwise a top-level `mappings` object means
/// v2, and anything else is the legacy table-keyed v1 layout.
pub fn detect_version(doc: &Value) -> Result<ConfigVersion, MigrationError> {
    let obj = doc.as_object().ok_or(MigrationError::NotAnObject)?;

    if let Some(raw) = obj.get(VERSION_FIELD) {
        let version = raw
            .as_u64()
            .and_then(|v| ConfigVersion::try_from(v).ok())
            .filter(|v| *v >= 1)
            .ok_or_else(|| MigrationError::InvalidVersion(raw.to_string()))?;
        if version > CURRENT_CONFIG_VERSION {
            return Err(MigrationError::NewerThanSupported {
                found: version,
                supported: CURRENT_CONFIG_VERSION,
            });
        }
        return Ok(version);
    }

    if obj.get("mappings").is_some_and(Value::is_object) {
        Ok(2)
    } else {
        Ok(1)
    }
}

/// v1 -> v2: move table-keyed mappings under `mappings`.
fn migrate_v1_to_v2(doc: &mut Value) -> Result<(), String> {
    let legacy = doc.as_object().ok_or("expected an object")?;

    let mut mappings = Map::new();
    for (table, mapping) in legacy {
        if mapping.is_object() {
            mappings.insert(table.clone(), mapping.clone());
        } else {
            tracing::warn!(table = %table, "Dropping non-object legacy mapping entry");
        }
    }
    let main_tables: Vec<Value> = mappings.keys().cloned().map(Value::String).collect();

    let mut upgraded = Map::new();
    upgraded.insert("mappings".into(), Value::Object(mappings));
    upgraded.insert("column_roles".into(), Value::Object(Map::new()));
    upgraded.insert("main_tables".into(), Value::Array(main_tables));
    *doc = Value::Object(upgraded);
    Ok(())
}

/// v2 -> v3: fill in optional sections so every field is present.
fn migrate_v2_to_v3(doc: &mut Value) -> Result<(), String> {
    let obj = doc.as_object_mut().ok_or("expected an object")?;

    if !obj.get("mappings").is_some_and(Value::is_object) {
        return Err("missing 'mappings' object".into());
    }
    if !obj.get("column_roles").is_some_and(Value::is_object) {
        obj.insert("column_roles".into(), Value::Object(Map::new()));
    }
    if !obj.get("main_tables").is_some_and(Value::is_array) {
        let tables: Vec<Value> = obj
            .get("mappings")
            .and_then(Value::as_object)
            .map(|m| m.keys().cloned().map(Value::String).collect())
            .unwrap_or_default();
        obj.insert("main_tables".into(), Value::Array(tables));
    }
    Ok(())
}

/// Registry with every known settings migration.
pub fn build_default_registry() -> MigrationRegistry {
    MigrationRegistry::new()
        .register(
            1,
            2,
            "Move top-level table mappings under 'mappings'",
            migrate_v1_to_v2,
        )
        .register(
            2,
            3,
            "Add version field and default column_roles/main_tables",
            migrate_v2_to_v3,
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_detect_version() {
        assert_eq!(detect_version(&json!({"shumske": {"vrsta": ["Vrsta"]}})), Ok(1));
        assert_eq!(detect_version(&json!({})), Ok(1));
        assert_eq!(
            detect_version(&json!({"mappings": {}, "main_tables": []})),
            Ok(2)
        );
        assert_eq!(detect_version(&json!({"version": 3, "mappings": {}})), Ok(3));
        assert_eq!(detect_version(&json!([1, 2])), Err(MigrationError::NotAnObject));
        assert!(matches!(
            detect_version(&json!({"version": 99})),
            Err(MigrationError::NewerThanSupported { found: 99, .. })
        ));
        assert!(matches!(
            detect_version(&json!({"version": "three"})),
            Err(MigrationError::InvalidVersion(_))
        ));
    }

    #[test]
    fn test_legacy_document_upgrades_to_current() {
        let registry = build_default_registry();
        let legacy = json!({
            "shumske": {"latituda": ["Lat"]},
            "bregunice": {"datum": ["Datum"]}
        });
        let (doc, found) = registry.upgrade(legacy).unwrap();
        assert_eq!(found, 1);
        assert_eq!(doc["version"], json!(3));
        assert_eq!(doc["mappings"]["shumske"]["latituda"], json!(["Lat"]));
        assert_eq!(doc["column_roles"], json!({}));
        assert_eq!(doc["main_tables"], json!(["shumske", "bregunice"]));
    }

    #[test]
    fn test_v2_document_keeps_roles_and_extra_keys() {
        let registry = build_default_registry();
        let v2 = json!({
            "mappings": {"shumske": {"vrsta": ["Vrsta"]}},
            "column_roles": {"shumske": {"lat": "latituda", "lon": "longituda"}},
            "theme": "dark"
        });
        let (doc, found) = registry.upgrade(v2).unwrap();
        assert_eq!(found, 2);
        assert_eq!(doc["version"], json!(3));
        assert_eq!(doc["column_roles"]["shumske"]["lat"], json!("latituda"));
        assert_eq!(doc["main_tables"], json!(["shumske"]));
        assert_eq!(doc["theme"], json!("dark"));
    }

    #[test]
    fn test_current_document_is_untouched() {
        let registry = build_default_registry();
        let current = json!({"version": 3, "mappings": {}, "column_roles": {}, "main_tables": []});
        let (doc, found) = registry.upgrade(current.clone()).unwrap();
        assert_eq!(found, 3);
        assert_eq!(doc, current);
    }

    #[test]
    fn test_path_finding() {
        let registry = build_default_registry();
        let path: Vec<(u32, u32)> = registry
            .find_path(1, 3)
            .unwrap()
            .iter()
            .map(|m| (m.from, m.to))
            .collect();
        assert_eq!(path, vec![(1, 2), (2, 3)]);
        assert!(registry.find_path(3, 3).unwrap().is_empty());
        assert!(matches!(
            MigrationRegistry::new().find_path(1, 2),
            Err(MigrationError::NoPath { from: 1, to: 2 })
        ));
    }

    #[test]
    fn test_failed_step_reports_versions() {
        let registry = build_default_registry();
        let mut doc = json!({"version": 2, "mappings": "not an object"});
        let err = registry.migrate(&mut doc, 2, 3).unwrap_err();
        assert!(matches!(err, MigrationError::MigrationFailed { from: 2, to: 3, .. }));
    }

    #[test]
    fn test_backward_registration_is_ignored() {
        let registry = MigrationRegistry::new().register(3, 2, "bad", migrate_v2_to_v3);
        assert_eq!(registry.migrations().count(), 0);
    }
}
