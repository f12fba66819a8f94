//! Configuration loader with tier-based merging.
//!
//! Each tier is read as YAML into a JSON value and merged field by field
//! over the tiers below it; environment variables are applied last.

use super::types::AppConfig;
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const ENV_CONFIG_PATH: &str = "BIODATA_CONFIG_PATH";
pub const ENV_DB_PATH: &str = "BIODATA_DB_PATH";
pub const ENV_QUALITY_THRESHOLD: &str = "BIODATA_QUALITY_THRESHOLD";

const CONFIG_FILE: &str = "config.yaml";

/// Configuration tier priority (lowest to highest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigTier {
    Defaults = 0,
    /// `./biodata/config.yaml`
    Project = 1,
    /// `~/.biodata/config.yaml`
    User = 2,
    Environment = 3,
}

impl std::fmt::Display for ConfigTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigTier::Defaults => write!(f, "defaults"),
            ConfigTier::Project => write!(f, "project"),
            ConfigTier::User => write!(f, "user"),
            ConfigTier::Environment => write!(f, "environment"),
        }
    }
}

/// Merge `overlay` into `base` in place.
///
/// Objects merge key by key, recursively. A null in the overlay means "not
/// specified" and leaves the base alone. Anything else, arrays included,
/// replaces the base value.
pub fn merge_into(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (_, Value::Null) => {}
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_into(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Directories searched for `config.yaml`.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub project_dir: Option<PathBuf>,
    pub user_dir: Option<PathBuf>,
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self::discover()
    }
}

impl ConfigPaths {
    pub fn discover() -> Self {
        Self {
            project_dir: Some(PathBuf::from("biodata")),
            user_dir: dirs::home_dir().map(|h| h.join(".biodata")),
        }
    }

    pub fn with_dirs(project_dir: Option<PathBuf>, user_dir: Option<PathBuf>) -> Self {
        Self {
            project_dir,
            user_dir,
        }
    }

    fn tier_files(&self) -> Vec<(ConfigTier, PathBuf)> {
        [
            (ConfigTier::Project, &self.project_dir),
            (ConfigTier::User, &self.user_dir),
        ]
        .into_iter()
        .filter_map(|(tier, dir)| dir.as_ref().map(|d| (tier, d.join(CONFIG_FILE))))
        .collect()
    }
}

/// Loaded configuration plus where it came from.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    pub paths: ConfigPaths,
    config: AppConfig,
    /// Files that contributed, lowest tier first.
    sources: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Load from the default locations and the process environment.
    pub fn load() -> Result<Self> {
        Self::load_with(ConfigPaths::discover(), |key| std::env::var(key).ok())
    }

    /// Load with explicit directories and an environment lookup.
    pub fn load_with<F>(paths: ConfigPaths, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(explicit) = env(ENV_CONFIG_PATH) {
            let path = PathBuf::from(explicit);
            let mut config = AppConfig::load(&path)
                .with_context(|| format!("loading {} from {}", ENV_CONFIG_PATH, path.display()))?;
            apply_env_overrides(&mut config, &env);
            config.validate()?;
            return Ok(Self {
                paths,
                config,
                sources: vec![path],
            });
        }

        let mut merged = serde_json::to_value(AppConfig::default())?;
        let mut sources = Vec::new();

        for (tier, file) in paths.tier_files() {
            if !file.exists() {
                continue;
            }
            match read_yaml(&file) {
                Ok(value) => {
                    debug!(tier = %tier, path = %file.display(), "Loaded config tier");
                    merge_into(&mut merged, value);
                    sources.push(file);
                }
                Err(e) => warn!(tier = %tier, path = %file.display(), error = %e, "Skipping unreadable config"),
            }
        }

        let mut config: AppConfig = serde_json::from_value(merged)?;
        apply_env_overrides(&mut config, &env);
        config.validate()?;

        Ok(Self {
            paths,
            config,
            sources,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn into_config(self) -> AppConfig {
        self.config
    }

    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }
}

fn read_yaml(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str::<Value>(&content)?)
}

fn apply_env_overrides<F>(config: &mut AppConfig, env: &F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(db_path) = env(ENV_DB_PATH) {
        config.database.path = PathBuf::from(db_path);
    }

    if let Some(raw) = env(ENV_QUALITY_THRESHOLD) {
        match raw.trim().parse::<u8>() {
            Ok(threshold) => config.import.quality_threshold = threshold,
            Err(_) => warn!(value = %raw, "Ignoring invalid {}", ENV_QUALITY_THRESHOLD),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_merge_into() {
        let mut base = json!({"import": {"quality_threshold": 75, "header_scan_lines": 10}, "tags": [1, 2]});
        merge_into(
            &mut base,
            json!({"import": {"quality_threshold": 60, "header_scan_lines": null}, "tags": [3]}),
        );
        assert_eq!(
            base,
            json!({"import": {"quality_threshold": 60, "header_scan_lines": 10}, "tags": [3]})
        );
    }

    #[test]
    fn test_merge_replaces_mismatched_shapes() {
        let mut base = json!({"value": {"nested": true}});
        merge_into(&mut base, json!({"value": 42}));
        assert_eq!(base, json!({"value": 42}));
    }

    #[test]
    fn test_load_defaults_only() {
        let temp = TempDir::new().unwrap();
        let paths = ConfigPaths::with_dirs(
            Some(temp.path().join("project")),
            Some(temp.path().join("user")),
        );
        let loader = ConfigLoader::load_with(paths, no_env).unwrap();
        assert_eq!(loader.config(), &AppConfig::default());
        assert!(loader.sources().is_empty());
    }

    #[test]
    fn test_user_overrides_project() {
        let temp = TempDir::new().unwrap();
        let project = temp.path().join("project");
        let user = temp.path().join("user");
        std::fs::create_dir_all(&project).unwrap();
        std::fs::create_dir_all(&user).unwrap();
        std::fs::write(
            project.join("config.yaml"),
            "import:\n  quality_threshold: 60\n  header_scan_lines: 20\n",
        )
        .unwrap();
        std::fs::write(user.join("config.yaml"), "import:\n  quality_threshold: 90\n").unwrap();

        let loader =
            ConfigLoader::load_with(ConfigPaths::with_dirs(Some(project), Some(user)), no_env)
                .unwrap();
        let config = loader.config();
        assert_eq!(config.import.quality_threshold, 90);
        assert_eq!(config.import.header_scan_lines, 20);
        assert_eq!(loader.sources().len(), 2);
    }

    #[test]
    fn test_environment_wins() {
        let temp = TempDir::new().unwrap();
        let project = temp.path().join("project");
        std::fs::create_dir_all(&project).unwrap();
        std::fs::write(project.join("config.yaml"), "database:\n  path: a.db\n").unwrap();

        let env: HashMap<&str, &str> =
            HashMap::from([(ENV_DB_PATH, "b.db"), (ENV_QUALITY_THRESHOLD, "40")]);
        let loader = ConfigLoader::load_with(ConfigPaths::with_dirs(Some(project), None), |k| {
            env.get(k).map(|v| v.to_string())
        })
        .unwrap();
        assert_eq!(loader.config().database.path, PathBuf::from("b.db"));
        assert_eq!(loader.config().import.quality_threshold, 40);
    }

    #[test]
    fn test_explicit_config_path() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("custom.yaml");
        std::fs::write(&file, "output:\n  format: json\n").unwrap();
        let path = file.to_string_lossy().into_owned();

        let loader = ConfigLoader::load_with(ConfigPaths::with_dirs(None, None), |k| {
            (k == ENV_CONFIG_PATH).then(|| path.clone())
        })
        .unwrap();
        assert_eq!(loader.config().output.format, crate::format::OutputFormat::Json);
        assert_eq!(loader.sources(), [file]);
    }

    #[test]
    fn test_invalid_env_threshold_is_ignored() {
        let loader = ConfigLoader::load_with(ConfigPaths::with_dirs(None, None), |k| {
            (k == ENV_QUALITY_THRESHOLD).then(|| "lots".to_string())
        })
        .unwrap();
        assert_eq!(loader.config().import.quality_threshold, 75);
    }
}
