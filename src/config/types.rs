//! Application configuration types.

use crate::db::ImportOptions;
use crate::format::OutputFormat;
use crate::ident::DEFAULT_BACKUP_PREFIX_LEN;
use crate::ingest::DEFAULT_HEADER_SCAN_LINES;
use crate::pipeline::DEFAULT_QUALITY_THRESHOLD;
use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub import: ImportConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the working survey database.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("biodata/survey.db")
}

/// Import pipeline settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Match quality (percent) below which an import asks for confirmation (default: 75).
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: u8,

    /// Lines scanned for the real header row (default: 10).
    #[serde(default = "default_header_scan_lines")]
    pub header_scan_lines: usize,

    /// Filename characters kept in backup table names (default: 30).
    #[serde(default = "default_backup_prefix_len")]
    pub backup_prefix_len: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            quality_threshold: default_quality_threshold(),
            header_scan_lines: default_header_scan_lines(),
            backup_prefix_len: default_backup_prefix_len(),
        }
    }
}

fn default_quality_threshold() -> u8 {
    DEFAULT_QUALITY_THRESHOLD
}

fn default_header_scan_lines() -> usize {
    DEFAULT_HEADER_SCAN_LINES
}

fn default_backup_prefix_len() -> usize {
    DEFAULT_BACKUP_PREFIX_LEN
}

impl ImportConfig {
    pub fn options(&self) -> ImportOptions {
        ImportOptions {
            quality_threshold: self.quality_threshold,
            backup_prefix_len: self.backup_prefix_len,
            header_scan_lines: self.header_scan_lines,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Default output format for listings and query results.
    #[serde(default)]
    pub format: OutputFormat,
}

impl AppConfig {
    /// Load configuration from a single YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.import.quality_threshold > 100 {
            bail!(
                "import.quality_threshold must be between 0 and 100, got {}",
                self.import.quality_threshold
            );
        }
        if self.import.header_scan_lines == 0 {
            bail!("import.header_scan_lines must be at least 1");
        }
        if self.import.backup_prefix_len == 0 {
            bail!("import.backup_prefix_len must be at least 1");
        }
        Ok(())
    }
}
