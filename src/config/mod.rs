//! Application configuration.
//!
//! Merged from tiers, field by field:
//! 1. **Defaults** - compiled in
//! 2. **Project** - `./biodata/config.yaml`
//! 3. **User** - `~/.biodata/config.yaml`
//! 4. **Environment**
//!
//! ## Environment Variables
//! - `BIODATA_CONFIG_PATH` - Explicit config file (replaces the file tiers)
//! - `BIODATA_DB_PATH` - Database path
//! - `BIODATA_QUALITY_THRESHOLD` - Import match quality threshold (percent)
//!
//! Column mappings are not configured here; they live inside each database.

mod loader;
mod types;

pub use loader::{
    ConfigLoader, ConfigPaths, ConfigTier, ENV_CONFIG_PATH, ENV_DB_PATH, ENV_QUALITY_THRESHOLD,
    merge_into,
};
pub use types::*;
