//! Engine configuration
//!
//! Loaded from a TOML file; every section falls back to its defaults.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub listing: ListingSettings,

    #[serde(default)]
    pub tree: TreeSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Page sizes for registry and claim listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingSettings {
    /// Page size used when the caller gives no limit
    #[serde(default = "default_limit")]
    pub default_limit: u32,

    /// Requested limits above this are capped
    #[serde(default = "max_limit")]
    pub max_limit: u32,
}

impl Default for ListingSettings {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: max_limit(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeSettings {
    /// Accept repeated leaf digests when building a tree
    #[serde(default)]
    pub allow_duplicate_leaves: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_limit() -> u32 {
    10
}

fn max_limit() -> u32 {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

impl EngineConfig {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if given, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listing.default_limit == 0 {
            return Err(ConfigError::Invalid(
                "listing.default_limit must be at least 1".into(),
            ));
        }
        if self.listing.default_limit > self.listing.max_limit {
            return Err(ConfigError::Invalid(format!(
                "listing.default_limit ({}) exceeds listing.max_limit ({})",
                self.listing.default_limit, self.listing.max_limit
            )));
        }
        Ok(())
    }
}
