//! Service configuration, read from a TOML file with every key defaulted

use crate::mapping::{MappingRegistry, TypeMapping};
use crate::size::parse_size_budget;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Environment variable naming the config file when `--config` is absent.
pub const CONFIG_ENV: &str = "HIGHLIGHT_SPLIT_CONFIG";

const DEFAULT_SYSTEM_FIELDS: &[&str] = &[
    "body",
    "projectName",
    "projectVersion",
    "logType",
    "logSource",
    "host",
];

const DEFAULT_RETAINED_SOURCE_FIELDS: &[&str] = &["logSource", "logType", "Platform"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the HTTP server listens on
    pub bind: String,
    /// Size string used when a reconcile request carries no `limit`
    pub default_limit: String,
    /// Fields the reconcile limit applies to
    pub system_fields: Vec<String>,
    /// Highlighted fields kept in the returned source
    pub retained_source_fields: Vec<String>,
    /// Entries per request in the encoding cache
    pub result_cache_capacity: usize,
    pub max_body_bytes: usize,
    /// JSON file of `{index: {type: mapping}}` loaded at startup
    pub mappings_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
            default_limit: "999mb".to_string(),
            system_fields: DEFAULT_SYSTEM_FIELDS.iter().map(|s| s.to_string()).collect(),
            retained_source_fields: DEFAULT_RETAINED_SOURCE_FIELDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            result_cache_capacity: 1024,
            max_body_bytes: 16 * 1024 * 1024,
            mappings_path: None,
        }
    }
}

impl Config {
    /// Loads `path`, or the defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                Self::from_toml(&raw)
                    .with_context(|| format!("Failed to parse config file {}", path.display()))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn validate(&self) -> Result<()> {
        parse_size_budget(&self.default_limit)
            .with_context(|| format!("Invalid default_limit [{}]", self.default_limit))?;
        if self.max_body_bytes == 0 {
            anyhow::bail!("max_body_bytes must be positive");
        }
        Ok(())
    }

    /// Mappings from `mappings_path`, empty when none is configured.
    pub fn load_mappings(&self) -> Result<MappingRegistry> {
        let Some(path) = &self.mappings_path else {
            return Ok(MappingRegistry::new());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read mappings file {}", path.display()))?;
        let nested: HashMap<String, HashMap<String, TypeMapping>> = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse mappings file {}", path.display()))?;
        Ok(MappingRegistry::from_nested(nested))
    }
}
