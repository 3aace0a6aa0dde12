//! Application state shared by every request

use crate::config::Config;
use crate::mapping::MappingRegistry;
use crate::tokens::Analyzers;
use anyhow::Result;
use std::collections::HashSet;
use std::sync::RwLock;

/// Configuration, analyzers and the mapping registry
pub struct AppState {
    pub config: Config,
    pub analyzers: Analyzers,
    pub mappings: RwLock<MappingRegistry>,
    pub system_fields: HashSet<String>,
    pub retained_source_fields: HashSet<String>,
}

impl AppState {
    /// Initialize application state, loading configured mappings
    pub fn new(config: Config) -> Result<Self> {
        let mappings = config.load_mappings()?;
        tracing::info!(types = mappings.len(), "Loaded mappings");
        Ok(Self::with_mappings(config, mappings))
    }

    pub fn with_mappings(config: Config, mappings: MappingRegistry) -> Self {
        let system_fields = config.system_fields.iter().cloned().collect();
        let retained_source_fields = config.retained_source_fields.iter().cloned().collect();
        Self {
            config,
            analyzers: Analyzers::new(),
            mappings: RwLock::new(mappings),
            system_fields,
            retained_source_fields,
        }
    }
}
