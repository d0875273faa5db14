//! Resolver configuration loading and validation

use anyhow::Result;
use keydex_core::Transport;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Cache refresh policy applied at the start of each enumeration pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RefreshMode {
    /// Keep known devices; reset their "seen" markers and re-mark matches.
    /// Structural and topological matching work against the retained cache.
    Incremental,
    /// Clear the cache entirely; every pass rebuilds from live queries
    FullRescan,
}

impl Default for RefreshMode {
    fn default() -> Self {
        Self::Incremental
    }
}

/// Resolver configuration, immutable for the lifetime of an engine instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Transports to enumerate, in pass order
    #[serde(default = "default_transports")]
    pub transports: Vec<Transport>,
    /// Cache refresh policy
    #[serde(default)]
    pub refresh: RefreshMode,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            transports: default_transports(),
            refresh: RefreshMode::default(),
        }
    }
}

fn default_transports() -> Vec<Transport> {
    Transport::ALL.to_vec()
}

impl ResolverConfig {
    /// Restrict the transport filter
    pub fn with_transports(mut self, transports: Vec<Transport>) -> Self {
        self.transports = transports;
        self
    }

    /// Set the refresh policy
    pub fn with_refresh(mut self, refresh: RefreshMode) -> Self {
        self.refresh = refresh;
        self
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<ResolverConfig> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: ResolverConfig = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(ResolverConfig::default())
    }
}
