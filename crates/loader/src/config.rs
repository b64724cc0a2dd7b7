//! Loader configuration file.

use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

/// Default number of projects whose connection info is remembered.
pub const DEFAULT_CONNECTION_CACHE_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoaderConfig {
    /// LRU size of the project → connection cache.
    pub connection_cache_capacity: usize,
    /// LRU size of each client's GraphQL response cache; 0 disables it.
    pub query_cache_capacity: usize,
    pub request_timeout_secs: Option<u64>,
    pub user_agent: String,
    /// Project directory used when no project id is given.
    pub project_dir: Option<PathBuf>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            connection_cache_capacity: DEFAULT_CONNECTION_CACHE_CAPACITY,
            query_cache_capacity: 0,
            request_timeout_secs: None,
            user_agent: concat!("ertdata/", env!("CARGO_PKG_VERSION")).to_string(),
            project_dir: None,
        }
    }
}

impl LoaderConfig {
    pub fn connection_cache_capacity(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.connection_cache_capacity).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

/// Loads configuration from `path`, falling back to defaults when the file
/// does not exist.
pub fn load_config_from_path(path: &Path) -> anyhow::Result<LoaderConfig> {
    if !path.exists() {
        return Ok(LoaderConfig::default());
    }

    let content = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let config: LoaderConfig =
        serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &LoaderConfig) -> anyhow::Result<()> {
    if config.connection_cache_capacity == 0 {
        bail!("connectionCacheCapacity must be at least 1");
    }
    if config.user_agent.trim().is_empty() {
        bail!("userAgent must not be empty");
    }
    Ok(())
}
