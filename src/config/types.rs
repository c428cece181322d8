//! Pager configuration file
//!
//! A single YAML document describing which list to page through, how the
//! sentinel is observed and where pages are fetched from.

use super::observer::{ObserverOptions, ObserverOverrides};
use crate::error::{Error, Result, ResultExt};
use crate::fetch::HttpFetcherConfig;
use crate::types::QueryKey;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Complete pager configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagerConfig {
    /// Identity of the list being paged
    pub query: QueryKey,

    /// Observer option overrides, merged over the defaults
    #[serde(default)]
    pub observer: ObserverOverrides,

    /// HTTP page source
    pub fetcher: HttpFetcherConfig,
}

impl PagerConfig {
    /// Observer options with the overrides applied
    pub fn observer_options(&self) -> Result<ObserverOptions> {
        ObserverOptions::from_overrides(&self.observer)
    }

    /// Validate the whole configuration
    pub fn validate(&self) -> Result<()> {
        if self.query.constant.trim().is_empty() {
            return Err(Error::invalid_value(
                "query.constant",
                "discriminator cannot be empty",
            ));
        }

        self.observer_options()?;
        self.fetcher.validate()
    }
}

/// Load a pager configuration from a YAML file
pub fn load_config(path: impl AsRef<Path>) -> Result<PagerConfig> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    load_config_from_str(&content)
}

/// Load a pager configuration from a YAML string
pub fn load_config_from_str(yaml: &str) -> Result<PagerConfig> {
    let config: PagerConfig = serde_yaml::from_str(yaml)
        .map_err(|e| Error::config(format!("Failed to parse pager YAML: {e}")))?;

    config.validate()?;
    Ok(config)
}
