//! Runtime configuration for the catalog core.
//!
//! Every field has a default, so an empty JSON object is a valid configuration.
//! Secrets such as the API key are usually supplied through the environment with
//! [`CatalogConfig::with_env_overrides`].

use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, Result};
use crate::filter::{FilterPredicate, POPULAR_VOTE_THRESHOLD};
use crate::lmdb_store::DEFAULT_MAP_SIZE;

pub const ENV_API_KEY: &str = "CATALOG_API_KEY";
pub const ENV_API_BASE_URL: &str = "CATALOG_API_BASE_URL";
pub const ENV_STORE_PATH: &str = "CATALOG_STORE_PATH";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Store name; the LMDB directory is `<store_path>.lmdb`.
    pub store_path: String,
    pub map_size_bytes: usize,
    pub api_base_url: String,
    pub api_key: String,
    pub language: String,
    pub request_timeout_secs: u64,
    pub popular_vote_threshold: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            store_path: "movie_catalog".to_string(),
            map_size_bytes: DEFAULT_MAP_SIZE,
            api_base_url: "https://api.themoviedb.org/3".to_string(),
            api_key: String::new(),
            language: "en-US".to_string(),
            request_timeout_secs: 15,
            popular_vote_threshold: POPULAR_VOTE_THRESHOLD,
        }
    }
}

impl CatalogConfig {
    /// Parses and validates a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Config`] for malformed JSON or invalid values.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: CatalogConfig = serde_json::from_str(json)
            .map_err(|e| CatalogError::Config(format!("Invalid configuration JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            CatalogError::Config(format!("Cannot read {}: {e}", path.display()))
        })?;
        info!("Loaded catalog configuration from {}", path.display());
        Self::from_json_str(&json)
    }

    /// Applies `CATALOG_*` environment variables on top of this configuration.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Same as [`with_env_overrides`](Self::with_env_overrides) with an explicit lookup.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(key) = lookup(ENV_API_KEY) {
            self.api_key = key;
        }
        if let Some(url) = lookup(ENV_API_BASE_URL) {
            self.api_base_url = url;
        }
        if let Some(path) = lookup(ENV_STORE_PATH) {
            self.store_path = path;
        }
        self
    }

    /// The "popular" filter with this configuration's vote threshold.
    pub fn popular_filter(&self) -> FilterPredicate {
        FilterPredicate::min_votes(self.popular_vote_threshold)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_base_url.trim().is_empty() {
            return Err(CatalogError::Config("api_base_url must not be empty".to_string()));
        }
        if self.store_path.trim().is_empty() {
            return Err(CatalogError::Config("store_path must not be empty".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(CatalogError::Config("request_timeout_secs must be positive".to_string()));
        }
        if self.map_size_bytes == 0 {
            return Err(CatalogError::Config("map_size_bytes must be positive".to_string()));
        }
        Ok(())
    }
}
