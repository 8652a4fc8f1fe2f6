//! Service configuration. Loaded from a JSON file; every field has a default.

use crate::error::{AnomalyError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// SQLite database holding users, cars, fleets and charges
    pub database_path: PathBuf,
    /// Only users billed in this currency are considered
    pub currency_code: String,
    /// Cars of this brand are left out of every query
    pub excluded_brand: String,
    /// Upper clip applied to monthly cost and energy before fitting
    pub feature_clip: f64,
    /// Background refresh period; 0 trains only at startup
    pub refresh_interval_secs: u64,
    /// Isolation forest parameters shared by every partition
    pub forest: ForestConfig,
    /// Logging
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    /// Trees per model
    pub n_estimators: usize,
    /// Rows drawn (without replacement) to grow each tree
    pub max_samples: usize,
    /// Seed for every partition's RNG
    pub seed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

/// Query restrictions applied on top of a scope.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatorConfig {
    pub currency_code: String,
    pub excluded_brand: String,
    pub feature_clip: f64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("charges.db"),
            currency_code: "EUR".to_string(),
            excluded_brand: "skoda".to_string(),
            feature_clip: 1e10,
            refresh_interval_secs: 0,
            forest: ForestConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_samples: 256,
            seed: 10,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

impl ServiceConfig {
    /// Load from JSON file if present; otherwise return default. A file that
    /// exists but does not parse is an error. `DATABASE_PATH` overrides the
    /// configured database path.
    pub fn load(path: &Path) -> Result<Self> {
        let config = Self::read_file(path)?.unwrap_or_default();
        Ok(config.with_env_overrides())
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(db) = std::env::var("DATABASE_PATH") {
            self.database_path = PathBuf::from(db);
        }
        self
    }

    fn read_file(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(path)
            .map_err(|e| AnomalyError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        serde_json::from_str::<ServiceConfig>(&data)
            .map(Some)
            .map_err(|e| AnomalyError::Config(format!("invalid config {}: {}", path.display(), e)))
    }

    pub fn aggregator(&self) -> AggregatorConfig {
        AggregatorConfig {
            currency_code: self.currency_code.clone(),
            excluded_brand: self.excluded_brand.clone(),
            feature_clip: self.feature_clip,
        }
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        ServiceConfig::default().aggregator()
    }
}
