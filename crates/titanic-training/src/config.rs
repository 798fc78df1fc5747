//! Pipeline configuration file support.
//!
//! Settings come from `~/.titanic/config.toml`, then `./.titanicrc`, then
//! `TITANIC_*` environment variables; later sources win.

use crate::dataset::DEFAULT_RAW_PATH;
use crate::error::{TrainingError, TrainingResult};
use crate::job::DEFAULT_DATA_PATH;
use crate::layout::DEFAULT_TRACKING_ROOT;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_TRACKING_ROOT: &str = "TITANIC_TRACKING_ROOT";
pub const ENV_RAW_PATH: &str = "TITANIC_RAW_PATH";
pub const ENV_DATA_PATH: &str = "TITANIC_DATA_PATH";
pub const ENV_LOG_LEVEL: &str = "TITANIC_LOG_LEVEL";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Root directory of the tracking store and model registry.
    #[serde(default)]
    pub tracking_root: Option<PathBuf>,

    /// Raw Kaggle `train.csv`.
    #[serde(default)]
    pub raw_path: Option<PathBuf>,

    /// Processing directory for the cleaned dataset cache.
    #[serde(default)]
    pub data_path: Option<PathBuf>,

    #[serde(default)]
    pub log_level: Option<String>,
}

impl PipelineConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> TrainingResult<Self> {
        if !path.exists() {
            return Err(TrainingError::Config(format!("configuration file not found: {}", path.display())));
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| TrainingError::Config(format!("{}: {e}", path.display())))
    }

    pub fn save_to_file(&self, path: &Path) -> TrainingResult<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| TrainingError::Config(format!("failed to serialize: {e}")))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    #[must_use]
    pub fn default_global_path() -> PathBuf {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(".titanic")
            .join("config.toml")
    }

    #[must_use]
    pub fn default_local_path() -> PathBuf {
        PathBuf::from(".titanicrc")
    }

    /// Global file, then local file, then process environment.
    ///
    /// Missing files are skipped; an unreadable or malformed file is an error.
    pub fn discover_and_load() -> TrainingResult<Self> {
        let mut config = Self::default();
        for path in [Self::default_global_path(), Self::default_local_path()] {
            if path.exists() {
                config.merge(&Self::load_from_file(&path)?);
            }
        }
        config.apply_env_with(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Values set in `other` override those in `self`.
    pub fn merge(&mut self, other: &Self) {
        if let Some(ref root) = other.tracking_root {
            self.tracking_root = Some(root.clone());
        }
        if let Some(ref raw) = other.raw_path {
            self.raw_path = Some(raw.clone());
        }
        if let Some(ref data) = other.data_path {
            self.data_path = Some(data.clone());
        }
        if let Some(ref level) = other.log_level {
            self.log_level = Some(level.clone());
        }
    }

    /// Override fields from `TITANIC_*` variables as reported by `lookup`.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = non_empty(ENV_TRACKING_ROOT) {
            self.tracking_root = Some(PathBuf::from(v));
        }
        if let Some(v) = non_empty(ENV_RAW_PATH) {
            self.raw_path = Some(PathBuf::from(v));
        }
        if let Some(v) = non_empty(ENV_DATA_PATH) {
            self.data_path = Some(PathBuf::from(v));
        }
        if let Some(v) = non_empty(ENV_LOG_LEVEL) {
            self.log_level = Some(v);
        }
    }

    #[must_use]
    pub fn tracking_root(&self) -> PathBuf {
        self.tracking_root.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_TRACKING_ROOT))
    }

    #[must_use]
    pub fn raw_path(&self) -> PathBuf {
        self.raw_path.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_RAW_PATH))
    }

    #[must_use]
    pub fn data_path(&self) -> PathBuf {
        self.data_path.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_PATH))
    }

    #[must_use]
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }
}
