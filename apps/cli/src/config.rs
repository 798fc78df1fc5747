//! CLI configuration loading and merging.

use anyhow::{Context, Result};
use std::path::PathBuf;
use titanic_training::PipelineConfig;

/// Load and merge pipeline configuration.
///
/// Configuration precedence:
/// 1. CLI arguments
/// 2. Environment variables (`TITANIC_*`)
/// 3. Local config file (./.titanicrc)
/// 4. Global config file (~/.titanic/config.toml)
/// 5. Defaults
pub fn load_config(tracking_root: Option<PathBuf>, log_level: Option<String>) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::discover_and_load().context("Failed to load configuration")?;
    config.merge(&PipelineConfig { tracking_root, log_level, ..Default::default() });
    Ok(config)
}
