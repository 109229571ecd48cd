//! Configuration module for VisChain-RS
//!
//! Engine settings are grouped into one [`EngineConfig`] with a section per
//! area (`[pool]`, `[pipeline]`, `[solution]`), stored as TOML.
//!
//! # App Data Location
//!
//! The default config file and log directory live in the platform data dir:
//! - **Linux**: `~/.local/share/dev.hxyulin.vischain-rs/`
//! - **macOS**: `~/Library/Application Support/dev.hxyulin.vischain-rs/`
//! - **Windows**: `%APPDATA%\dev.hxyulin.vischain-rs\`
//!
//! # Example
//!
//! ```ignore
//! use vischain_rs::config::EngineConfig;
//!
//! let mut config = EngineConfig::load_or_default();
//! config.pipeline.queue_capacity = 8;
//! config.save_default()?;
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{Result, VisionError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for data directories
pub const APP_ID: &str = "dev.hxyulin.vischain-rs";

/// Engine config filename
pub const CONFIG_FILE: &str = "engine.toml";

/// Log directory name inside the app data dir
pub const LOG_DIR: &str = "logs";

// ==================== App Data Directory ====================

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Ensure the app data directory exists
pub fn ensure_app_data_dir() -> Result<PathBuf> {
    let dir = app_data_dir().ok_or_else(|| {
        VisionError::Config("Could not determine app data directory".to_string())
    })?;

    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| {
            VisionError::Config(format!("Failed to create app data directory: {}", e))
        })?;
    }

    Ok(dir)
}

/// Get the path to the default engine config file
pub fn default_config_path() -> Option<PathBuf> {
    app_data_dir().map(|p| p.join(CONFIG_FILE))
}

// ==================== Engine Config ====================

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub pool: PoolConfig,
    pub pipeline: PipelineConfig,
    pub solution: SolutionConfig,
}

impl EngineConfig {
    /// Load and validate a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            VisionError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| {
            VisionError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the default location, returning defaults on any error
    pub fn load_or_default() -> Self {
        let Some(path) = default_config_path().filter(|p| p.exists()) else {
            return Self::default();
        };

        Self::load(&path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load engine config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save to an explicit path
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| VisionError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| VisionError::Config(format!("Failed to write config: {}", e)))
    }

    /// Save to the default location, creating the data dir if needed
    pub fn save_default(&self) -> Result<PathBuf> {
        let path = ensure_app_data_dir()?.join(CONFIG_FILE);
        self.save(&path)?;
        Ok(path)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.pool.capacity == 0 {
            return Err(VisionError::Config(
                "pool.capacity must be at least 1".to_string(),
            ));
        }
        if self.pool.shape().byte_len() == 0 {
            return Err(VisionError::Config(
                "pool frame shape must be non-empty".to_string(),
            ));
        }
        if self.pipeline.queue_capacity == 0 {
            return Err(VisionError::Config(
                "pipeline.queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.pipeline.poll_interval_ms == 0 {
            return Err(VisionError::Config(
                "pipeline.poll_interval_ms must be at least 1".to_string(),
            ));
        }
        if self.solution.max_stored_results == 0 {
            return Err(VisionError::Config(
                "solution.max_stored_results must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
