// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Locating and loading the configuration file.

use crate::config::AppConfig;
use directories::ProjectDirs;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info};

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "FWMIX_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to determine config directory")]
    NoConfigDir,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Manages the configuration file.
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Config manager for the per-user config dir, or `$FWMIX_CONFIG` when set.
    pub fn new() -> Result<Self, ConfigError> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Ok(Self::with_path(PathBuf::from(path)));
        }
        let project_dirs = ProjectDirs::from("", "", "fwmix").ok_or(ConfigError::NoConfigDir)?;
        Ok(Self::with_path(project_dirs.config_dir().join("config.toml")))
    }

    /// Config manager for an explicit file.
    pub fn with_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    /// Get the path to the main config file.
    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Load the application config; a missing file yields the defaults.
    pub fn load_config(&self) -> Result<AppConfig, ConfigError> {
        if self.config_path.exists() {
            info!("Loading config from {}", self.config_path.display());
            let content = fs::read_to_string(&self.config_path)?;
            Ok(AppConfig::from_toml(&content)?)
        } else {
            debug!("No config at {}, using defaults", self.config_path.display());
            Ok(AppConfig::default())
        }
    }

    /// Write `config`, creating the parent directory if needed.
    pub fn save_config(&self, config: &AppConfig) -> Result<(), ConfigError> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.config_path, config.to_toml()?)?;
        Ok(())
    }
}
