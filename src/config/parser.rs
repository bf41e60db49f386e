use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;
use validator::Validate;

use super::models::CourierConfig;

/// Errors that can occur during configuration parsing
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to open config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Configuration validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Configuration error: {0}")]
    Other(String),
}

/// Provides default configuration file path
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .expect("Could not determine home directory")
        .join(".feedcourier")
        .join("config.yaml")
}

/// Loads and validates the feedcourier configuration
pub fn load_config<P: AsRef<Path>>(config_path: P) -> Result<CourierConfig, ConfigError> {
    let mut file = File::open(&config_path).map_err(ConfigError::FileError)?;

    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(ConfigError::FileError)?;

    let config: CourierConfig = serde_yaml::from_str(&content).map_err(ConfigError::ParseError)?;

    config.validate().map_err(ConfigError::ValidationError)?;

    // The sync schedule must be a valid cron expression before startup
    cron::Schedule::from_str(&config.scheduler.sync_schedule).map_err(|e| {
        ConfigError::Other(format!(
            "Invalid sync schedule '{}': {}",
            config.scheduler.sync_schedule, e
        ))
    })?;

    if config.guild_subscriptions.enabled && config.guild_subscriptions.base_url.is_none() {
        return Err(ConfigError::Other(
            "Guild subscriptions are enabled but no base_url is configured".to_string(),
        ));
    }

    Ok(config)
}
