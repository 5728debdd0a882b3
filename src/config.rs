use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MarketError, Result};

pub const DEFAULT_CONFIG_PATH: &str = "config/bookswap.json";
pub const ENV_DATABASE: &str = "BOOKSWAP_DB";
pub const ENV_USER: &str = "BOOKSWAP_USER";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_database_path")]
    pub database_path: String,
    /// Id of the user acting from this machine, set by `login`.
    #[serde(default)]
    pub current_user: Option<String>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            current_user: None,
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl AppConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Apply `BOOKSWAP_DB` / `BOOKSWAP_USER` on top of the file values.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(path) = env::var(ENV_DATABASE) {
            if !path.trim().is_empty() {
                log::info!("Using database path from {ENV_DATABASE}");
                self.database_path = path;
            }
        }
        if let Ok(user) = env::var(ENV_USER) {
            if !user.trim().is_empty() {
                log::info!("Acting as user from {ENV_USER}");
                self.current_user = Some(user);
            }
        }
        self
    }
}

fn default_database_path() -> String {
    "data/bookswap.db".to_string()
}

fn default_poll_interval_ms() -> u64 {
    500
}

pub fn load_config(path: &str) -> AppConfig {
    let path = Path::new(path);
    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("Failed to parse config file {}: {err}", path.display());
                AppConfig::default()
            }
        },
        Err(err) => {
            log::info!(
                "Config file {} not found ({err}); using defaults",
                path.display()
            );
            AppConfig::default()
        }
    }
}

pub fn save_config(path: &str, config: &AppConfig) -> Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|e| MarketError::Config(format!("{}: {e}", parent.display())))?;
        }
    }
    let json = serde_json::to_string_pretty(config)
        .map_err(|e| MarketError::Config(e.to_string()))?;
    fs::write(path, json).map_err(|e| MarketError::Config(format!("{path}: {e}")))
}

/// Record which user is acting and write the file back.
pub fn persist_current_user(path: &str, user: Option<&str>) -> Result<AppConfig> {
    let mut config = load_config(path);
    config.current_user = user.map(str::to_string);
    save_config(path, &config)?;
    match user {
        Some(user) => log::info!("Persisted current user {user} to {path}"),
        None => log::info!("Cleared current user in {path}"),
    }
    Ok(config)
}
