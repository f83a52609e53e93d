use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use serde_json::Error as SerdeError;

const APP_QUALIFIER: &str = "com";
const APP_ORG: &str = "ProFast";
const APP_NAME: &str = "ProFast";

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/";
pub const DEFAULT_ROLE_CACHE_TTL_SECS: u64 = 5 * 60;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

pub const ENV_API_URL: &str = "PROFAST_API_URL";
pub const ENV_ROLE_TTL: &str = "PROFAST_ROLE_TTL_SECS";
pub const ENV_TIMEOUT: &str = "PROFAST_TIMEOUT_SECS";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_role_ttl")]
    pub role_cache_ttl_secs: u64,
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_role_ttl() -> u64 {
    DEFAULT_ROLE_CACHE_TTL_SECS
}

fn default_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            role_cache_ttl_secs: default_role_ttl(),
            request_timeout_secs: default_timeout(),
        }
    }
}

impl Config {
    pub fn role_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.role_cache_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Saved file (or defaults) with environment overrides on top.
    pub fn load() -> Self {
        let mut config = config_file()
            .and_then(|path| Self::read_from(&path).ok())
            .unwrap_or_default();
        config.apply_env(|key| env::var(key).ok());
        config
    }

    pub fn read_from(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn write_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = config_file().ok_or(ConfigError::StorageUnavailable)?;
        self.write_to(&path)?;
        Ok(path)
    }

    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            self.api_base_url = url;
        }
        if let Some(ttl) = lookup(ENV_ROLE_TTL).and_then(|v| v.trim().parse().ok()) {
            self.role_cache_ttl_secs = ttl;
        }
        if let Some(timeout) = lookup(ENV_TIMEOUT).and_then(|v| v.trim().parse().ok()) {
            self.request_timeout_secs = timeout;
        }
    }
}

pub fn config_file() -> Option<PathBuf> {
    ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME)
        .map(|dirs| dirs.config_dir().join("config.json"))
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("storage directory unavailable")]
    StorageUnavailable,
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serde(#[from] SerdeError),
}
