use std::path::{Path, PathBuf};
use std::time::Duration;

use prok_core::{RetryBudgets, DEFAULT_PAGE_SIZE};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable overriding [`ClientConfig::base_url`].
pub const API_URL_ENV: &str = "PROK_API_URL";
/// Environment variable overriding the configuration directory.
pub const HOME_ENV: &str = "PROK_HOME";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid base url {0:?}")]
    InvalidUrl(String),
    #[error("build http client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Client settings, stored as `prok.toml`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub base_url: String,
    /// Upper bound for one attempt (connect + send + receive).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Quiet period for filter changes before a new listing is requested.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default)]
    pub retry: RetryBudgets,
    /// Where the bearer token is persisted. Defaults to
    /// `<config dir>/credentials.json`.
    #[serde(default)]
    pub credentials_path: Option<PathBuf>,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

fn default_debounce_ms() -> u64 {
    500
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            page_size: default_page_size(),
            debounce_ms: default_debounce_ms(),
            retry: RetryBudgets::default(),
            credentials_path: None,
        }
    }
}

impl ClientConfig {
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&s).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads `path` if it exists, otherwise the defaults. Environment
    /// overrides are applied in both cases.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        let cfg = if path.exists() {
            Self::load_from(path)?
        } else {
            Self::default()
        };
        Ok(cfg.with_env_overrides())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, self.to_toml()?).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                self.base_url = url;
            }
        }
        self
    }

    /// `$PROK_HOME`, else `$HOME/.prok`, else `./.prok`.
    pub fn config_dir() -> PathBuf {
        if let Some(dir) = std::env::var_os(HOME_ENV) {
            return PathBuf::from(dir);
        }
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".prok")
    }

    pub fn default_path() -> PathBuf {
        Self::config_dir().join("prok.toml")
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.credentials_path
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("credentials.json"))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}
