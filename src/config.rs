//! Endpoint and pacing settings.
//!
//! Settings live in `{config_dir}/qcoder/settings.json`. Values are resolved
//! as defaults, then the settings file, then environment variables (a `.env`
//! file is honoured via `dotenvy`), and finally any CLI flags the caller
//! applies. The resolved value is handed to each run explicitly.

use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::llm::{ChatClient, ChatClientBuilder, LlmError};

pub const ENV_BASE_URL: &str = "QCODER_API_BASE_URL";
pub const ENV_API_KEY: &str = "QCODER_API_KEY";
pub const ENV_MODEL: &str = "QCODER_MODEL";
pub const ENV_TIMEOUT_SECS: &str = "QCODER_TIMEOUT_SECS";
pub const ENV_DELAY_SECS: &str = "QCODER_DELAY_SECS";

const DEFAULT_MODEL: &str = "gpt-4-0613";
const DEFAULT_TIMEOUT_SECS: f64 = 10.0;
const DEFAULT_DELAY_SECS: f64 = 3.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to determine configuration directory")]
    NoConfigDir,

    #[error("Failed to read settings file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write settings file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid value for {name}: '{value}'")]
    InvalidValue { name: &'static str, value: String },

    #[error("Please provide the API {0} (settings file, {1}, or command-line flag)")]
    Incomplete(&'static str, &'static str),
}

/// Connection and pacing settings for classification runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api_base_url: String,
    pub api_key: String,
    pub model: String,
    /// Per-item deadline for the remote call.
    pub timeout_secs: f64,
    /// Wait inserted after every item.
    pub delay_secs: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: String::new(),
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            delay_secs: DEFAULT_DELAY_SECS,
        }
    }
}

/// Per-run timing knobs derived from [`Settings`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunOptions {
    pub timeout: Duration,
    pub pacing_delay: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs_f64(DEFAULT_TIMEOUT_SECS),
            pacing_delay: Duration::from_secs_f64(DEFAULT_DELAY_SECS),
        }
    }
}

impl Settings {
    /// Default settings file location: `{config_dir}/qcoder/settings.json`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NoConfigDir` if the platform has no config directory.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(dir.join("qcoder").join("settings.json"))
    }

    /// Reads settings from `path`; a missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Read` or `ConfigError::Parse` if the file exists
    /// but cannot be read or is not valid settings JSON.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("no settings file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads the settings file at `path`, then applies `.env` and environment overrides.
    ///
    /// # Errors
    ///
    /// Propagates file errors from [`Settings::load_file`] and returns
    /// `ConfigError::InvalidValue` for unparsable numeric overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let mut settings = Self::load_file(path)?;
        settings.apply_env()?;
        Ok(settings)
    }

    /// Applies `QCODER_*` environment variables over the current values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a numeric variable does not parse
    /// as a non-negative number of seconds.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(url) = env::var(ENV_BASE_URL) {
            self.api_base_url = url;
        }
        if let Ok(key) = env::var(ENV_API_KEY) {
            self.api_key = key;
        }
        if let Ok(model) = env::var(ENV_MODEL) {
            self.model = model;
        }
        if let Ok(value) = env::var(ENV_TIMEOUT_SECS) {
            self.timeout_secs = parse_seconds(ENV_TIMEOUT_SECS, &value)?;
        }
        if let Ok(value) = env::var(ENV_DELAY_SECS) {
            self.delay_secs = parse_seconds(ENV_DELAY_SECS, &value)?;
        }
        Ok(())
    }

    /// Writes the settings as pretty JSON, replacing `path` atomically.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Write` if the directory cannot be created or the
    /// file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };

        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(write_err)?;

        let json = serde_json::to_string_pretty(self).map_err(|e| write_err(e.into()))?;

        let mut file = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
        file.write_all(json.as_bytes()).map_err(write_err)?;
        file.persist(path).map_err(|e| write_err(e.error))?;
        Ok(())
    }

    /// Checks that an endpoint and credential are present and timings are sane.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Incomplete` naming the first missing value, or
    /// `ConfigError::InvalidValue` for a timeout or delay that is negative, not a
    /// number, or too large to represent (and for a zero timeout).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base_url.trim().is_empty() {
            return Err(ConfigError::Incomplete("base URL", ENV_BASE_URL));
        }
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::Incomplete("key", ENV_API_KEY));
        }
        if !(self.timeout_secs > 0.0 && Duration::try_from_secs_f64(self.timeout_secs).is_ok()) {
            return Err(ConfigError::InvalidValue {
                name: "timeout_secs",
                value: self.timeout_secs.to_string(),
            });
        }
        if Duration::try_from_secs_f64(self.delay_secs).is_err() {
            return Err(ConfigError::InvalidValue {
                name: "delay_secs",
                value: self.delay_secs.to_string(),
            });
        }
        Ok(())
    }

    /// Timing options for one run. Values rejected by [`Settings::validate`]
    /// fall back to the defaults.
    pub fn run_options(&self) -> RunOptions {
        let defaults = RunOptions::default();
        RunOptions {
            timeout: Duration::try_from_secs_f64(self.timeout_secs)
                .ok()
                .filter(|t| !t.is_zero())
                .unwrap_or(defaults.timeout),
            pacing_delay: Duration::try_from_secs_f64(self.delay_secs)
                .unwrap_or(defaults.pacing_delay),
        }
    }

    /// Builds the HTTP client for these settings.
    ///
    /// # Errors
    ///
    /// Returns the `LlmError` raised by [`ChatClientBuilder::build`].
    pub fn build_client(&self) -> Result<ChatClient, LlmError> {
        ChatClientBuilder::new()
            .base_url(self.api_base_url.trim())
            .api_key(self.api_key.trim())
            .model(self.model.trim())
            .build()
    }

    /// The API key with all but its last four characters hidden.
    pub fn masked_api_key(&self) -> String {
        let chars: Vec<char> = self.api_key.chars().collect();
        if chars.len() <= 4 {
            return "*".repeat(chars.len());
        }
        let visible: String = chars[chars.len() - 4..].iter().collect();
        format!("{}{}", "*".repeat(chars.len() - 4), visible)
    }
}

fn parse_seconds(name: &'static str, value: &str) -> Result<f64, ConfigError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .ok_or_else(|| ConfigError::InvalidValue {
            name,
            value: value.to_string(),
        })
}
