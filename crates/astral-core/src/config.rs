//! Configuration for test runs.
//!
//! Uses a `key=value` file format with `#` comments and optional quotes.
//! Precedence: explicit values > `$ASTRAL_CONFIG` file > `.astral/config` > defaults.

use crate::types::WaitTimeout;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable naming an extra config file.
pub const CONFIG_ENV: &str = "ASTRAL_CONFIG";

/// Config file looked up relative to the working directory.
pub const LOCAL_CONFIG_PATH: &str = ".astral/config";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("invalid config line: {0}")]
    InvalidLine(String),
    #[error("invalid boolean value for {key}: {value}")]
    InvalidBool { key: String, value: String },
    #[error("invalid integer value for {key}: {value}")]
    InvalidInt { key: String, value: String },
    #[error("unknown config key: {0}")]
    UnknownKey(String),
}

/// Run configuration.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    /// Cadence of the scheduler and of PollUntil steps, in milliseconds.
    pub poll_interval_ms: u64,
    /// Timeout for wait steps registered without one (0 = infinite).
    pub default_wait_timeout_ms: u64,
    /// Print the progress and failure stream.
    pub progress: bool,
    /// Write a TSV step report here after each run.
    pub report_path: Option<PathBuf>,
    /// Append JSON-lines events here during each run.
    pub events_path: Option<PathBuf>,
    /// Extra source prefixes treated as internal when locating failures.
    pub internal_prefixes: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1,
            default_wait_timeout_ms: 0,
            progress: true,
            report_path: None,
            events_path: None,
            internal_prefixes: Vec::new(),
        }
    }
}

impl Config {
    /// Load config from a file, merging with defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.load_file(path)?;
        Ok(config)
    }

    /// Load `.astral/config` under `dir` (if present), then `$ASTRAL_CONFIG`.
    pub fn discover(dir: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let local = dir.join(LOCAL_CONFIG_PATH);
        if local.is_file() {
            config.load_file(&local)?;
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            config.load_file(Path::new(&path))?;
        }
        Ok(config)
    }

    /// Load and merge values from a config file.
    pub fn load_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let content = std::fs::read_to_string(path)?;
        self.parse_content(&content)
    }

    /// Parse config content (key=value format).
    pub fn parse_content(&mut self, content: &str) -> Result<(), ConfigError> {
        for line in content.lines() {
            let trimmed = line.trim();

            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let Some((key, value)) = trimmed.split_once('=') else {
                return Err(ConfigError::InvalidLine(line.to_string()));
            };

            let key = key.trim();
            let value = Self::unquote(value.trim());

            self.apply_value(key, &value)?;
        }
        Ok(())
    }

    /// Remove surrounding quotes from a value.
    fn unquote(value: &str) -> String {
        let quoted = value.len() >= 2
            && ((value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\'')));
        if quoted {
            value
                .get(1..value.len() - 1)
                .unwrap_or_default()
                .to_string()
        } else {
            value.to_string()
        }
    }

    fn apply_value(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "poll_interval_ms" => {
                let interval = Self::parse_int(key, value)?;
                if interval == 0 {
                    return Err(ConfigError::InvalidInt {
                        key: key.to_string(),
                        value: value.to_string(),
                    });
                }
                self.poll_interval_ms = interval;
            }
            "default_wait_timeout_ms" => {
                self.default_wait_timeout_ms = Self::parse_int(key, value)?;
            }
            "progress" => self.progress = Self::parse_bool(key, value)?,
            "report_path" => self.report_path = Self::optional_path(value),
            "events_path" => self.events_path = Self::optional_path(value),
            "internal_prefixes" => {
                self.internal_prefixes = value.split_whitespace().map(str::to_string).collect();
            }
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    fn optional_path(value: &str) -> Option<PathBuf> {
        if value.is_empty() {
            None
        } else {
            Some(PathBuf::from(value))
        }
    }

    fn parse_int(key: &str, value: &str) -> Result<u64, ConfigError> {
        value.parse().map_err(|_| ConfigError::InvalidInt {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
        match value.to_lowercase().as_str() {
            "true" | "1" | "yes" | "y" | "on" => Ok(true),
            "false" | "0" | "no" | "n" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidBool {
                key: key.to_string(),
                value: value.to_string(),
            }),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn default_wait_timeout(&self) -> WaitTimeout {
        WaitTimeout::from_millis(self.default_wait_timeout_ms)
    }

    /// Resolve relative output paths against `root`.
    pub fn resolve_paths(&mut self, root: &Path) {
        for path in [&mut self.report_path, &mut self.events_path]
            .into_iter()
            .flatten()
        {
            if path.is_relative() {
                *path = root.join(&*path);
            }
        }
    }
}
