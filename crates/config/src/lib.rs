//! Configuration loading and validation for AspectFlow.
//!
//! Loads configuration from `~/.aspectflow/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use aspectflow_core::{EvalOptions, Overrides, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.aspectflow/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Evaluation limits
    #[serde(default)]
    pub evaluation: EvaluationConfig,

    /// Result cache behaviour
    #[serde(default)]
    pub cache: CacheConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Named override presets, selectable from the command line
    #[serde(default)]
    pub defaults: Vec<PresetConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Maximum nesting depth of deferred calls during one evaluation
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Reject a deferred call that re-enters itself
    #[serde(default = "default_true")]
    pub detect_cycles: bool,
}

fn default_max_depth() -> usize {
    aspectflow_core::DEFAULT_MAX_DEPTH
}
fn default_true() -> bool {
    true
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            detect_cycles: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Keep memoized results in the process-wide cache after a run. When
    /// disabled every run executes inside a cache scope and is cleared on exit.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// A named set of aspect overrides.
///
/// ```toml
/// [[defaults]]
/// name = "wide"
/// values = { scale = 3, bias = 2 }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresetConfig {
    pub name: String,

    #[serde(default)]
    pub values: BTreeMap<String, toml::Value>,
}

impl PresetConfig {
    /// Convert the preset into evaluation overrides.
    pub fn overrides(&self) -> Result<Overrides, ConfigError> {
        let mut overrides = Overrides::new();
        for (name, raw) in &self.values {
            let value = toml_to_value(raw).map_err(|reason| {
                ConfigError::ValidationError(format!(
                    "preset '{}': value for '{name}' {reason}",
                    self.name
                ))
            })?;
            overrides.insert(name.clone(), value);
        }
        Ok(overrides)
    }
}

fn toml_to_value(raw: &toml::Value) -> Result<Value, String> {
    match raw {
        toml::Value::Integer(i) => Ok(Value::int(*i)),
        toml::Value::Float(f) => Ok(Value::float(*f)),
        toml::Value::Boolean(b) => Ok(Value::bool(*b)),
        toml::Value::String(s) => Ok(Value::str(s.as_str())),
        toml::Value::Array(items) => items
            .iter()
            .map(toml_to_value)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::list),
        toml::Value::Table(_) => Err("is a table, which cannot be an aspect value".into()),
        toml::Value::Datetime(_) => Err("is a datetime, which cannot be an aspect value".into()),
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.aspectflow/config.toml).
    ///
    /// Environment variables take precedence over the file:
    /// - `ASPECTFLOW_MAX_DEPTH`
    /// - `ASPECTFLOW_CACHE` (`on`/`off`, `true`/`false`, `1`/`0`)
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides read through `lookup`.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(depth) = lookup("ASPECTFLOW_MAX_DEPTH") {
            self.evaluation.max_depth = depth.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "ASPECTFLOW_MAX_DEPTH must be a positive integer, got '{depth}'"
                ))
            })?;
        }

        if let Some(flag) = lookup("ASPECTFLOW_CACHE") {
            self.cache.enabled = match flag.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "on" | "yes" => true,
                "0" | "false" | "off" | "no" => false,
                other => {
                    return Err(ConfigError::ValidationError(format!(
                        "ASPECTFLOW_CACHE must be on or off, got '{other}'"
                    )));
                }
            };
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".aspectflow")
    }

    /// Get the default configuration file path.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.evaluation.max_depth == 0 {
            return Err(ConfigError::ValidationError(
                "evaluation.max_depth must be at least 1".into(),
            ));
        }

        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "logging.level must not be empty".into(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for preset in &self.defaults {
            if preset.name.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "every [[defaults]] preset needs a name".into(),
                ));
            }
            if !seen.insert(preset.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate preset name '{}'",
                    preset.name
                )));
            }
            preset.overrides()?;
        }

        Ok(())
    }

    /// Evaluation options for the engine.
    pub fn eval_options(&self) -> EvalOptions {
        EvalOptions {
            max_depth: self.evaluation.max_depth,
            detect_cycles: self.evaluation.detect_cycles,
        }
    }

    /// Find a preset by name.
    pub fn preset(&self, name: &str) -> Option<&PresetConfig> {
        self.defaults.iter().find(|p| p.name == name)
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
