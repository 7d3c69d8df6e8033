use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Timeouts above this are accepted but almost certainly a typo.
const MAX_SANE_TIMEOUT_SECS: u64 = 600;

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Add an error
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Add a warning
    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a message summarizing all errors
    pub fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return String::new();
        }
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding config.toml and the default snapshot database
    pub config_dir: PathBuf,

    /// Channel and payload settings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Consumer-side snapshot store
    #[serde(default)]
    pub store: StoreConfig,

    /// Producer-side icon lookup
    #[serde(default)]
    pub icons: IconsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Node name used as the authority of outbound item URIs
    #[serde(default = "default_node")]
    pub node: String,

    /// Bound on the producer's connect wait
    #[serde(default = "default_connect_timeout_secs")]
    pub producer_connect_timeout_secs: u64,

    /// Bound on the consumer's (re)connect wait before a batch is dropped
    #[serde(default = "default_connect_timeout_secs")]
    pub consumer_connect_timeout_secs: u64,

    /// Attach a `TIME` entry to every outbound payload
    #[serde(default = "default_debug_timestamps")]
    pub debug_timestamps: bool,

    /// Ask the transport to deliver outbound items without batching delay
    #[serde(default = "default_urgent")]
    pub urgent: bool,
}

fn default_node() -> String {
    "handheld".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_debug_timestamps() -> bool {
    cfg!(debug_assertions)
}

fn default_urgent() -> bool {
    true
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            node: default_node(),
            producer_connect_timeout_secs: default_connect_timeout_secs(),
            consumer_connect_timeout_secs: default_connect_timeout_secs(),
            debug_timestamps: default_debug_timestamps(),
            urgent: default_urgent(),
        }
    }
}

impl SyncConfig {
    pub fn producer_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.producer_connect_timeout_secs)
    }

    pub fn consumer_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.consumer_connect_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite file for the snapshot store; `<config_dir>/snapshot.db` when unset
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IconsConfig {
    /// Directory of `<icon_name>.png` files
    pub dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sunshine");

        Self {
            config_dir,
            sync: SyncConfig::default(),
            store: StoreConfig::default(),
            icons: IconsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file, creating default if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path, writing defaults there if missing
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            let mut config = Self::default();
            if let Some(parent) = config_path.parent() {
                config.config_dir = parent.to_path_buf();
            }
            config.save_to(config_path)?;
            return Ok(config);
        }

        let contents =
            std::fs::read_to_string(config_path).context("Failed to read config file")?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", config_path.display(), e)))?;

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        Self::load_validated_from(&Self::config_path()?)
    }

    /// [`Config::load_validated`] against an explicit path
    pub fn load_validated_from(config_path: &Path) -> Result<(Self, ValidationResult)> {
        let config = Self::load_from(config_path)?;
        let validation = config.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()).into());
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    /// Validate the configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.sync.node.trim().is_empty() {
            result.add_error("sync.node", "Node name must not be empty");
        } else if self.sync.node.contains('/') {
            result.add_error("sync.node", "Node name must not contain '/'");
        }

        Self::validate_timeout(
            self.sync.producer_connect_timeout_secs,
            "sync.producer_connect_timeout_secs",
            &mut result,
        );
        Self::validate_timeout(
            self.sync.consumer_connect_timeout_secs,
            "sync.consumer_connect_timeout_secs",
            &mut result,
        );

        if let Some(dir) = &self.icons.dir {
            if !dir.is_dir() {
                result.add_warning(
                    "icons.dir",
                    format!("Icon directory does not exist: {}", dir.display()),
                );
            }
        }

        result
    }

    fn validate_timeout(secs: u64, field_name: &str, result: &mut ValidationResult) {
        if secs == 0 {
            result.add_error(field_name, "Connect timeout must be greater than 0");
        } else if secs > MAX_SANE_TIMEOUT_SECS {
            result.add_warning(
                field_name,
                format!("Connect timeout is unusually long (>{}s)", MAX_SANE_TIMEOUT_SECS),
            );
        }
    }

    /// Resolved snapshot database path
    pub fn store_path(&self) -> PathBuf {
        self.store
            .path
            .clone()
            .unwrap_or_else(|| self.config_dir.join("snapshot.db"))
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to an explicit path
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Get the path to the configuration file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("sunshine");

        Ok(config_dir.join("config.toml"))
    }
}
