//! Configuration System
//!
//! Layered configuration for the publisher scenarios and logging. Sources, lowest
//! precedence first: built-in defaults, an optional TOML file, then environment
//! variables of the form `LIFELINE__PUBLISHER__INTERVAL_MS`.

use crate::error::ApiError;
use crate::logging::LoggingConfig;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const ENV_PREFIX: &str = "LIFELINE";
const ENV_SEPARATOR: &str = "__";

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LifelineConfig {
    /// Publisher timings used by the demonstration scenarios
    #[serde(default)]
    pub publisher: PublisherConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Publisher and scenario timings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublisherConfig {
    /// Pause between emissions
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// How long to wait after releasing before counting live tasks
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,

    /// Lifetime of the `timeout` scenario
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Offset from now of the `deadline` scenario's deadline
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,

    /// Values a consumer reads before it stops
    #[serde(default = "default_stop_after")]
    pub stop_after: u64,
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_grace_ms() -> u64 {
    4000
}

fn default_timeout_ms() -> u64 {
    8000
}

fn default_deadline_ms() -> u64 {
    5000
}

fn default_stop_after() -> u64 {
    10
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            grace_ms: default_grace_ms(),
            timeout_ms: default_timeout_ms(),
            deadline_ms: default_deadline_ms(),
            stop_after: default_stop_after(),
        }
    }
}

impl PublisherConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn deadline_offset(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    /// Validate publisher timings
    pub fn validate(&self) -> Result<(), String> {
        if self.interval_ms == 0 {
            return Err("interval_ms must be greater than zero".to_string());
        }
        if self.stop_after == 0 {
            return Err("stop_after must be greater than zero".to_string());
        }
        // A release is only observed within one interval.
        if self.grace_ms < self.interval_ms {
            return Err(format!(
                "grace_ms ({}) must be at least interval_ms ({})",
                self.grace_ms, self.interval_ms
            ));
        }
        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    Publisher(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Publisher(msg) => write!(f, "Publisher: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl LifelineConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = self.publisher.validate() {
            errors.push(ValidationError::Publisher(e));
        }
        if let Err(e) = self.logging.validate() {
            errors.push(ValidationError::Logging(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ApiError> {
        toml::to_string_pretty(self)
            .map_err(|e| ApiError::ConfigError(format!("Failed to render config: {}", e)))
    }
}

/// Loads [`LifelineConfig`] from file and environment sources.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load defaults, then `path` if given, then environment overrides, and validate.
    pub fn load(path: Option<&Path>) -> Result<LifelineConfig, ApiError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                File::from(path.to_path_buf())
                    .format(FileFormat::Toml)
                    .required(true),
            );
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        );

        let config: LifelineConfig = builder.build()?.try_deserialize()?;
        Self::checked(config)
    }

    /// Load from a TOML file only, ignoring the environment.
    pub fn load_from_file(path: &Path) -> Result<LifelineConfig, ApiError> {
        let config: LifelineConfig = Config::builder()
            .add_source(
                File::from(path.to_path_buf())
                    .format(FileFormat::Toml)
                    .required(true),
            )
            .build()?
            .try_deserialize()?;
        Self::checked(config)
    }

    fn checked(config: LifelineConfig) -> Result<LifelineConfig, ApiError> {
        config.validate().map_err(|errors| {
            let error_msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ApiError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                error_msgs.join("\n")
            ))
        })?;
        Ok(config)
    }
}
