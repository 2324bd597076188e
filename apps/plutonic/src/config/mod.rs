//! Configuration loading, validation and environment variable interpolation.
//!
//! # Usage
//!
//! ```rust,ignore
//! use plutonic::config::load_config;
//!
//! // Load from default path (config.yaml), falling back to built-in defaults
//! let config = load_config(None)?;
//!
//! println!("poll every {:?}", config.engine.poll_interval());
//! ```

mod broker;
mod engine;
mod persistence;
mod retry;
mod validation;

use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use broker::BrokerConfig;
pub use engine::{EngineConfig, LedgerConfig};
pub use persistence::PersistenceConfig;
pub use retry::RetryConfig;
pub use validation::require_credentials;

/// Default config file path.
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Used when no config file exists. Credentials come from the environment.
const DEFAULT_CONFIG_YAML: &str = r"
broker:
  environment: ${ALPACA_ENVIRONMENT:-paper}
  api_key: ${ALPACA_API_KEY}
  api_secret: ${ALPACA_API_SECRET}
";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("Failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),

    /// Configuration validation failed.
    #[error("Config validation failed: {0}")]
    ValidationError(String),

    /// Missing required environment variable.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Broker connection.
    #[serde(default)]
    pub broker: BrokerConfig,
    /// Retry policy for broker calls.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Position ledger.
    #[serde(default)]
    pub ledger: LedgerConfig,
    /// Service loop.
    #[serde(default)]
    pub engine: EngineConfig,
    /// State persistence.
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

// ============================================
// Configuration Loading
// ============================================

/// Load configuration from a YAML file with environment variable interpolation.
///
/// A missing file is not an error: the built-in defaults are used, with
/// credentials taken from `ALPACA_API_KEY` and `ALPACA_API_SECRET`.
///
/// # Errors
///
/// Returns a `ConfigError` if the file cannot be read, parsed, or validated.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or(DEFAULT_CONFIG_PATH);

    if !Path::new(path).exists() {
        tracing::info!(path, "Config file not found, using defaults");
        return load_config_from_string(DEFAULT_CONFIG_YAML);
    }

    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_string(),
        source: e,
    })?;

    load_config_from_string(&contents)
}

/// Load configuration from a YAML string.
///
/// # Errors
///
/// Returns a `ConfigError` if the YAML cannot be parsed or validated.
pub fn load_config_from_string(yaml: &str) -> Result<Config, ConfigError> {
    let interpolated = interpolate_env_vars(yaml);
    let config: Config = if interpolated.trim().is_empty() {
        Config::default()
    } else {
        serde_yaml_bw::from_str(&interpolated)?
    };
    validate_config(&config)?;
    Ok(config)
}

/// Interpolate environment variables in a string.
///
/// Supports both `${VAR}` and `${VAR:-default}` syntax. Unset or empty
/// variables without a default become empty strings.
#[allow(clippy::expect_used)] // Regex is compile-time constant
fn interpolate_env_vars(input: &str) -> String {
    use std::sync::OnceLock;

    static ENV_VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

    let re = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var regex is valid")
    });

    re.replace_all(input, |cap: &regex::Captures<'_>| {
        let default_value = cap.get(2).map_or("", |m| m.as_str());
        match std::env::var(&cap[1]) {
            Ok(v) if !v.is_empty() => v,
            _ => default_value.to_string(),
        }
    })
    .into_owned()
}

/// Validate configuration values.
fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let retry = &config.retry;

    if retry.max_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "retry.max_attempts must be at least 1".to_string(),
        ));
    }

    if retry.base_delay_ms > retry.max_delay_ms {
        return Err(ConfigError::ValidationError(
            "retry.base_delay_ms must not exceed retry.max_delay_ms".to_string(),
        ));
    }

    if !(0.0..1.0).contains(&retry.jitter_factor) {
        return Err(ConfigError::ValidationError(
            "retry.jitter_factor must be in [0.0, 1.0)".to_string(),
        ));
    }

    if retry.multiplier < 1.0 {
        return Err(ConfigError::ValidationError(
            "retry.multiplier must be at least 1.0".to_string(),
        ));
    }

    if retry.call_timeout_ms == 0 {
        return Err(ConfigError::ValidationError(
            "retry.call_timeout_ms must be positive".to_string(),
        ));
    }

    if config.ledger.epsilon < Decimal::ZERO {
        return Err(ConfigError::ValidationError(
            "ledger.epsilon must not be negative".to_string(),
        ));
    }

    if config.engine.poll_interval_ms == 0 || config.engine.reconcile_interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "engine intervals must be positive".to_string(),
        ));
    }

    if config.persistence.enabled && config.persistence.path.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "persistence.path is required when persistence is enabled".to_string(),
        ));
    }

    Ok(())
}
