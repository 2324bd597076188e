//! Alpaca adapter configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment for Alpaca API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlpacaEnvironment {
    /// Paper trading (simulated).
    #[default]
    #[serde(alias = "PAPER")]
    Paper,
    /// Live trading (real money).
    #[serde(alias = "LIVE")]
    Live,
}

impl AlpacaEnvironment {
    /// Get the base URL for the trading API.
    #[must_use]
    pub const fn trading_base_url(&self) -> &'static str {
        match self {
            Self::Paper => "https://paper-api.alpaca.markets",
            Self::Live => "https://api.alpaca.markets",
        }
    }

    /// Check if this is live trading.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }
}

impl fmt::Display for AlpacaEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Paper => write!(f, "PAPER"),
            Self::Live => write!(f, "LIVE"),
        }
    }
}

impl FromStr for AlpacaEnvironment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "paper" => Ok(Self::Paper),
            "live" => Ok(Self::Live),
            other => Err(format!("unknown Alpaca environment '{other}'")),
        }
    }
}

/// Configuration for the Alpaca broker adapter.
#[derive(Clone)]
pub struct AlpacaConfig {
    /// API key.
    pub api_key: String,
    /// API secret.
    pub api_secret: String,
    /// Trading environment.
    pub environment: AlpacaEnvironment,
    /// Transport-level HTTP timeout.
    pub timeout: Duration,
    /// Overrides the environment's base URL.
    pub base_url: Option<String>,
}

impl fmt::Debug for AlpacaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlpacaConfig")
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .field("environment", &self.environment)
            .field("timeout", &self.timeout)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl AlpacaConfig {
    /// Create a new configuration.
    #[must_use]
    pub fn new(
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        environment: AlpacaEnvironment,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            environment,
            timeout: Duration::from_secs(30),
            base_url: None,
        }
    }

    /// Set the HTTP timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Point the adapter at a different host.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Get the trading API base URL.
    #[must_use]
    pub fn trading_base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.environment.trading_base_url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paper_environment_urls() {
        let env = AlpacaEnvironment::Paper;
        assert!(env.trading_base_url().contains("paper"));
        assert!(!env.is_live());
    }

    #[test]
    fn live_environment_urls() {
        let env = AlpacaEnvironment::Live;
        assert_eq!(env.trading_base_url(), "https://api.alpaca.markets");
        assert!(env.is_live());
    }

    #[test]
    fn parses_environment_names() {
        assert_eq!("LIVE".parse::<AlpacaEnvironment>(), Ok(AlpacaEnvironment::Live));
        assert_eq!(" paper ".parse::<AlpacaEnvironment>(), Ok(AlpacaEnvironment::Paper));
        assert!("sandbox".parse::<AlpacaEnvironment>().is_err());
    }

    #[test]
    fn base_url_override() {
        let config = AlpacaConfig::new("k", "s", AlpacaEnvironment::Live)
            .with_base_url("http://127.0.0.1:9999");
        assert_eq!(config.trading_base_url(), "http://127.0.0.1:9999");
    }

    #[test]
    fn debug_hides_credentials() {
        let config = AlpacaConfig::new("key-123", "secret-456", AlpacaEnvironment::Paper);
        let debug = format!("{config:?}");
        assert!(!debug.contains("key-123"));
        assert!(!debug.contains("secret-456"));
    }
}
