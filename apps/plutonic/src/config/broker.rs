//! Broker connection configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::infrastructure::broker::alpaca::{AlpacaConfig, AlpacaEnvironment};

/// Alpaca connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// `paper` or `live`.
    #[serde(default)]
    pub environment: AlpacaEnvironment,
    /// API key.
    #[serde(default)]
    pub api_key: String,
    /// API secret.
    #[serde(default)]
    pub api_secret: String,
    /// Overrides the environment's base URL.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Transport-level HTTP timeout in milliseconds.
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            environment: AlpacaEnvironment::default(),
            api_key: String::new(),
            api_secret: String::new(),
            base_url: None,
            http_timeout_ms: default_http_timeout_ms(),
        }
    }
}

impl BrokerConfig {
    /// Adapter configuration.
    #[must_use]
    pub fn to_alpaca_config(&self) -> AlpacaConfig {
        let config = AlpacaConfig::new(&self.api_key, &self.api_secret, self.environment)
            .with_timeout(Duration::from_millis(self.http_timeout_ms));
        match self.base_url.as_deref().filter(|url| !url.trim().is_empty()) {
            Some(url) => config.with_base_url(url),
            None => config,
        }
    }
}

const fn default_http_timeout_ms() -> u64 {
    30_000
}
