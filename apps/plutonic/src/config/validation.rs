//! Startup checks on loaded configuration.

use super::{Config, ConfigError};

/// Ensure broker credentials are present.
///
/// # Errors
///
/// `MissingEnvVar` naming every variable that must be set.
pub fn require_credentials(config: &Config) -> Result<(), ConfigError> {
    let mut missing = Vec::new();

    if config.broker.api_key.trim().is_empty() {
        missing.push("ALPACA_API_KEY");
    }
    if config.broker.api_secret.trim().is_empty() {
        missing.push("ALPACA_API_SECRET");
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::MissingEnvVar(missing.join(", ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_both() {
        let Err(err) = require_credentials(&Config::default()) else {
            panic!("expected missing credentials");
        };
        let message = err.to_string();
        assert!(message.contains("ALPACA_API_KEY"));
        assert!(message.contains("ALPACA_API_SECRET"));
    }

    #[test]
    fn present() {
        let mut config = Config::default();
        config.broker.api_key = "key".to_string();
        config.broker.api_secret = "secret".to_string();
        assert!(require_credentials(&config).is_ok());
    }
}
