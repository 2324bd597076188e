//! Alpaca-specific error types.

use std::time::Duration;

use thiserror::Error;

use crate::application::ports::BrokerError;

/// Errors from the Alpaca adapter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AlpacaError {
    /// Connection, DNS or TLS failure, or the transport timed out.
    #[error("Network error: {0}")]
    Network(String),

    /// Credentials missing or rejected (HTTP 401/403).
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Request refused as invalid (HTTP 400/422).
    #[error("Order rejected: {0}")]
    OrderRejected(String),

    /// Resource unknown (HTTP 404).
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limited (HTTP 429).
    #[error("Rate limited")]
    RateLimited {
        /// Suggested retry delay in seconds.
        retry_after_secs: Option<u64>,
    },

    /// Server-side failure (HTTP 408/5xx).
    #[error("Server error {status}: {message}")]
    Server {
        /// HTTP status.
        status: u16,
        /// Error message from the API.
        message: String,
    },

    /// Any other non-success status.
    #[error("API error: {code} - {message}")]
    Api {
        /// Error code from the API.
        code: String,
        /// Error message from the API.
        message: String,
    },

    /// Response body did not match the expected shape.
    #[error("Malformed response: {0}")]
    InvalidResponse(String),
}

impl From<AlpacaError> for BrokerError {
    fn from(err: AlpacaError) -> Self {
        match err {
            AlpacaError::AuthenticationFailed(message) => Self::Auth { message },
            AlpacaError::OrderRejected(message) => Self::Validation { message },
            AlpacaError::Api { code, message } => Self::Validation {
                message: format!("{code}: {message}"),
            },
            AlpacaError::NotFound(resource) => Self::NotFound { resource },
            AlpacaError::RateLimited { retry_after_secs } => Self::Transient {
                message: "rate limited".to_string(),
                retry_after: retry_after_secs.map(Duration::from_secs),
            },
            // A 2xx body that cannot be read will not parse on a replay either.
            err @ AlpacaError::InvalidResponse(_) => Self::Validation {
                message: err.to_string(),
            },
            err @ (AlpacaError::Network(_) | AlpacaError::Server { .. }) => {
                Self::transient(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_maps_to_auth() {
        let err: BrokerError = AlpacaError::AuthenticationFailed("bad key".to_string()).into();
        assert!(matches!(err, BrokerError::Auth { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn rejection_maps_to_validation() {
        let err: BrokerError = AlpacaError::OrderRejected("qty".to_string()).into();
        assert!(matches!(err, BrokerError::Validation { .. }));
    }

    #[test]
    fn rate_limit_keeps_hint() {
        let err: BrokerError = AlpacaError::RateLimited {
            retry_after_secs: Some(7),
        }
        .into();
        assert!(err.is_retryable());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
    }

    #[test]
    fn server_and_network_are_transient() {
        let server: BrokerError = AlpacaError::Server {
            status: 503,
            message: "unavailable".to_string(),
        }
        .into();
        let network: BrokerError = AlpacaError::Network("reset".to_string()).into();
        assert!(server.is_retryable());
        assert!(network.is_retryable());
    }

    #[test]
    fn malformed_response_is_not_retryable() {
        let err: BrokerError = AlpacaError::InvalidResponse("qty: abc".to_string()).into();
        assert!(matches!(err, BrokerError::Validation { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn not_found_maps_to_not_found() {
        let err: BrokerError = AlpacaError::NotFound("/v2/orders/X1".to_string()).into();
        assert_eq!(
            err,
            BrokerError::NotFound {
                resource: "/v2/orders/X1".to_string()
            }
        );
    }
}
