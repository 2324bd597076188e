//! Caller-facing errors.
//!
//! Every layer has its own `thiserror` enum. [`ExecutionError`] flattens
//! them into a stable [`ErrorCode`] plus message and context, which is what
//! the [`Engine`](crate::engine::Engine) hands back. [`FatalError`] is the
//! startup failure that ends the process.
//!
//! | Code | Source |
//! |------|--------|
//! | `INVALID_ORDER_PARAMS` | local validation, broker `Validation` |
//! | `DUPLICATE_ORDER` | reused client order id |
//! | `ORDER_NOT_FOUND` | unknown order id |
//! | `ORDER_CONFLICT` | cancel on a terminal order |
//! | `AUTHENTICATION_FAILED` | broker `Auth` |
//! | `BROKER_UNAVAILABLE` | retries exhausted |
//! | `SHUTTING_DOWN` | retry cancelled by shutdown |
//! | `INVALID_BROKER_UPDATE` | update breaks an order invariant |
//! | `PERSISTENCE_FAILED` | state store failure |

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::ports::{BrokerError, StoreError};
use crate::config::ConfigError;
use crate::execution::ExecutorError;
use crate::retry::RetryError;

/// Stable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Invalid order parameters (symbol, quantity, price).
    InvalidOrderParams,
    /// Client order id already used.
    DuplicateOrder,
    /// Order not found.
    OrderNotFound,
    /// Order is terminal and cannot be changed.
    OrderConflict,
    /// Broker rejected the credentials.
    AuthenticationFailed,
    /// Broker kept failing transiently.
    BrokerUnavailable,
    /// Shutdown stopped the operation.
    ShuttingDown,
    /// Broker update violated an order invariant.
    InvalidBrokerUpdate,
    /// Configuration invalid.
    InvalidConfig,
    /// Saving or loading state failed.
    PersistenceFailed,
}

impl ErrorCode {
    /// Get the error reason string.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::InvalidOrderParams => "INVALID_ORDER_PARAMS",
            Self::DuplicateOrder => "DUPLICATE_ORDER",
            Self::OrderNotFound => "ORDER_NOT_FOUND",
            Self::OrderConflict => "ORDER_CONFLICT",
            Self::AuthenticationFailed => "AUTHENTICATION_FAILED",
            Self::BrokerUnavailable => "BROKER_UNAVAILABLE",
            Self::ShuttingDown => "SHUTTING_DOWN",
            Self::InvalidBrokerUpdate => "INVALID_BROKER_UPDATE",
            Self::InvalidConfig => "INVALID_CONFIG",
            Self::PersistenceFailed => "PERSISTENCE_FAILED",
        }
    }

    /// Whether the caller may retry the same request later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::BrokerUnavailable)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.reason())
    }
}

/// An error with a stable code and context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct ExecutionError {
    code: ErrorCode,
    message: String,
    context: Vec<(String, String)>,
}

impl ExecutionError {
    /// Create a new execution error.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: Vec::new(),
        }
    }

    /// Add context to the error.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.context.push((key.into(), value.to_string()));
        self
    }

    /// Get the error code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        self.code
    }

    /// Get the message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the context.
    #[must_use]
    pub fn context(&self) -> &[(String, String)] {
        &self.context
    }

    /// Look up a context value.
    #[must_use]
    pub fn context_value(&self, key: &str) -> Option<&str> {
        self.context
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl std::fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code.reason(), self.message)
    }
}

const fn broker_code(err: &BrokerError) -> ErrorCode {
    match err {
        BrokerError::Auth { .. } => ErrorCode::AuthenticationFailed,
        BrokerError::Validation { .. } => ErrorCode::InvalidOrderParams,
        BrokerError::NotFound { .. } => ErrorCode::OrderNotFound,
        BrokerError::Transient { .. } => ErrorCode::BrokerUnavailable,
    }
}

const fn retry_code(err: &RetryError) -> ErrorCode {
    match err {
        RetryError::NonRetryable(source) => broker_code(source),
        RetryError::Exhausted { .. } => ErrorCode::BrokerUnavailable,
        RetryError::Cancelled { .. } => ErrorCode::ShuttingDown,
    }
}

impl From<ExecutorError> for ExecutionError {
    fn from(err: ExecutorError) -> Self {
        let message = err.to_string();
        match err {
            ExecutorError::Validation(_) => Self::new(ErrorCode::InvalidOrderParams, message),
            ExecutorError::Duplicate { order_id } => {
                Self::new(ErrorCode::DuplicateOrder, message).with_context("order_id", order_id)
            }
            ExecutorError::NotFound { order_id } => {
                Self::new(ErrorCode::OrderNotFound, message).with_context("order_id", order_id)
            }
            ExecutorError::Conflict { order_id, status } => {
                Self::new(ErrorCode::OrderConflict, message)
                    .with_context("order_id", order_id)
                    .with_context("status", status)
            }
            ExecutorError::Broker { order_id, source } => {
                Self::new(broker_code(&source), message).with_context("order_id", order_id)
            }
            ExecutorError::Retry { order_id, source } => Self::new(retry_code(&source), message)
                .with_context("order_id", order_id)
                .with_context("attempts", source.attempts()),
            ExecutorError::Update { order_id, .. } | ExecutorError::Ledger { order_id, .. } => {
                Self::new(ErrorCode::InvalidBrokerUpdate, message)
                    .with_context("order_id", order_id)
            }
        }
    }
}

impl From<RetryError> for ExecutionError {
    fn from(err: RetryError) -> Self {
        Self::new(retry_code(&err), err.to_string()).with_context("attempts", err.attempts())
    }
}

impl From<StoreError> for ExecutionError {
    fn from(err: StoreError) -> Self {
        Self::new(ErrorCode::PersistenceFailed, err.to_string())
    }
}

/// Startup failure. The binary logs it and exits with status 1.
#[derive(Debug, Error)]
pub enum FatalError {
    /// Broker credentials were rejected.
    #[error("Authentication failed: {0}")]
    Authentication(BrokerError),

    /// The broker could not be reached during startup.
    #[error("Broker unavailable during startup: {0}")]
    BrokerUnavailable(RetryError),

    /// Persisted state could not be loaded.
    #[error("Failed to load persisted state: {0}")]
    Persistence(#[from] StoreError),

    /// Configuration missing or invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl FatalError {
    /// Classify a failed startup call.
    #[must_use]
    pub fn from_retry(err: RetryError) -> Self {
        match err {
            RetryError::NonRetryable(source @ BrokerError::Auth { .. }) => {
                Self::Authentication(source)
            }
            other => Self::BrokerUnavailable(other),
        }
    }

    /// Stable code for the failure.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Authentication(_) => ErrorCode::AuthenticationFailed,
            Self::BrokerUnavailable(_) => ErrorCode::BrokerUnavailable,
            Self::Persistence(_) => ErrorCode::PersistenceFailed,
            Self::Config(_) => ErrorCode::InvalidConfig,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order_execution::OrderStatus;
    use crate::domain::shared::OrderId;

    #[test]
    fn test_execution_error_creation() {
        let error = ExecutionError::new(ErrorCode::InvalidOrderParams, "Bad quantity")
            .with_context("field", "quantity")
            .with_context("value", -1);

        assert_eq!(error.code(), ErrorCode::InvalidOrderParams);
        assert_eq!(error.message(), "Bad quantity");
        assert_eq!(error.context().len(), 2);
        assert_eq!(error.context_value("value"), Some("-1"));
    }

    #[test]
    fn test_error_display() {
        let error = ExecutionError::new(ErrorCode::OrderNotFound, "Order ord-1 not found");
        assert_eq!(error.to_string(), "[ORDER_NOT_FOUND] Order ord-1 not found");
    }

    #[test]
    fn conflict_keeps_status() {
        let error = ExecutionError::from(ExecutorError::Conflict {
            order_id: OrderId::new("ord-1"),
            status: OrderStatus::Filled,
        });
        assert_eq!(error.code(), ErrorCode::OrderConflict);
        assert_eq!(error.context_value("status"), Some("FILLED"));
    }

    #[test]
    fn exhausted_retry_is_retryable_code() {
        let error = ExecutionError::from(RetryError::Exhausted {
            attempts: 5,
            last: BrokerError::transient("503"),
        });
        assert_eq!(error.code(), ErrorCode::BrokerUnavailable);
        assert!(error.code().is_retryable());
        assert_eq!(error.context_value("attempts"), Some("5"));
    }

    #[test]
    fn cancelled_retry_is_shutting_down() {
        let error = ExecutionError::from(RetryError::Cancelled {
            attempts: 0,
            last: None,
        });
        assert_eq!(error.code(), ErrorCode::ShuttingDown);
    }

    #[test]
    fn auth_failure_is_fatal_authentication() {
        let fatal = FatalError::from_retry(RetryError::NonRetryable(BrokerError::Auth {
            message: "invalid key".to_string(),
        }));
        assert!(matches!(fatal, FatalError::Authentication(_)));
        assert_eq!(fatal.code(), ErrorCode::AuthenticationFailed);
    }

    #[test]
    fn other_startup_failure_is_unavailable() {
        let fatal = FatalError::from_retry(RetryError::Exhausted {
            attempts: 5,
            last: BrokerError::transient("reset"),
        });
        assert!(matches!(fatal, FatalError::BrokerUnavailable(_)));
    }
}
