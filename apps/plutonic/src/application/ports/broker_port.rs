//! Broker Port (Driven Port)
//!
//! Interface for interacting with a brokerage. Adapters classify every
//! failure into exactly one [`BrokerError`] variant; nothing upstream
//! re-classifies.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::order_execution::{OrderUpdate, TradeIntent};
use crate::domain::shared::{BrokerId, OrderId, Symbol};

/// Broker-reported position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerPosition {
    /// Instrument.
    pub symbol: Symbol,
    /// Signed quantity (negative when short).
    pub quantity: Decimal,
    /// Average entry price.
    pub avg_entry_price: Decimal,
}

/// Broker-reported account balances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    /// Settled cash.
    pub cash: Decimal,
    /// Buying power available for new orders.
    pub buying_power: Decimal,
}

/// An order as the broker knows it: what was asked for and where it stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerOrder {
    /// Original request, rebuilt from the broker's record.
    pub intent: TradeIntent,
    /// Current state.
    pub update: OrderUpdate,
}

/// Broker port error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    /// Credentials rejected. Fatal, never retried.
    #[error("Broker authentication failed: {message}")]
    Auth {
        /// Error details.
        message: String,
    },

    /// Request refused as invalid (bad symbol, quantity, buying power).
    #[error("Broker rejected request: {message}")]
    Validation {
        /// Rejection reason.
        message: String,
    },

    /// Network failure, timeout, rate limit or server error.
    #[error("Transient broker failure: {message}")]
    Transient {
        /// Error details.
        message: String,
        /// Server-suggested wait before retrying.
        retry_after: Option<Duration>,
    },

    /// Order or resource unknown to the broker.
    #[error("Not found at broker: {resource}")]
    NotFound {
        /// The missing resource.
        resource: String,
    },
}

impl BrokerError {
    /// Transient error without a retry hint.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
            retry_after: None,
        }
    }

    /// Transient error for a call that exceeded its deadline.
    #[must_use]
    pub fn timeout(after: Duration) -> Self {
        Self::transient(format!("call timed out after {}ms", after.as_millis()))
    }

    /// Only transient failures are worth retrying.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Server-suggested wait, if any.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Transient { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Port for broker interactions.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Submit an order, returning the broker's order id.
    async fn submit_order(&self, intent: &TradeIntent) -> Result<BrokerId, BrokerError>;

    /// Cancel a working order.
    async fn cancel_order(&self, broker_order_id: &BrokerId) -> Result<(), BrokerError>;

    /// Current position in a symbol, `None` when flat.
    async fn get_position(&self, symbol: &Symbol) -> Result<Option<BrokerPosition>, BrokerError>;

    /// Account balances.
    async fn get_account(&self) -> Result<AccountSnapshot, BrokerError>;

    /// Current state of one order.
    async fn get_order(&self, broker_order_id: &BrokerId) -> Result<OrderUpdate, BrokerError>;

    /// Current state of the order placed under `client_order_id`, `None` if
    /// the broker never received it.
    async fn find_order(&self, client_order_id: &OrderId)
    -> Result<Option<OrderUpdate>, BrokerError>;

    /// Every open position.
    async fn list_positions(&self) -> Result<Vec<BrokerPosition>, BrokerError>;

    /// Every order still working at the broker.
    async fn list_open_orders(&self) -> Result<Vec<BrokerOrder>, BrokerError>;
}
