//! Order execution.
//!
//! [`OrderExecutor`] accepts trade intents, submits them under the retry
//! policy and tracks every order until it reaches a terminal state. Fills are
//! applied to the [`PositionLedger`](crate::ledger::PositionLedger) exactly
//! once per broker fill sequence.

mod book;
mod executor;

pub use book::{OrderBook, OrderHandle};
pub use executor::{OrderExecutor, PollSummary};

use crate::application::ports::BrokerError;
use crate::domain::order_execution::{OrderError, OrderStatus};
use crate::domain::position::PositionError;
use crate::domain::shared::OrderId;
use crate::retry::RetryError;

/// Errors surfaced to callers of the executor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutorError {
    /// The intent failed local validation; nothing was sent.
    #[error("Invalid trade intent: {0}")]
    Validation(OrderError),

    /// The client order id has been used before.
    #[error("Duplicate client order id: {order_id}")]
    Duplicate {
        /// The reused id.
        order_id: OrderId,
    },

    /// No order with this id is tracked.
    #[error("Order not found: {order_id}")]
    NotFound {
        /// The unknown id.
        order_id: String,
    },

    /// The order is terminal and cannot be changed.
    #[error("Order {order_id} is {status} and cannot be canceled")]
    Conflict {
        /// Order id.
        order_id: OrderId,
        /// Terminal status it is in.
        status: OrderStatus,
    },

    /// The broker refused the request with a non-retryable error.
    #[error("Broker refused request for order {order_id}: {source}")]
    Broker {
        /// Order id.
        order_id: OrderId,
        /// Classified broker error.
        source: BrokerError,
    },

    /// A retryable call ran out of attempts or was cancelled by shutdown.
    #[error("Broker call for order {order_id} failed: {source}")]
    Retry {
        /// Order id.
        order_id: OrderId,
        /// Retry outcome, carrying the last broker error.
        source: RetryError,
    },

    /// A broker update could not be applied to the record.
    #[error("Update for order {order_id} rejected: {source}")]
    Update {
        /// Order id.
        order_id: OrderId,
        /// Domain rule that was violated.
        source: OrderError,
    },

    /// The ledger could not absorb the update's fill; the record is unchanged.
    #[error("Fill for order {order_id} rejected by ledger: {source}")]
    Ledger {
        /// Order id.
        order_id: OrderId,
        /// Arithmetic failure in the position.
        source: PositionError,
    },
}

impl ExecutorError {
    /// True when the failure is retry exhaustion.
    #[must_use]
    pub const fn is_retry_exhausted(&self) -> bool {
        matches!(
            self,
            Self::Retry {
                source: RetryError::Exhausted { .. },
                ..
            }
        )
    }

    pub(crate) fn from_retry(order_id: &OrderId, err: RetryError) -> Self {
        match err {
            RetryError::NonRetryable(source) => Self::Broker {
                order_id: order_id.clone(),
                source,
            },
            other => Self::Retry {
                order_id: order_id.clone(),
                source: other,
            },
        }
    }
}
