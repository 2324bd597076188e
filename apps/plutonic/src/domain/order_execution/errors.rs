//! Order execution errors.

use std::fmt;

use super::value_objects::OrderStatus;

/// Errors raised by the order aggregate and its value objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    /// Invalid intent parameters.
    InvalidParameters {
        /// Field with invalid value.
        field: String,
        /// Error message.
        message: String,
    },

    /// Invalid state transition attempted.
    InvalidStateTransition {
        /// Current order status.
        from: OrderStatus,
        /// Attempted status.
        to: OrderStatus,
        /// Reason for failure.
        reason: String,
    },

    /// Broker reported more filled than the intent asked for.
    Overfill {
        /// Client order id.
        order_id: String,
        /// Reported cumulative filled quantity.
        filled: String,
        /// Intent quantity.
        quantity: String,
    },

    /// Broker reported a cumulative quantity below one already applied.
    FillRegression {
        /// Client order id.
        order_id: String,
        /// Quantity already applied.
        applied: String,
        /// Quantity in the new report.
        reported: String,
    },
}

impl OrderError {
    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::InvalidParameters {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for OrderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidParameters { field, message } => {
                write!(f, "Invalid order parameter '{field}': {message}")
            }
            Self::InvalidStateTransition { from, to, reason } => {
                write!(f, "Invalid order state transition: {from} -> {to}: {reason}")
            }
            Self::Overfill {
                order_id,
                filled,
                quantity,
            } => {
                write!(
                    f,
                    "Order {order_id} reported filled {filled} exceeds quantity {quantity}"
                )
            }
            Self::FillRegression {
                order_id,
                applied,
                reported,
            } => {
                write!(
                    f,
                    "Order {order_id} reported filled {reported} below applied {applied}"
                )
            }
        }
    }
}

impl std::error::Error for OrderError {}
