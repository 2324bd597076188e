//! Order status in the lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of an [`OrderRecord`](crate::domain::order_execution::OrderRecord).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Accepted by the executor, not yet acknowledged by the broker.
    Pending,
    /// Acknowledged by the broker, no fills yet.
    Submitted,
    /// Some but not all of the quantity has filled.
    PartiallyFilled,
    /// Entire quantity filled.
    Filled,
    /// Refused by the broker, or the submit could not be delivered.
    Rejected,
    /// Canceled before completing.
    Canceled,
    /// Time in force elapsed.
    Expired,
}

impl OrderStatus {
    /// Returns true if the order is in a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Filled | Self::Canceled | Self::Rejected | Self::Expired
        )
    }

    /// Returns true if the order is live at the broker and may still fill.
    #[must_use]
    pub const fn is_working(&self) -> bool {
        matches!(self, Self::Submitted | Self::PartiallyFilled)
    }

    /// Returns true if the order can receive fills.
    #[must_use]
    pub const fn can_fill(&self) -> bool {
        self.is_working()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Submitted => write!(f, "SUBMITTED"),
            Self::PartiallyFilled => write!(f, "PARTIALLY_FILLED"),
            Self::Filled => write!(f, "FILLED"),
            Self::Rejected => write!(f, "REJECTED"),
            Self::Canceled => write!(f, "CANCELED"),
            Self::Expired => write!(f, "EXPIRED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(OrderStatus::Pending, false)]
    #[test_case(OrderStatus::Submitted, false)]
    #[test_case(OrderStatus::PartiallyFilled, false)]
    #[test_case(OrderStatus::Filled, true)]
    #[test_case(OrderStatus::Rejected, true)]
    #[test_case(OrderStatus::Canceled, true)]
    #[test_case(OrderStatus::Expired, true)]
    fn terminal_states(status: OrderStatus, terminal: bool) {
        assert_eq!(status.is_terminal(), terminal);
    }

    #[test]
    fn only_working_orders_can_fill() {
        assert!(!OrderStatus::Pending.can_fill());
        assert!(OrderStatus::Submitted.can_fill());
        assert!(OrderStatus::PartiallyFilled.can_fill());
        assert!(!OrderStatus::Filled.can_fill());
    }

    #[test]
    fn display_matches_serde() {
        let json = serde_json::to_string(&OrderStatus::PartiallyFilled).unwrap();
        assert_eq!(json, format!("\"{}\"", OrderStatus::PartiallyFilled));
    }
}
