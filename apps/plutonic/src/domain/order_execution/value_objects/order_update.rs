//! Broker-reported order state.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::OrderStatus;
use crate::domain::shared::{BrokerId, OrderId};

/// A broker's view of an order at one point in time.
///
/// Quantities are cumulative. `sequence` increases by at least one every time
/// the broker reports a change for the order; an update whose sequence is not
/// greater than the last one applied is a replay and carries no new fill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderUpdate {
    /// Client order id the order was submitted with.
    pub client_order_id: OrderId,
    /// Broker's order id.
    pub broker_order_id: BrokerId,
    /// Status as reported by the broker.
    pub status: OrderStatus,
    /// Cumulative filled quantity.
    pub filled_quantity: Decimal,
    /// Volume-weighted average price across all fills so far.
    pub avg_fill_price: Option<Decimal>,
    /// Per-order fill sequence number.
    pub sequence: u64,
    /// When the broker observed this state.
    pub occurred_at: DateTime<Utc>,
}
