//! Order record aggregate root.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::order_execution::errors::OrderError;
use crate::domain::order_execution::services::OrderStateMachine;
use crate::domain::order_execution::value_objects::{OrderStatus, OrderUpdate, TradeIntent};
use crate::domain::shared::{BrokerId, OrderId, Symbol};

/// A fill increment extracted from a broker update, ready for the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedFill {
    /// Instrument that filled.
    pub symbol: Symbol,
    /// Newly filled quantity, signed by side.
    pub signed_quantity: Decimal,
    /// Price of this increment.
    pub price: Decimal,
}

/// What [`OrderRecord::apply_update`] did with an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Sequence already applied; nothing changed.
    Duplicate {
        /// Sequence carried by the replayed update.
        sequence: u64,
    },
    /// Update applied.
    Applied {
        /// Status before the update.
        previous: OrderStatus,
        /// Status after the update.
        status: OrderStatus,
        /// New fill quantity, if any.
        fill: Option<AppliedFill>,
    },
}

/// Tracks one trade intent from submission to a terminal state.
///
/// Invariants:
/// - `filled_quantity <= intent.quantity`
/// - status changes only along [`OrderStateMachine`] transitions
/// - fill sequences are applied at most once, in increasing order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    intent: TradeIntent,
    broker_order_id: Option<BrokerId>,
    status: OrderStatus,
    filled_quantity: Decimal,
    avg_fill_price: Option<Decimal>,
    last_fill_sequence: u64,
    reject_reason: Option<String>,
    created_at: DateTime<Utc>,
    last_updated: DateTime<Utc>,
}

impl OrderRecord {
    /// Create a record in `Pending`.
    #[must_use]
    pub fn new(intent: TradeIntent) -> Self {
        let now = Utc::now();
        Self {
            intent,
            broker_order_id: None,
            status: OrderStatus::Pending,
            filled_quantity: Decimal::ZERO,
            avg_fill_price: None,
            last_fill_sequence: 0,
            reject_reason: None,
            created_at: now,
            last_updated: now,
        }
    }

    /// Rebuild a record for an order working at the broker but unknown
    /// locally.
    ///
    /// The broker's cumulative fill becomes the baseline and produces no
    /// fill increment.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::Overfill`] if the broker reports more filled
    /// than the intent's quantity.
    pub fn adopt(intent: TradeIntent, update: &OrderUpdate) -> Result<Self, OrderError> {
        if update.filled_quantity > intent.quantity {
            return Err(OrderError::Overfill {
                order_id: intent.client_order_id.to_string(),
                filled: update.filled_quantity.to_string(),
                quantity: intent.quantity.to_string(),
            });
        }
        let mut record = Self::new(intent);
        record.status = record.target_status(update);
        record.broker_order_id = Some(update.broker_order_id.clone());
        record.filled_quantity = update.filled_quantity;
        record.avg_fill_price = update.avg_fill_price;
        record.last_fill_sequence = update.sequence;
        Ok(record)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Client order id.
    #[must_use]
    pub const fn id(&self) -> &OrderId {
        &self.intent.client_order_id
    }

    /// The originating intent.
    #[must_use]
    pub const fn intent(&self) -> &TradeIntent {
        &self.intent
    }

    /// Broker order id, once acknowledged.
    #[must_use]
    pub const fn broker_order_id(&self) -> Option<&BrokerId> {
        self.broker_order_id.as_ref()
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> OrderStatus {
        self.status
    }

    /// Cumulative filled quantity.
    #[must_use]
    pub const fn filled_quantity(&self) -> Decimal {
        self.filled_quantity
    }

    /// Quantity still open.
    #[must_use]
    pub fn remaining_quantity(&self) -> Decimal {
        self.intent.quantity - self.filled_quantity
    }

    /// Average fill price across all fills.
    #[must_use]
    pub const fn avg_fill_price(&self) -> Option<Decimal> {
        self.avg_fill_price
    }

    /// Highest fill sequence applied so far.
    #[must_use]
    pub const fn last_fill_sequence(&self) -> u64 {
        self.last_fill_sequence
    }

    /// Why the order was rejected, if it was.
    #[must_use]
    pub fn reject_reason(&self) -> Option<&str> {
        self.reject_reason.as_deref()
    }

    /// Creation time.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Time of the last mutation.
    #[must_use]
    pub const fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Record the broker's acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns error unless the order is `Pending`.
    pub fn mark_submitted(&mut self, broker_order_id: BrokerId) -> Result<(), OrderError> {
        self.transition(OrderStatus::Submitted)?;
        self.broker_order_id = Some(broker_order_id);
        Ok(())
    }

    /// Mark the order rejected.
    ///
    /// # Errors
    ///
    /// Returns error if the order is already terminal.
    pub fn reject(&mut self, reason: impl Into<String>) -> Result<(), OrderError> {
        self.transition(OrderStatus::Rejected)?;
        self.reject_reason = Some(reason.into());
        Ok(())
    }

    /// Mark the order canceled.
    ///
    /// # Errors
    ///
    /// Returns error if the order is already terminal.
    pub fn cancel(&mut self) -> Result<(), OrderError> {
        self.transition(OrderStatus::Canceled)
    }

    /// Apply a broker-reported state.
    ///
    /// Updates whose sequence is not above the last applied one are ignored.
    /// A `Pending` record that the broker reports on is treated as
    /// acknowledged first. On error the record is left untouched.
    ///
    /// # Errors
    ///
    /// - [`OrderError::Overfill`] if the cumulative quantity exceeds the intent
    /// - [`OrderError::FillRegression`] if it drops below what was applied
    /// - [`OrderError::InvalidStateTransition`] if the order is terminal
    pub fn apply_update(&mut self, update: &OrderUpdate) -> Result<UpdateOutcome, OrderError> {
        if update.sequence <= self.last_fill_sequence {
            return Ok(UpdateOutcome::Duplicate {
                sequence: update.sequence,
            });
        }

        let previous = self.status;
        let from = if previous == OrderStatus::Pending {
            OrderStatus::Submitted
        } else {
            previous
        };

        if update.filled_quantity > self.intent.quantity {
            return Err(OrderError::Overfill {
                order_id: self.id().to_string(),
                filled: update.filled_quantity.to_string(),
                quantity: self.intent.quantity.to_string(),
            });
        }
        if update.filled_quantity < self.filled_quantity {
            return Err(OrderError::FillRegression {
                order_id: self.id().to_string(),
                applied: self.filled_quantity.to_string(),
                reported: update.filled_quantity.to_string(),
            });
        }

        let target = self.target_status(update);
        if previous.is_terminal() || target != from || target == OrderStatus::PartiallyFilled {
            OrderStateMachine::validate_transition(from, target)?;
        }

        let delta = update.filled_quantity - self.filled_quantity;
        let fill = if delta > Decimal::ZERO {
            let price = self.increment_price(update, delta)?;
            Some(AppliedFill {
                symbol: self.intent.symbol.clone(),
                signed_quantity: self.intent.side.signed(delta),
                price,
            })
        } else {
            None
        };

        if self.broker_order_id.is_none() {
            self.broker_order_id = Some(update.broker_order_id.clone());
        }
        self.filled_quantity = update.filled_quantity;
        if update.avg_fill_price.is_some() {
            self.avg_fill_price = update.avg_fill_price;
        } else if let Some(fill) = &fill {
            self.avg_fill_price = Some(fill.price);
        }
        self.last_fill_sequence = update.sequence;
        self.status = target;
        self.last_updated = Utc::now();

        Ok(UpdateOutcome::Applied {
            previous,
            status: target,
            fill,
        })
    }

    fn target_status(&self, update: &OrderUpdate) -> OrderStatus {
        if update.filled_quantity == self.intent.quantity {
            return OrderStatus::Filled;
        }
        match update.status {
            OrderStatus::Canceled | OrderStatus::Expired | OrderStatus::Rejected => update.status,
            _ if update.filled_quantity > Decimal::ZERO => OrderStatus::PartiallyFilled,
            _ => OrderStatus::Submitted,
        }
    }

    /// Price of the newly filled slice, backed out of the cumulative VWAP.
    fn increment_price(
        &self,
        update: &OrderUpdate,
        delta: Decimal,
    ) -> Result<Decimal, OrderError> {
        let new_avg = update
            .avg_fill_price
            .ok_or_else(|| OrderError::invalid("avg_fill_price", "fill reported without a price"))?;
        let Some(old_avg) = self.avg_fill_price.filter(|_| !self.filled_quantity.is_zero()) else {
            return Ok(new_avg);
        };
        let price = new_avg
            .checked_mul(update.filled_quantity)
            .zip(old_avg.checked_mul(self.filled_quantity))
            .and_then(|(total, applied)| total.checked_sub(applied))
            .and_then(|notional| notional.checked_div(delta))
            .ok_or_else(|| OrderError::invalid("avg_fill_price", "fill notional out of range"))?;
        Ok(if price > Decimal::ZERO { price } else { new_avg })
    }

    fn transition(&mut self, to: OrderStatus) -> Result<(), OrderError> {
        OrderStateMachine::validate_transition(self.status, to)?;
        self.status = to;
        self.last_updated = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order_execution::OrderSide;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn submitted(qty: Decimal) -> OrderRecord {
        let intent =
            TradeIntent::market("AAPL", OrderSide::Buy, qty).with_client_order_id("ord-1");
        let mut record = OrderRecord::new(intent);
        record.mark_submitted(BrokerId::new("X1")).unwrap();
        record
    }

    fn update(seq: u64, filled: Decimal, avg: Option<Decimal>, status: OrderStatus) -> OrderUpdate {
        OrderUpdate {
            client_order_id: OrderId::new("ord-1"),
            broker_order_id: BrokerId::new("X1"),
            status,
            filled_quantity: filled,
            avg_fill_price: avg,
            sequence: seq,
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn new_record_is_pending() {
        let record = OrderRecord::new(TradeIntent::market("AAPL", OrderSide::Buy, dec!(1)));
        assert_eq!(record.status(), OrderStatus::Pending);
        assert!(record.broker_order_id().is_none());
    }

    #[test]
    fn full_fill_reaches_filled() {
        let mut record = submitted(dec!(10));
        let outcome = record
            .apply_update(&update(1, dec!(10), Some(dec!(150)), OrderStatus::Filled))
            .unwrap();

        assert_eq!(record.status(), OrderStatus::Filled);
        assert_eq!(record.filled_quantity(), dec!(10));
        assert_eq!(record.avg_fill_price(), Some(dec!(150)));
        match outcome {
            UpdateOutcome::Applied { fill: Some(fill), .. } => {
                assert_eq!(fill.signed_quantity, dec!(10));
                assert_eq!(fill.price, dec!(150));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn partial_fills_back_out_increment_price() {
        let mut record = submitted(dec!(10));
        record
            .apply_update(&update(1, dec!(4), Some(dec!(100)), OrderStatus::PartiallyFilled))
            .unwrap();
        let outcome = record
            .apply_update(&update(2, dec!(10), Some(dec!(106)), OrderStatus::Filled))
            .unwrap();

        // (106 * 10 - 100 * 4) / 6 = 110
        let UpdateOutcome::Applied { fill: Some(fill), .. } = outcome else {
            panic!("expected fill");
        };
        assert_eq!(fill.signed_quantity, dec!(6));
        assert_eq!(fill.price, dec!(110));
    }

    #[test]
    fn out_of_range_notional_is_refused() {
        let mut record = submitted(dec!(10));
        record
            .apply_update(&update(1, dec!(4), Some(dec!(100)), OrderStatus::PartiallyFilled))
            .unwrap();
        let before = record.clone();

        let err = record
            .apply_update(&update(2, dec!(10), Some(Decimal::MAX), OrderStatus::Filled))
            .unwrap_err();

        assert!(matches!(
            err,
            OrderError::InvalidParameters { ref field, .. } if field == "avg_fill_price"
        ));
        assert_eq!(record, before);
    }

    #[test]
    fn replayed_sequence_is_duplicate() {
        let mut record = submitted(dec!(10));
        let fill = update(1, dec!(5), Some(dec!(150)), OrderStatus::PartiallyFilled);
        record.apply_update(&fill).unwrap();
        let again = record.apply_update(&fill).unwrap();

        assert_eq!(again, UpdateOutcome::Duplicate { sequence: 1 });
        assert_eq!(record.filled_quantity(), dec!(5));
    }

    #[test]
    fn overfill_is_rejected_without_mutation() {
        let mut record = submitted(dec!(10));
        let err = record
            .apply_update(&update(1, dec!(11), Some(dec!(150)), OrderStatus::Filled))
            .unwrap_err();

        assert!(matches!(err, OrderError::Overfill { .. }));
        assert_eq!(record.filled_quantity(), Decimal::ZERO);
        assert_eq!(record.last_fill_sequence(), 0);
    }

    #[test]
    fn cancel_after_partial_keeps_fill() {
        let mut record = submitted(dec!(10));
        record
            .apply_update(&update(1, dec!(3), Some(dec!(20)), OrderStatus::Canceled))
            .unwrap();
        assert_eq!(record.status(), OrderStatus::Canceled);
        assert_eq!(record.filled_quantity(), dec!(3));
    }

    #[test]
    fn terminal_record_rejects_new_updates() {
        let mut record = submitted(dec!(10));
        record
            .apply_update(&update(1, dec!(10), Some(dec!(1)), OrderStatus::Filled))
            .unwrap();
        let err = record
            .apply_update(&update(2, dec!(10), Some(dec!(1)), OrderStatus::Canceled))
            .unwrap_err();
        assert!(matches!(err, OrderError::InvalidStateTransition { .. }));
    }

    #[test]
    fn pending_record_is_acknowledged_by_update() {
        let intent =
            TradeIntent::market("AAPL", OrderSide::Sell, dec!(2)).with_client_order_id("ord-1");
        let mut record = OrderRecord::new(intent);
        record
            .apply_update(&update(1, dec!(0), None, OrderStatus::Submitted))
            .unwrap();
        assert_eq!(record.status(), OrderStatus::Submitted);
        assert_eq!(record.broker_order_id(), Some(&BrokerId::new("X1")));
    }

    #[test]
    fn adopt_takes_broker_fill_as_baseline() {
        let intent =
            TradeIntent::market("AAPL", OrderSide::Buy, dec!(10)).with_client_order_id("ord-1");
        let record = OrderRecord::adopt(
            intent,
            &update(7, dec!(4), Some(dec!(99)), OrderStatus::PartiallyFilled),
        )
        .unwrap();

        assert_eq!(record.status(), OrderStatus::PartiallyFilled);
        assert_eq!(record.filled_quantity(), dec!(4));
        assert_eq!(record.last_fill_sequence(), 7);
        assert_eq!(record.broker_order_id(), Some(&BrokerId::new("X1")));
    }

    #[test]
    fn fill_without_price_is_rejected() {
        let mut record = submitted(dec!(10));
        let err = record
            .apply_update(&update(1, dec!(1), None, OrderStatus::PartiallyFilled))
            .unwrap_err();
        assert!(matches!(err, OrderError::InvalidParameters { .. }));
    }

    proptest! {
        #[test]
        fn filled_never_exceeds_quantity(fills in proptest::collection::vec(0u32..8, 1..20)) {
            let mut record = submitted(dec!(20));
            let mut cumulative = Decimal::ZERO;
            for (i, step) in fills.into_iter().enumerate() {
                cumulative += Decimal::from(step);
                let status = OrderStatus::PartiallyFilled;
                let _ = record.apply_update(&update(i as u64 + 1, cumulative, Some(dec!(10)), status));
                prop_assert!(record.filled_quantity() <= record.intent().quantity);
            }
        }
    }
}
