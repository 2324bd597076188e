//! Trade intent: a caller's request to trade.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{OrderSide, OrderType};
use crate::domain::order_execution::errors::OrderError;
use crate::domain::shared::{OrderId, Symbol};

/// A request to trade, immutable once handed to the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeIntent {
    /// Client order id, unique for the executor's lifetime.
    pub client_order_id: OrderId,
    /// Instrument to trade.
    pub symbol: Symbol,
    /// Buy or sell.
    pub side: OrderSide,
    /// Unsigned quantity.
    pub quantity: Decimal,
    /// Market or limit.
    pub order_type: OrderType,
    /// Required for limit orders, absent for market orders.
    pub limit_price: Option<Decimal>,
}

impl TradeIntent {
    /// Market intent with a freshly generated client order id.
    #[must_use]
    pub fn market(symbol: impl AsRef<str>, side: OrderSide, quantity: Decimal) -> Self {
        Self {
            client_order_id: OrderId::generate(),
            symbol: Symbol::new(symbol),
            side,
            quantity,
            order_type: OrderType::Market,
            limit_price: None,
        }
    }

    /// Limit intent with a freshly generated client order id.
    #[must_use]
    pub fn limit(
        symbol: impl AsRef<str>,
        side: OrderSide,
        quantity: Decimal,
        limit_price: Decimal,
    ) -> Self {
        Self {
            order_type: OrderType::Limit,
            limit_price: Some(limit_price),
            ..Self::market(symbol, side, quantity)
        }
    }

    /// Replace the generated client order id.
    #[must_use]
    pub fn with_client_order_id(mut self, id: impl Into<OrderId>) -> Self {
        self.client_order_id = id.into();
        self
    }

    /// Quantity with the side's sign applied.
    #[must_use]
    pub fn signed_quantity(&self) -> Decimal {
        self.side.signed(self.quantity)
    }

    /// Validate parameters before anything is sent to a broker.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::InvalidParameters`] naming the first bad field.
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.client_order_id.as_str().trim().is_empty() {
            return Err(OrderError::invalid("client_order_id", "must not be empty"));
        }
        if self.symbol.is_empty() {
            return Err(OrderError::invalid("symbol", "must not be empty"));
        }
        if self.quantity <= Decimal::ZERO {
            return Err(OrderError::invalid(
                "quantity",
                format!("must be positive, got {}", self.quantity),
            ));
        }
        match (self.order_type.requires_limit_price(), self.limit_price) {
            (true, None) => Err(OrderError::invalid(
                "limit_price",
                "limit orders require a limit price",
            )),
            (true, Some(price)) if price <= Decimal::ZERO => Err(OrderError::invalid(
                "limit_price",
                format!("must be positive, got {price}"),
            )),
            (false, Some(_)) => Err(OrderError::invalid(
                "limit_price",
                "market orders cannot carry a limit price",
            )),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn field_of(err: OrderError) -> String {
        match err {
            OrderError::InvalidParameters { field, .. } => field,
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn valid_market_intent() {
        assert!(TradeIntent::market("AAPL", OrderSide::Buy, dec!(10)).validate().is_ok());
    }

    #[test]
    fn zero_quantity_rejected() {
        let err = TradeIntent::market("AAPL", OrderSide::Buy, dec!(0))
            .validate()
            .unwrap_err();
        assert_eq!(field_of(err), "quantity");
    }

    #[test]
    fn negative_quantity_rejected() {
        let err = TradeIntent::market("AAPL", OrderSide::Sell, dec!(-1))
            .validate()
            .unwrap_err();
        assert_eq!(field_of(err), "quantity");
    }

    #[test]
    fn empty_symbol_rejected() {
        let err = TradeIntent::market("  ", OrderSide::Buy, dec!(1))
            .validate()
            .unwrap_err();
        assert_eq!(field_of(err), "symbol");
    }

    #[test]
    fn limit_needs_positive_price() {
        let err = TradeIntent::limit("AAPL", OrderSide::Buy, dec!(1), dec!(0))
            .validate()
            .unwrap_err();
        assert_eq!(field_of(err), "limit_price");
        assert!(
            TradeIntent::limit("AAPL", OrderSide::Buy, dec!(1), dec!(150.25))
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn market_with_limit_price_rejected() {
        let mut intent = TradeIntent::market("AAPL", OrderSide::Buy, dec!(1));
        intent.limit_price = Some(dec!(10));
        assert_eq!(field_of(intent.validate().unwrap_err()), "limit_price");
    }

    #[test]
    fn signed_quantity_follows_side() {
        let sell = TradeIntent::market("AAPL", OrderSide::Sell, dec!(4));
        assert_eq!(sell.signed_quantity(), dec!(-4));
    }
}
