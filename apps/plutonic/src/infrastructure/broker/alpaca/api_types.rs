//! Alpaca API request and response types.
//!
//! These types map directly to Alpaca's REST API format. Quantities and
//! prices travel as decimal strings.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::AlpacaError;
use crate::application::ports::{AccountSnapshot, BrokerOrder, BrokerPosition};
use crate::domain::order_execution::{OrderSide, OrderStatus, OrderType, OrderUpdate, TradeIntent};
use crate::domain::shared::{BrokerId, OrderId, Symbol};

// ============================================================================
// Order Request Types
// ============================================================================

/// Order request for Alpaca API.
#[derive(Debug, Clone, Serialize)]
pub struct AlpacaOrderRequest {
    /// Stock symbol.
    pub symbol: String,
    /// Quantity (shares).
    pub qty: String,
    /// Order side.
    pub side: String,
    /// Order type.
    #[serde(rename = "type")]
    pub order_type: String,
    /// Time in force.
    pub time_in_force: String,
    /// Limit price (for limit orders).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<String>,
    /// Client order ID.
    pub client_order_id: String,
}

impl From<&TradeIntent> for AlpacaOrderRequest {
    fn from(intent: &TradeIntent) -> Self {
        Self {
            symbol: intent.symbol.as_str().to_string(),
            qty: intent.quantity.normalize().to_string(),
            side: intent.side.as_wire().to_string(),
            order_type: intent.order_type.as_wire().to_string(),
            time_in_force: "day".to_string(),
            limit_price: intent.limit_price.map(|p| p.normalize().to_string()),
            client_order_id: intent.client_order_id.as_str().to_string(),
        }
    }
}

// ============================================================================
// Response Types
// ============================================================================

/// Order response from Alpaca API.
#[derive(Debug, Clone, Deserialize)]
pub struct AlpacaOrderResponse {
    /// Broker order ID.
    pub id: String,
    /// Client order ID.
    pub client_order_id: String,
    /// Symbol.
    pub symbol: String,
    /// Ordered quantity; absent for notional orders.
    pub qty: Option<String>,
    /// Filled quantity.
    pub filled_qty: String,
    /// Average fill price.
    pub filled_avg_price: Option<String>,
    /// Order status.
    pub status: String,
    /// Order side.
    pub side: String,
    /// Order type.
    #[serde(rename = "type")]
    pub order_type: String,
    /// Limit price.
    pub limit_price: Option<String>,
    /// Last change timestamp.
    pub updated_at: String,
}

impl AlpacaOrderResponse {
    /// Broker state as an [`OrderUpdate`].
    ///
    /// The sequence is `updated_at` in microseconds; Alpaca bumps it on
    /// every state change of the order.
    pub fn to_order_update(&self) -> Result<OrderUpdate, AlpacaError> {
        let occurred_at = parse_timestamp("updated_at", &self.updated_at)?;
        let sequence = u64::try_from(occurred_at.timestamp_micros()).map_err(|_| {
            AlpacaError::InvalidResponse(format!("updated_at before epoch: {}", self.updated_at))
        })?;

        Ok(OrderUpdate {
            client_order_id: OrderId::new(&self.client_order_id),
            broker_order_id: BrokerId::new(&self.id),
            status: parse_order_status(&self.status),
            filled_quantity: parse_decimal("filled_qty", &self.filled_qty)?,
            avg_fill_price: self
                .filled_avg_price
                .as_deref()
                .map(|p| parse_decimal("filled_avg_price", p))
                .transpose()?,
            sequence,
            occurred_at,
        })
    }

    /// Rebuild the original request and current state.
    pub fn to_broker_order(&self) -> Result<BrokerOrder, AlpacaError> {
        let side = match self.side.as_str() {
            "buy" => OrderSide::Buy,
            "sell" => OrderSide::Sell,
            other => {
                return Err(AlpacaError::InvalidResponse(format!("unknown side '{other}'")));
            }
        };
        let order_type = match self.order_type.as_str() {
            "market" => OrderType::Market,
            "limit" => OrderType::Limit,
            other => {
                return Err(AlpacaError::InvalidResponse(format!(
                    "unsupported order type '{other}'"
                )));
            }
        };
        let quantity = self
            .qty
            .as_deref()
            .ok_or_else(|| AlpacaError::InvalidResponse("order has no qty".to_string()))
            .and_then(|q| parse_decimal("qty", q))?;

        let intent = TradeIntent {
            client_order_id: OrderId::new(&self.client_order_id),
            symbol: Symbol::new(&self.symbol),
            side,
            quantity,
            order_type,
            limit_price: self
                .limit_price
                .as_deref()
                .map(|p| parse_decimal("limit_price", p))
                .transpose()?,
        };

        Ok(BrokerOrder {
            intent,
            update: self.to_order_update()?,
        })
    }
}

/// Account response from Alpaca API.
#[derive(Debug, Clone, Deserialize)]
pub struct AlpacaAccountResponse {
    /// Cash balance.
    pub cash: String,
    /// Buying power.
    pub buying_power: String,
}

impl AlpacaAccountResponse {
    /// Balances as an [`AccountSnapshot`].
    pub fn to_snapshot(&self) -> Result<AccountSnapshot, AlpacaError> {
        Ok(AccountSnapshot {
            cash: parse_decimal("cash", &self.cash)?,
            buying_power: parse_decimal("buying_power", &self.buying_power)?,
        })
    }
}

/// Position response from Alpaca API.
#[derive(Debug, Clone, Deserialize)]
pub struct AlpacaPositionResponse {
    /// Symbol.
    pub symbol: String,
    /// Quantity.
    pub qty: String,
    /// Position side ("long" or "short").
    pub side: String,
    /// Average entry price.
    pub avg_entry_price: String,
}

impl AlpacaPositionResponse {
    /// Position with a signed quantity.
    pub fn to_broker_position(&self) -> Result<BrokerPosition, AlpacaError> {
        let mut quantity = parse_decimal("qty", &self.qty)?;
        if self.side.eq_ignore_ascii_case("short") && quantity.is_sign_positive() {
            quantity = -quantity;
        }
        Ok(BrokerPosition {
            symbol: Symbol::new(&self.symbol),
            quantity,
            avg_entry_price: parse_decimal("avg_entry_price", &self.avg_entry_price)?,
        })
    }
}

/// Error body from Alpaca API.
#[derive(Debug, Clone, Deserialize)]
pub struct AlpacaErrorResponse {
    /// Numeric error code.
    pub code: Option<i64>,
    /// Error message.
    pub message: String,
}

fn parse_decimal(field: &str, value: &str) -> Result<Decimal, AlpacaError> {
    Decimal::from_str(value.trim())
        .map_err(|e| AlpacaError::InvalidResponse(format!("{field} '{value}': {e}")))
}

fn parse_timestamp(field: &str, value: &str) -> Result<DateTime<Utc>, AlpacaError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| AlpacaError::InvalidResponse(format!("{field} '{value}': {e}")))
}

/// Parse Alpaca order status string.
fn parse_order_status(status: &str) -> OrderStatus {
    match status.to_lowercase().as_str() {
        "partially_filled" => OrderStatus::PartiallyFilled,
        "filled" => OrderStatus::Filled,
        "done_for_day" | "expired" => OrderStatus::Expired,
        "canceled" => OrderStatus::Canceled,
        "rejected" => OrderStatus::Rejected,
        // new, accepted, pending_new, pending_cancel, replaced, stopped, ...
        _ => OrderStatus::Submitted,
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn response(status: &str, filled: &str, price: Option<&str>) -> AlpacaOrderResponse {
        AlpacaOrderResponse {
            id: "X1".to_string(),
            client_order_id: "client-1".to_string(),
            symbol: "AAPL".to_string(),
            qty: Some("10".to_string()),
            filled_qty: filled.to_string(),
            filled_avg_price: price.map(str::to_string),
            status: status.to_string(),
            side: "buy".to_string(),
            order_type: "market".to_string(),
            limit_price: None,
            updated_at: "2024-01-15T10:05:00.123456Z".to_string(),
        }
    }

    #[test]
    fn parse_order_status_working() {
        assert_eq!(parse_order_status("new"), OrderStatus::Submitted);
        assert_eq!(parse_order_status("accepted"), OrderStatus::Submitted);
        assert_eq!(parse_order_status("pending_cancel"), OrderStatus::Submitted);
    }

    #[test]
    fn parse_order_status_terminal() {
        assert_eq!(parse_order_status("filled"), OrderStatus::Filled);
        assert_eq!(parse_order_status("canceled"), OrderStatus::Canceled);
        assert_eq!(parse_order_status("rejected"), OrderStatus::Rejected);
        assert_eq!(parse_order_status("done_for_day"), OrderStatus::Expired);
    }

    #[test]
    fn order_update_from_response() {
        let update = response("partially_filled", "4", Some("150.25"))
            .to_order_update()
            .unwrap();
        assert_eq!(update.broker_order_id.as_str(), "X1");
        assert_eq!(update.client_order_id.as_str(), "client-1");
        assert_eq!(update.status, OrderStatus::PartiallyFilled);
        assert_eq!(update.filled_quantity, dec!(4));
        assert_eq!(update.avg_fill_price, Some(dec!(150.25)));
        assert_eq!(update.sequence % 1_000_000, 123_456);
    }

    #[test]
    fn later_updates_have_higher_sequence() {
        let first = response("new", "0", None).to_order_update().unwrap();
        let mut later = response("filled", "10", Some("150"));
        later.updated_at = "2024-01-15T10:05:01Z".to_string();
        assert!(later.to_order_update().unwrap().sequence > first.sequence);
    }

    #[test]
    fn broker_order_rebuilds_intent() {
        let mut raw = response("new", "0", None);
        raw.order_type = "limit".to_string();
        raw.limit_price = Some("149.50".to_string());
        let order = raw.to_broker_order().unwrap();
        assert_eq!(order.intent.order_type, OrderType::Limit);
        assert_eq!(order.intent.limit_price, Some(dec!(149.50)));
        assert_eq!(order.intent.quantity, dec!(10));
        assert_eq!(order.intent.symbol, Symbol::new("AAPL"));
    }

    #[test]
    fn bad_decimal_is_invalid_response() {
        let err = response("filled", "ten", None).to_order_update().unwrap_err();
        assert!(matches!(err, AlpacaError::InvalidResponse(_)));
    }

    #[test]
    fn short_position_is_negative() {
        let raw = AlpacaPositionResponse {
            symbol: "TSLA".to_string(),
            qty: "5".to_string(),
            side: "short".to_string(),
            avg_entry_price: "200".to_string(),
        };
        assert_eq!(raw.to_broker_position().unwrap().quantity, dec!(-5));
    }

    #[test]
    fn request_from_intent() {
        let intent = TradeIntent::market("aapl", OrderSide::Buy, dec!(10.00))
            .with_client_order_id("client-1");
        let request = AlpacaOrderRequest::from(&intent);
        assert_eq!(request.symbol, "AAPL");
        assert_eq!(request.qty, "10");
        assert_eq!(request.side, "buy");
        assert_eq!(request.order_type, "market");
        assert_eq!(request.time_in_force, "day");
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("limit_price").is_none());
        assert_eq!(json["type"], "market");
    }
}
