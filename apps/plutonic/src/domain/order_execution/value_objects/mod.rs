//! Order Execution Value Objects

mod order_side;
mod order_status;
mod order_type;
mod order_update;
mod trade_intent;

pub use order_side::OrderSide;
pub use order_status::OrderStatus;
pub use order_type::OrderType;
pub use order_update::OrderUpdate;
pub use trade_intent::TradeIntent;
