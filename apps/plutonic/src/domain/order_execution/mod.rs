//! Order Execution Bounded Context
//!
//! A [`TradeIntent`] becomes an [`OrderRecord`] when handed to the executor.
//! The record moves through the lifecycle below and never leaves a terminal
//! state once reached:
//!
//! ```text
//! Pending -> Submitted -> PartiallyFilled <-> PartiallyFilled
//!                      -> Filled | Rejected | Canceled | Expired
//! ```

pub mod aggregate;
pub mod errors;
pub mod services;
pub mod value_objects;

pub use aggregate::{AppliedFill, OrderRecord, UpdateOutcome};
pub use errors::OrderError;
pub use services::OrderStateMachine;
pub use value_objects::{OrderSide, OrderStatus, OrderType, OrderUpdate, TradeIntent};
