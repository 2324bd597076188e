//! Domain Layer
//!
//! Business rules for order lifecycles and positions, free of I/O.
//!
//! # Bounded Contexts
//!
//! - [`order_execution`]: Trade intents, order records and their state machine
//! - [`position`]: Signed positions with weighted-average cost

pub mod order_execution;
pub mod position;
pub mod shared;
