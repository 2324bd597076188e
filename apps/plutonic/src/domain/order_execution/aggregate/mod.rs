//! Order Aggregate

mod order_record;

pub use order_record::{AppliedFill, OrderRecord, UpdateOutcome};
