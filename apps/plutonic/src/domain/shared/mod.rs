//! Shared Domain Types
//!
//! Value objects used by more than one bounded context.

pub mod value_objects;

pub use value_objects::{BrokerId, OrderId, Symbol};
