//! Shared Value Objects

mod identifiers;
mod symbol;

pub use identifiers::{BrokerId, OrderId};
pub use symbol::Symbol;
