//! Broker adapters.

pub mod alpaca;
mod in_memory;

pub use in_memory::{BrokerCall, InMemoryBroker};
