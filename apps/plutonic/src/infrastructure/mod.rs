//! Infrastructure Layer
//!
//! Adapters implementing the application ports.
//!
//! - `broker`: Alpaca REST adapter and an in-memory broker
//! - `persistence`: JSON file and in-memory state stores
//! - `logging`: event sinks backed by `tracing` or kept in memory

pub mod broker;
pub mod logging;
pub mod persistence;
