//! Application Layer
//!
//! Ports through which the core talks to brokers, storage and logging.
//! Orchestration lives in [`crate::execution`] and [`crate::ledger`].

pub mod ports;
