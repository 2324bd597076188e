//! Application Ports (Driven)
//!
//! Interfaces the core calls out through. Adapters live under
//! [`crate::infrastructure`].

mod broker_port;
mod event_sink_port;
mod state_store_port;

pub use broker_port::{AccountSnapshot, BrokerClient, BrokerError, BrokerOrder, BrokerPosition};
pub use event_sink_port::{EventSink, LogEvent, NoOpEventSink, Severity};
pub use state_store_port::{PersistedState, StateStore, StoreError};
