// Allow unwrap/expect in tests - tests should panic on unexpected errors
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Plutonic - Order Execution Core
//!
//! Turns trade intents into broker orders, tracks each order to a terminal
//! state, and keeps a position ledger that can be reconciled against the
//! broker.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: orders, their state machine, positions
//!   - `order_execution`: `TradeIntent`, `OrderRecord`, `OrderStatus`, `OrderUpdate`
//!   - `position`: weighted-average-cost `Position`
//!   - `shared`: `OrderId`, `BrokerId`, `Symbol`
//!
//! - **Application**: ports for external systems
//!   - `BrokerClient`, `EventSink`, `StateStore`
//!
//! - **Services**
//!   - `retry`: backoff, per-call timeout, cooperative cancellation
//!   - `execution`: `OrderExecutor` with per-order locking
//!   - `ledger`: `PositionLedger` with per-symbol locking and reconciliation
//!   - `engine`: startup, service loop, shutdown
//!
//! - **Infrastructure**: adapters
//!   - `broker`: Alpaca REST adapter, in-memory broker
//!   - `persistence`: JSON file and in-memory state stores
//!   - `logging`: tracing-backed and recording event sinks

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Layers
// =============================================================================

/// Domain layer - orders and positions, no I/O.
pub mod domain;

/// Application layer - port definitions.
pub mod application;

/// Infrastructure layer - adapters.
pub mod infrastructure;

// =============================================================================
// Services
// =============================================================================

pub mod engine;
pub mod execution;
pub mod ledger;
pub mod retry;

// =============================================================================
// Ambient
// =============================================================================

pub mod config;
pub mod error;
pub mod telemetry;

// =============================================================================
// Re-exports
// =============================================================================

pub use application::ports::{BrokerClient, BrokerError, EventSink, LogEvent, Severity};
pub use domain::order_execution::{
    OrderRecord, OrderSide, OrderStatus, OrderType, OrderUpdate, TradeIntent,
};
pub use domain::position::Position;
pub use domain::shared::{BrokerId, OrderId, Symbol};
pub use engine::{Engine, init};
pub use error::{ErrorCode, ExecutionError, FatalError};
pub use execution::{ExecutorError, OrderExecutor};
pub use ledger::{PositionLedger, ReconciliationReport};
pub use retry::{RetryError, RetryPolicy, RetryRunner};
