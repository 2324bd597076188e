//! Engine loop and ledger configuration.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ledger::DEFAULT_EPSILON;

/// Service loop settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How often working orders are polled.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// How often the ledger is reconciled against the broker.
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,
    /// Track orders found open at the broker on startup.
    #[serde(default = "default_adopt_open_orders")]
    pub adopt_open_orders: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            reconcile_interval_secs: default_reconcile_interval_secs(),
            adopt_open_orders: default_adopt_open_orders(),
        }
    }
}

impl EngineConfig {
    /// Poll interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Reconcile interval.
    #[must_use]
    pub const fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }
}

/// Position ledger settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Largest quantity gap reconciliation tolerates.
    #[serde(default = "default_epsilon")]
    pub epsilon: Decimal,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            epsilon: default_epsilon(),
        }
    }
}

const fn default_poll_interval_ms() -> u64 {
    1_000
}

const fn default_reconcile_interval_secs() -> u64 {
    60
}

const fn default_adopt_open_orders() -> bool {
    true
}

const fn default_epsilon() -> Decimal {
    DEFAULT_EPSILON
}
