//! State Store Port (Driven Port)
//!
//! Optional crash-recovery persistence for order records and positions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::order_execution::OrderRecord;
use crate::domain::position::Position;

/// Everything needed to rebuild the executor and ledger after a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    /// Every order record known to the executor.
    pub orders: Vec<OrderRecord>,
    /// Every non-flat position in the ledger.
    pub positions: Vec<Position>,
    /// When the state was captured.
    pub saved_at: DateTime<Utc>,
}

/// Persistence error.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("State store I/O error at '{path}': {source}")]
    Io {
        /// Path being accessed.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// The stored document could not be (de)serialized.
    #[error("State store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Port for saving and reloading state.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Replace the stored state.
    async fn save(&self, state: &PersistedState) -> Result<(), StoreError>;

    /// Load the stored state, `None` if nothing has been saved yet.
    async fn load(&self) -> Result<Option<PersistedState>, StoreError>;
}
