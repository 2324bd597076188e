//! In-memory state store for testing.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::application::ports::{PersistedState, StateStore, StoreError};

/// Keeps the last saved state in memory.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    state: Mutex<Option<PersistedState>>,
    saves: Mutex<usize>,
}

impl InMemoryStateStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-loaded with `state`.
    #[must_use]
    pub fn with_state(state: PersistedState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
            saves: Mutex::new(0),
        }
    }

    /// Last saved state.
    pub fn snapshot(&self) -> Option<PersistedState> {
        self.state.lock().clone()
    }

    /// Number of completed saves.
    pub fn save_count(&self) -> usize {
        *self.saves.lock()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn save(&self, state: &PersistedState) -> Result<(), StoreError> {
        *self.state.lock() = Some(state.clone());
        *self.saves.lock() += 1;
        Ok(())
    }

    async fn load(&self) -> Result<Option<PersistedState>, StoreError> {
        Ok(self.state.lock().clone())
    }
}
