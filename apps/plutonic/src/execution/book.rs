//! Order book: every record the executor owns, each behind its own lock.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use super::ExecutorError;
use crate::domain::order_execution::{OrderRecord, OrderUpdate};
use crate::domain::shared::{BrokerId, OrderId};

/// Shared handle to one record. Holding its lock serializes every mutation
/// of that order.
pub type OrderHandle = Arc<Mutex<OrderRecord>>;

/// Records indexed by client order id, with a broker id lookup.
#[derive(Debug, Default)]
pub struct OrderBook {
    orders: RwLock<HashMap<OrderId, OrderHandle>>,
    broker_ids: RwLock<HashMap<BrokerId, OrderId>>,
}

impl OrderBook {
    /// Create an empty book.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new record and return it already locked, so no other task
    /// can touch it before the caller is done.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::Duplicate`] if the client order id was seen before.
    pub async fn insert_locked(
        &self,
        record: OrderRecord,
    ) -> Result<OwnedMutexGuard<OrderRecord>, ExecutorError> {
        let id = record.id().clone();
        let handle = Arc::new(Mutex::new(record));
        let guard = Arc::clone(&handle).lock_owned().await;

        match self.orders.write().await.entry(id) {
            Entry::Occupied(existing) => Err(ExecutorError::Duplicate {
                order_id: existing.key().clone(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(handle);
                Ok(guard)
            }
        }
    }

    /// Handle for a client order id.
    pub async fn get(&self, id: &OrderId) -> Option<OrderHandle> {
        self.orders.read().await.get(id).map(Arc::clone)
    }

    /// Handle for a broker order id.
    pub async fn get_by_broker_id(&self, broker_id: &BrokerId) -> Option<OrderHandle> {
        let id = self.broker_ids.read().await.get(broker_id).cloned()?;
        self.get(&id).await
    }

    /// Find the record a broker update refers to.
    pub async fn resolve(&self, update: &OrderUpdate) -> Option<OrderHandle> {
        match self.get(&update.client_order_id).await {
            Some(handle) => Some(handle),
            None => self.get_by_broker_id(&update.broker_order_id).await,
        }
    }

    /// Remember which client order a broker id belongs to.
    pub async fn link(&self, broker_id: BrokerId, id: OrderId) {
        self.broker_ids.write().await.insert(broker_id, id);
    }

    /// True if the client order id is already known.
    pub async fn contains(&self, id: &OrderId) -> bool {
        self.orders.read().await.contains_key(id)
    }

    /// All handles, ordered by client order id.
    pub async fn handles(&self) -> Vec<(OrderId, OrderHandle)> {
        let mut handles: Vec<_> = self
            .orders
            .read()
            .await
            .iter()
            .map(|(id, handle)| (id.clone(), Arc::clone(handle)))
            .collect();
        handles.sort_by(|a, b| a.0.cmp(&b.0));
        handles
    }

    /// Copy of every record.
    pub async fn records(&self) -> Vec<OrderRecord> {
        let mut records = Vec::new();
        for (_, handle) in self.handles().await {
            records.push(handle.lock().await.clone());
        }
        records
    }

    /// Number of records.
    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }

    /// True if no records are held.
    pub async fn is_empty(&self) -> bool {
        self.orders.read().await.is_empty()
    }

    /// Replace the contents with persisted records.
    pub async fn restore(&self, records: Vec<OrderRecord>) {
        let mut orders = self.orders.write().await;
        let mut broker_ids = self.broker_ids.write().await;
        orders.clear();
        broker_ids.clear();
        for record in records {
            if let Some(broker_id) = record.broker_order_id() {
                broker_ids.insert(broker_id.clone(), record.id().clone());
            }
            orders.insert(record.id().clone(), Arc::new(Mutex::new(record)));
        }
    }
}
