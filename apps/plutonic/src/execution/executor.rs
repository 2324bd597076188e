//! Order executor service.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;

use super::{ExecutorError, OrderBook};
use crate::application::ports::{BrokerClient, BrokerError, BrokerOrder, EventSink, LogEvent};
use crate::domain::order_execution::{
    OrderRecord, OrderStatus, OrderUpdate, TradeIntent, UpdateOutcome,
};
use crate::domain::shared::{BrokerId, OrderId};
use crate::ledger::PositionLedger;
use crate::retry::{RetryError, RetryRunner};

/// Counts from one [`OrderExecutor::poll`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    /// Working orders queried.
    pub checked: usize,
    /// Updates that changed a record.
    pub applied: usize,
    /// Updates already seen.
    pub duplicates: usize,
    /// Orders that reached a terminal state during this pass.
    pub completed: usize,
    /// Orders whose query or update failed.
    pub failed: usize,
}

/// Drives orders through their lifecycle.
pub struct OrderExecutor<B: BrokerClient + ?Sized> {
    broker: Arc<B>,
    ledger: Arc<PositionLedger>,
    retry: RetryRunner,
    book: OrderBook,
    sink: Arc<dyn EventSink>,
    shutdown: CancellationToken,
}

impl<B: BrokerClient + ?Sized> OrderExecutor<B> {
    /// Create an executor.
    ///
    /// `shutdown` stops new retry attempts once cancelled.
    pub fn new(
        broker: Arc<B>,
        ledger: Arc<PositionLedger>,
        retry: RetryRunner,
        sink: Arc<dyn EventSink>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            broker,
            ledger,
            retry,
            book: OrderBook::new(),
            sink,
            shutdown,
        }
    }

    /// The ledger fills are applied to.
    pub const fn ledger(&self) -> &Arc<PositionLedger> {
        &self.ledger
    }

    /// Submit a trade intent.
    ///
    /// The record is created in `Pending` and its lock is held until the
    /// broker answers, so it always leaves `Pending` for `Submitted` or
    /// `Rejected` before anyone else can observe it.
    ///
    /// Once a request may have reached the broker, every later attempt and
    /// the final failure path first look the order up by client order id. An
    /// order accepted behind a lost response is tracked, never re-sent.
    ///
    /// # Errors
    ///
    /// - [`ExecutorError::Validation`] if the intent is invalid
    /// - [`ExecutorError::Duplicate`] if the client order id was used before
    /// - [`ExecutorError::Broker`] if the broker refused the order
    /// - [`ExecutorError::Retry`] if retries were exhausted or cancelled
    pub async fn submit(&self, intent: TradeIntent) -> Result<OrderRecord, ExecutorError> {
        if let Err(err) = intent.validate() {
            self.sink.emit(
                LogEvent::warning("Trade intent rejected")
                    .with("order_id", &intent.client_order_id)
                    .with("reason", &err),
            );
            return Err(ExecutorError::Validation(err));
        }

        let mut record = self.book.insert_locked(OrderRecord::new(intent.clone())).await?;
        let id = intent.client_order_id.clone();
        self.sink.emit(
            LogEvent::info("Submitting order")
                .with("order_id", &id)
                .with("symbol", &intent.symbol)
                .with("side", intent.side)
                .with("quantity", intent.quantity)
                .with("type", intent.order_type),
        );

        let sent = AtomicBool::new(false);
        let mut result = self
            .retry
            .run("submit_order", &self.shutdown, || {
                self.submit_attempt(&intent, &sent)
            })
            .await;
        if result.is_err() && sent.load(Ordering::Acquire) {
            if let Some(broker_id) = self.find_accepted(&id).await {
                result = Ok(broker_id);
            }
        }

        match result {
            Ok(broker_id) => {
                record
                    .mark_submitted(broker_id.clone())
                    .map_err(|source| ExecutorError::Update {
                        order_id: id.clone(),
                        source,
                    })?;
                self.book.link(broker_id.clone(), id.clone()).await;
                self.sink.emit(
                    LogEvent::success("Order submitted")
                        .with("order_id", &id)
                        .with("broker_order_id", &broker_id),
                );
                Ok(record.clone())
            }
            Err(err) => {
                // Pending -> Rejected is always a valid transition.
                let _ = record.reject(err.to_string());
                self.sink.emit(
                    LogEvent::error("Order submission failed")
                        .with("order_id", &id)
                        .with("attempts", err.attempts())
                        .with("error", &err),
                );
                Err(ExecutorError::from_retry(&id, err))
            }
        }
    }

    async fn submit_attempt(
        &self,
        intent: &TradeIntent,
        sent: &AtomicBool,
    ) -> Result<BrokerId, BrokerError> {
        if sent.load(Ordering::Acquire) {
            if let Some(existing) = self.broker.find_order(&intent.client_order_id).await? {
                tracing::warn!(
                    order_id = %intent.client_order_id,
                    broker_order_id = %existing.broker_order_id,
                    "Order accepted during a failed attempt, not resending"
                );
                return Ok(existing.broker_order_id);
            }
        }
        sent.store(true, Ordering::Release);
        self.broker.submit_order(intent).await
    }

    /// One bounded lookup after submission failed. Lookup errors count as
    /// "not found".
    async fn find_accepted(&self, id: &OrderId) -> Option<BrokerId> {
        let timeout = self.retry.policy().call_timeout;
        match tokio::time::timeout(timeout, self.broker.find_order(id)).await {
            Ok(Ok(Some(existing))) => {
                self.sink.emit(
                    LogEvent::warning("Recovered order accepted during a failed attempt")
                        .with("order_id", id)
                        .with("broker_order_id", &existing.broker_order_id),
                );
                Some(existing.broker_order_id)
            }
            Ok(Ok(None)) => None,
            Ok(Err(err)) => {
                tracing::warn!(order_id = %id, error = %err, "Lookup after failed submit failed");
                None
            }
            Err(_) => {
                tracing::warn!(order_id = %id, "Lookup after failed submit timed out");
                None
            }
        }
    }

    /// Cancel an order.
    ///
    /// # Errors
    ///
    /// - [`ExecutorError::NotFound`] if the id is unknown
    /// - [`ExecutorError::Conflict`] if the order is already terminal
    /// - [`ExecutorError::Broker`] / [`ExecutorError::Retry`] if the broker
    ///   call failed
    pub async fn cancel(&self, id: &OrderId) -> Result<OrderRecord, ExecutorError> {
        let handle = self
            .book
            .get(id)
            .await
            .ok_or_else(|| ExecutorError::NotFound {
                order_id: id.to_string(),
            })?;
        let mut record = handle.lock().await;

        if record.status().is_terminal() {
            return Err(ExecutorError::Conflict {
                order_id: id.clone(),
                status: record.status(),
            });
        }

        let Some(broker_id) = record.broker_order_id().cloned() else {
            record.cancel().map_err(|source| ExecutorError::Update {
                order_id: id.clone(),
                source,
            })?;
            self.sink
                .emit(LogEvent::warning("Unacknowledged order canceled locally").with("order_id", id));
            return Ok(record.clone());
        };

        let result = self
            .retry
            .run("cancel_order", &self.shutdown, || {
                self.broker.cancel_order(&broker_id)
            })
            .await;

        match result {
            Ok(()) => {
                // Pick up any fills that landed before the cancel took effect.
                self.refresh_locked(&mut record).await;
                if !record.status().is_terminal() {
                    record.cancel().map_err(|source| ExecutorError::Update {
                        order_id: id.clone(),
                        source,
                    })?;
                }
                self.sink.emit(
                    LogEvent::success("Order canceled")
                        .with("order_id", id)
                        .with("filled_quantity", record.filled_quantity()),
                );
                Ok(record.clone())
            }
            Err(RetryError::NonRetryable(BrokerError::NotFound { resource })) => {
                // Gone from the broker's book: learn how it ended.
                self.refresh_locked(&mut record).await;
                match record.status() {
                    OrderStatus::Canceled => Ok(record.clone()),
                    status if status.is_terminal() => Err(ExecutorError::Conflict {
                        order_id: id.clone(),
                        status,
                    }),
                    _ => Err(ExecutorError::Broker {
                        order_id: id.clone(),
                        source: BrokerError::NotFound { resource },
                    }),
                }
            }
            Err(err) => {
                self.sink.emit(
                    LogEvent::error("Order cancel failed")
                        .with("order_id", id)
                        .with("error", &err),
                );
                Err(ExecutorError::from_retry(id, err))
            }
        }
    }

    /// Query the broker for every working order and apply what changed.
    ///
    /// Failures for individual orders are counted, not returned.
    pub async fn poll(&self) -> PollSummary {
        let mut summary = PollSummary::default();

        for (id, handle) in self.book.handles().await {
            if self.shutdown.is_cancelled() {
                break;
            }

            let broker_id = {
                let record = handle.lock().await;
                match record.broker_order_id() {
                    Some(broker_id) if !record.status().is_terminal() => broker_id.clone(),
                    _ => continue,
                }
            };
            summary.checked += 1;

            let update = match self
                .retry
                .run("get_order", &self.shutdown, || {
                    self.broker.get_order(&broker_id)
                })
                .await
            {
                Ok(update) => update,
                Err(err) => {
                    summary.failed += 1;
                    tracing::warn!(order_id = %id, error = %err, "Failed to poll order");
                    continue;
                }
            };

            let mut record = handle.lock().await;
            match self.apply_locked(&mut record, &update).await {
                Ok(UpdateOutcome::Duplicate { .. }) => summary.duplicates += 1,
                Ok(UpdateOutcome::Applied { status, .. }) => {
                    summary.applied += 1;
                    if status.is_terminal() {
                        summary.completed += 1;
                    }
                }
                Err(_) => summary.failed += 1,
            }
        }

        tracing::debug!(
            checked = summary.checked,
            applied = summary.applied,
            duplicates = summary.duplicates,
            failed = summary.failed,
            "Poll completed"
        );
        summary
    }

    /// Apply a pushed or polled broker update.
    ///
    /// # Errors
    ///
    /// - [`ExecutorError::NotFound`] if no tracked order matches
    /// - [`ExecutorError::Update`] if the update breaks an order invariant
    pub async fn apply_update(&self, update: OrderUpdate) -> Result<UpdateOutcome, ExecutorError> {
        let handle = self
            .book
            .resolve(&update)
            .await
            .ok_or_else(|| ExecutorError::NotFound {
                order_id: update.client_order_id.to_string(),
            })?;
        let mut record = handle.lock().await;
        self.apply_locked(&mut record, &update).await
    }

    /// Track an order found working at the broker but unknown locally.
    ///
    /// Returns `false` if the order was already tracked.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::Update`] if the broker's record is inconsistent.
    pub async fn adopt(&self, order: BrokerOrder) -> Result<bool, ExecutorError> {
        let id = order.intent.client_order_id.clone();
        if self.book.contains(&id).await {
            return Ok(false);
        }
        let record = OrderRecord::adopt(order.intent, &order.update).map_err(|source| {
            ExecutorError::Update {
                order_id: id.clone(),
                source,
            }
        })?;
        let status = record.status();
        drop(self.book.insert_locked(record).await?);
        self.book
            .link(order.update.broker_order_id.clone(), id.clone())
            .await;
        self.sink.emit(
            LogEvent::info("Adopted open broker order")
                .with("order_id", &id)
                .with("broker_order_id", &order.update.broker_order_id)
                .with("status", status),
        );
        Ok(true)
    }

    /// Copy of one record.
    pub async fn get(&self, id: &OrderId) -> Option<OrderRecord> {
        let handle = self.book.get(id).await?;
        let record = handle.lock().await.clone();
        Some(record)
    }

    /// Copies of every non-terminal record.
    pub async fn open_orders(&self) -> Vec<OrderRecord> {
        self.book
            .records()
            .await
            .into_iter()
            .filter(|r| !r.status().is_terminal())
            .collect()
    }

    /// Copies of every record.
    pub async fn records(&self) -> Vec<OrderRecord> {
        self.book.records().await
    }

    /// Replace tracked orders with persisted records.
    pub async fn restore(&self, records: Vec<OrderRecord>) {
        let count = records.len();
        self.book.restore(records).await;
        tracing::info!(orders = count, "Order book restored");
    }

    async fn refresh_locked(&self, record: &mut OrderRecord) {
        let Some(broker_id) = record.broker_order_id().cloned() else {
            return;
        };
        match self
            .retry
            .run("get_order", &self.shutdown, || {
                self.broker.get_order(&broker_id)
            })
            .await
        {
            Ok(update) => {
                let _ = self.apply_locked(record, &update).await;
            }
            Err(err) => {
                tracing::warn!(order_id = %record.id(), error = %err, "Failed to refresh order");
            }
        }
    }

    /// Apply `update` and its fill together: the record is only changed
    /// once the ledger has accepted the fill.
    async fn apply_locked(
        &self,
        record: &mut OrderRecord,
        update: &OrderUpdate,
    ) -> Result<UpdateOutcome, ExecutorError> {
        let had_broker_id = record.broker_order_id().is_some();
        let mut next = record.clone();
        let outcome = match next.apply_update(update) {
            Ok(outcome) => outcome,
            Err(source) => {
                self.sink.emit(
                    LogEvent::error("Broker update rejected")
                        .with("order_id", record.id())
                        .with("sequence", update.sequence)
                        .with("error", &source),
                );
                return Err(ExecutorError::Update {
                    order_id: record.id().clone(),
                    source,
                });
            }
        };

        let UpdateOutcome::Applied {
            previous,
            status,
            fill,
        } = &outcome
        else {
            tracing::debug!(
                order_id = %record.id(),
                sequence = update.sequence,
                "Ignoring replayed order update"
            );
            return Ok(outcome);
        };

        if let Some(fill) = fill {
            let position = match self
                .ledger
                .apply_fill(&fill.symbol, fill.signed_quantity, fill.price)
                .await
            {
                Ok(position) => position,
                Err(source) => {
                    self.sink.emit(
                        LogEvent::error("Fill rejected by ledger")
                            .with("order_id", record.id())
                            .with("sequence", update.sequence)
                            .with("error", &source),
                    );
                    return Err(ExecutorError::Ledger {
                        order_id: record.id().clone(),
                        source,
                    });
                }
            };
            self.sink.emit(
                LogEvent::info("Fill applied")
                    .with("order_id", record.id())
                    .with("symbol", &fill.symbol)
                    .with("quantity", fill.signed_quantity)
                    .with("price", fill.price)
                    .with("position", position.quantity),
            );
        }
        *record = next;

        if !had_broker_id {
            self.book
                .link(update.broker_order_id.clone(), record.id().clone())
                .await;
        }

        if previous != status {
            self.emit_status_change(record, *status);
        }
        Ok(outcome)
    }

    fn emit_status_change(&self, record: &OrderRecord, status: OrderStatus) {
        let event = match status {
            OrderStatus::Filled => LogEvent::success("Order filled"),
            OrderStatus::Rejected => LogEvent::error("Order rejected by broker"),
            OrderStatus::Canceled | OrderStatus::Expired => LogEvent::warning("Order closed unfilled"),
            _ => LogEvent::info("Order status changed"),
        };
        self.sink.emit(
            event
                .with("order_id", record.id())
                .with("status", status)
                .with("filled_quantity", record.filled_quantity()),
        );
    }
}
