//! Engine lifecycle: startup, service loop and shutdown.
//!
//! [`init`] wires the executor and ledger to a broker, verifies the
//! credentials, and recovers state before any intent is accepted.
//! [`Engine::run`] then polls working orders and reconciles positions until
//! cancelled; [`Engine::shutdown`] stops retries and persists state.
//!
//! With a store configured, state is also saved after every submit, cancel
//! and applied update, so a crash loses at most the change in flight.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    AccountSnapshot, BrokerClient, BrokerPosition, EventSink, LogEvent, PersistedState,
    StateStore, StoreError,
};
use crate::config::{Config, EngineConfig};
use crate::domain::order_execution::{OrderRecord, OrderSide, OrderUpdate, TradeIntent, UpdateOutcome};
use crate::domain::position::Position;
use crate::domain::shared::{OrderId, Symbol};
use crate::error::{ExecutionError, FatalError};
use crate::execution::{ExecutorError, OrderExecutor, PollSummary};
use crate::ledger::{BrokerSnapshot, DiscrepancySeverity, PositionLedger, ReconciliationReport};
use crate::retry::RetryRunner;

/// A running trading core.
pub struct Engine {
    broker: Arc<dyn BrokerClient>,
    executor: OrderExecutor<dyn BrokerClient>,
    ledger: Arc<PositionLedger>,
    retry: RetryRunner,
    sink: Arc<dyn EventSink>,
    store: Option<Arc<dyn StateStore>>,
    settings: EngineConfig,
    shutdown: CancellationToken,
}

/// Build an engine and recover its state.
///
/// Steps, in order:
/// 1. `get_account` under the retry policy; rejected credentials yield
///    [`FatalError::Authentication`].
/// 2. If `store` holds saved state, the ledger and order book are restored
///    from it. Otherwise the ledger is seeded from the broker's positions.
/// 3. Orders open at the broker but unknown locally are adopted, when
///    `engine.adopt_open_orders` is set.
///
/// # Errors
///
/// Any [`FatalError`]. Nothing here exits the process.
pub async fn init(
    config: &Config,
    broker: Arc<dyn BrokerClient>,
    sink: Arc<dyn EventSink>,
    store: Option<Arc<dyn StateStore>>,
) -> Result<Engine, FatalError> {
    let shutdown = CancellationToken::new();
    let retry = RetryRunner::new(config.retry.to_policy());
    let ledger = Arc::new(PositionLedger::new(config.ledger.epsilon));
    let executor = OrderExecutor::new(
        Arc::clone(&broker),
        Arc::clone(&ledger),
        retry.clone(),
        Arc::clone(&sink),
        shutdown.clone(),
    );

    sink.emit(LogEvent::info("Initializing Plutonic"));

    let account = match retry
        .run("get_account", &shutdown, || broker.get_account())
        .await
    {
        Ok(account) => account,
        Err(err) => {
            let fatal = FatalError::from_retry(err);
            sink.emit(LogEvent::error("Broker connection failed").with("error", &fatal));
            return Err(fatal);
        }
    };

    let engine = Engine {
        broker,
        executor,
        ledger,
        retry,
        sink,
        store,
        settings: config.engine.clone(),
        shutdown,
    };

    engine.recover().await?;
    if engine.settings.adopt_open_orders {
        engine.adopt_open_orders().await;
    }
    engine.checkpoint().await;

    engine.sink.emit(
        LogEvent::success("Plutonic initialized")
            .with("cash", account.cash)
            .with("buying_power", account.buying_power)
            .with("positions", engine.ledger.open_positions().await.len())
            .with("open_orders", engine.executor.open_orders().await.len()),
    );
    Ok(engine)
}

impl Engine {
    /// Submit an intent.
    ///
    /// # Errors
    ///
    /// See [`OrderExecutor::submit`]; the error is flattened to an
    /// [`ExecutionError`].
    pub async fn submit(&self, intent: TradeIntent) -> Result<OrderRecord, ExecutionError> {
        let result = self.executor.submit(intent).await;
        // Refused before a record was created.
        if !matches!(
            result,
            Err(ExecutorError::Validation(_) | ExecutorError::Duplicate { .. })
        ) {
            self.checkpoint().await;
        }
        Ok(result?)
    }

    /// Market buy.
    ///
    /// # Errors
    ///
    /// As for [`Engine::submit`].
    pub async fn execute_buy(
        &self,
        symbol: impl AsRef<str>,
        quantity: Decimal,
    ) -> Result<OrderRecord, ExecutionError> {
        self.submit(TradeIntent::market(symbol, OrderSide::Buy, quantity))
            .await
    }

    /// Market sell.
    ///
    /// # Errors
    ///
    /// As for [`Engine::submit`].
    pub async fn execute_sell(
        &self,
        symbol: impl AsRef<str>,
        quantity: Decimal,
    ) -> Result<OrderRecord, ExecutionError> {
        self.submit(TradeIntent::market(symbol, OrderSide::Sell, quantity))
            .await
    }

    /// Cancel an order.
    ///
    /// # Errors
    ///
    /// `ORDER_NOT_FOUND` for unknown ids, `ORDER_CONFLICT` for terminal
    /// orders, or the broker failure.
    pub async fn cancel(&self, id: &OrderId) -> Result<OrderRecord, ExecutionError> {
        let result = self.executor.cancel(id).await;
        if !matches!(result, Err(ExecutorError::NotFound { .. })) {
            self.checkpoint().await;
        }
        Ok(result?)
    }

    /// Feed a pushed broker update.
    ///
    /// # Errors
    ///
    /// `ORDER_NOT_FOUND` or `INVALID_BROKER_UPDATE`.
    pub async fn apply_update(&self, update: OrderUpdate) -> Result<UpdateOutcome, ExecutionError> {
        let outcome = self.executor.apply_update(update).await?;
        if matches!(outcome, UpdateOutcome::Applied { .. }) {
            self.checkpoint().await;
        }
        Ok(outcome)
    }

    /// One poll pass over working orders.
    pub async fn poll(&self) -> PollSummary {
        let summary = self.executor.poll().await;
        if summary.applied > 0 {
            self.checkpoint().await;
        }
        summary
    }

    /// Current account balances.
    ///
    /// # Errors
    ///
    /// The retry outcome if the broker call failed.
    pub async fn account(&self) -> Result<AccountSnapshot, ExecutionError> {
        Ok(self
            .retry
            .run("get_account", &self.shutdown, || self.broker.get_account())
            .await?)
    }

    /// Compare the ledger with the broker's positions.
    ///
    /// Each discrepancy is emitted as a warning (critical ones as errors).
    /// The ledger is left untouched.
    ///
    /// # Errors
    ///
    /// The retry outcome if positions could not be fetched.
    pub async fn reconcile_now(&self) -> Result<ReconciliationReport, ExecutionError> {
        let positions = self
            .retry
            .run("list_positions", &self.shutdown, || {
                self.broker.list_positions()
            })
            .await?;
        let report = self.ledger.reconcile(&BrokerSnapshot::new(positions)).await;

        if report.is_clean() {
            self.sink.emit(
                LogEvent::success("Positions reconciled")
                    .with("symbols", report.symbols_checked)
                    .with("ledger_version", report.ledger_version),
            );
        }
        for discrepancy in &report.discrepancies {
            let event = match discrepancy.severity {
                DiscrepancySeverity::Warning => LogEvent::warning("Position discrepancy"),
                DiscrepancySeverity::Critical => LogEvent::error("Position discrepancy"),
            };
            self.sink.emit(
                event
                    .with("symbol", &discrepancy.symbol)
                    .with("local_qty", discrepancy.local_qty)
                    .with("broker_qty", discrepancy.broker_qty)
                    .with("severity", discrepancy.severity),
            );
        }
        Ok(report)
    }

    /// Overwrite the ledger's position in `symbol` with the broker's.
    ///
    /// Operator action for a reported discrepancy.
    ///
    /// # Errors
    ///
    /// The retry outcome if the position could not be fetched.
    pub async fn adopt_broker_position(&self, symbol: &Symbol) -> Result<Position, ExecutionError> {
        let broker_position = self
            .retry
            .run("get_position", &self.shutdown, || {
                self.broker.get_position(symbol)
            })
            .await?
            .unwrap_or_else(|| BrokerPosition {
                symbol: symbol.clone(),
                quantity: Decimal::ZERO,
                avg_entry_price: Decimal::ZERO,
            });
        let position = self.ledger.adopt_broker_position(&broker_position).await;
        self.sink.emit(
            LogEvent::warning("Ledger position replaced with broker position")
                .with("symbol", symbol)
                .with("quantity", position.quantity),
        );
        Ok(position)
    }

    /// Poll and reconcile on their intervals until `cancel` fires.
    ///
    /// `cancel` is watched for the whole run, including while a poll or
    /// reconcile is waiting out a retry backoff. Firing it starts shutdown,
    /// which interrupts that retry.
    pub async fn run(&self, cancel: CancellationToken) {
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => shutdown.cancel(),
                () = shutdown.cancelled() => {}
            }
        });

        let mut poll = time::interval(self.settings.poll_interval());
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut reconcile = time::interval(self.settings.reconcile_interval());
        reconcile.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            poll_interval_ms = self.settings.poll_interval_ms,
            reconcile_interval_secs = self.settings.reconcile_interval_secs,
            "Engine running"
        );

        loop {
            tokio::select! {
                biased;

                () = self.shutdown.cancelled() => break,
                _ = poll.tick() => {
                    self.poll().await;
                }
                _ = reconcile.tick() => {
                    if let Err(err) = self.reconcile_now().await {
                        tracing::warn!(error = %err, "Reconciliation skipped");
                    }
                }
            }
        }

        tracing::info!("Engine stopped");
    }

    /// Stop new retries and persist state.
    ///
    /// # Errors
    ///
    /// The store error if saving failed.
    pub async fn shutdown(&self) -> Result<(), StoreError> {
        self.shutdown.cancel();
        self.persist().await?;
        self.sink.emit(LogEvent::info("Plutonic shut down"));
        Ok(())
    }

    /// Save orders and positions, if a store is configured.
    ///
    /// # Errors
    ///
    /// The store error if saving failed.
    pub async fn persist(&self) -> Result<(), StoreError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let state = PersistedState {
            orders: self.executor.records().await,
            positions: self.ledger.open_positions().await,
            saved_at: Utc::now(),
        };
        if let Err(err) = store.save(&state).await {
            self.sink
                .emit(LogEvent::error("Failed to persist state").with("error", &err));
            return Err(err);
        }
        tracing::debug!(
            orders = state.orders.len(),
            positions = state.positions.len(),
            "State persisted"
        );
        Ok(())
    }

    /// Whether shutdown has begun.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// The order executor.
    pub const fn executor(&self) -> &OrderExecutor<dyn BrokerClient> {
        &self.executor
    }

    /// The position ledger.
    pub const fn ledger(&self) -> &Arc<PositionLedger> {
        &self.ledger
    }

    async fn checkpoint(&self) {
        // `persist` reports its own failures.
        let _ = self.persist().await;
    }

    async fn recover(&self) -> Result<(), FatalError> {
        let saved = match &self.store {
            Some(store) => store.load().await?,
            None => None,
        };

        if let Some(state) = saved {
            self.sink.emit(
                LogEvent::info("Restoring persisted state")
                    .with("orders", state.orders.len())
                    .with("positions", state.positions.len())
                    .with("saved_at", state.saved_at),
            );
            self.ledger.restore(state.positions).await;
            self.executor.restore(state.orders).await;
            return Ok(());
        }

        let positions = self
            .retry
            .run("list_positions", &self.shutdown, || {
                self.broker.list_positions()
            })
            .await
            .map_err(FatalError::from_retry)?;
        for position in &positions {
            self.ledger.adopt_broker_position(position).await;
        }
        self.sink.emit(
            LogEvent::info("Ledger seeded from broker positions").with("positions", positions.len()),
        );
        Ok(())
    }

    async fn adopt_open_orders(&self) {
        let orders = match self
            .retry
            .run("list_open_orders", &self.shutdown, || {
                self.broker.list_open_orders()
            })
            .await
        {
            Ok(orders) => orders,
            Err(err) => {
                self.sink.emit(
                    LogEvent::warning("Could not load open broker orders").with("error", &err),
                );
                return;
            }
        };

        for order in orders {
            let id = order.intent.client_order_id.clone();
            if let Err(err) = self.executor.adopt(order).await {
                self.sink.emit(
                    LogEvent::warning("Skipped open broker order")
                        .with("order_id", &id)
                        .with("error", &err),
                );
            }
        }
    }
}
