//! End-to-end tests for the execution core.
//!
//! Drives a full engine (executor, ledger, retry, persistence) against the
//! in-memory broker, from `init` through `shutdown`.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

use plutonic::application::ports::{BrokerClient, BrokerError, EventSink, StateStore};
use plutonic::config::{Config, load_config_from_string};
use plutonic::domain::order_execution::{OrderSide, OrderStatus, TradeIntent, UpdateOutcome};
use plutonic::infrastructure::broker::{BrokerCall, InMemoryBroker};
use plutonic::infrastructure::logging::RecordingEventSink;
use plutonic::infrastructure::persistence::InMemoryStateStore;
use plutonic::{Engine, ErrorCode, FatalError, OrderId, Severity, Symbol};

const FAST_CONFIG: &str = r"
retry:
  max_attempts: 5
  base_delay_ms: 1
  max_delay_ms: 5
  call_timeout_ms: 1000
engine:
  poll_interval_ms: 10
  reconcile_interval_secs: 60
";

struct Setup {
    broker: Arc<InMemoryBroker>,
    sink: Arc<RecordingEventSink>,
    store: Arc<InMemoryStateStore>,
    config: Config,
}

impl Setup {
    fn new() -> Self {
        Self::with_config(FAST_CONFIG)
    }

    fn with_config(yaml: &str) -> Self {
        let broker = Arc::new(InMemoryBroker::new());
        broker.set_account(dec!(100000), dec!(200000));
        Self {
            broker,
            sink: Arc::new(RecordingEventSink::new()),
            store: Arc::new(InMemoryStateStore::new()),
            config: load_config_from_string(yaml).unwrap(),
        }
    }

    async fn init(&self) -> Result<Engine, FatalError> {
        let broker: Arc<dyn BrokerClient> = self.broker.clone();
        let sink: Arc<dyn EventSink> = self.sink.clone();
        let store: Arc<dyn StateStore> = self.store.clone();
        plutonic::init(&self.config, broker, sink, Some(store)).await
    }

    async fn engine(&self) -> Engine {
        self.init().await.unwrap()
    }
}

fn aapl() -> Symbol {
    Symbol::new("AAPL")
}

fn transient() -> BrokerError {
    BrokerError::transient("connection reset")
}

// =============================================================================
// Order lifecycle
// =============================================================================

#[tokio::test]
async fn buy_fill_updates_ledger() {
    let setup = Setup::new();
    let engine = setup.engine().await;

    let record = assert_ok!(engine.execute_buy("AAPL", dec!(10)).await);
    assert_eq!(record.status(), OrderStatus::Submitted);
    let broker_id = record.broker_order_id().cloned().unwrap();
    assert_eq!(broker_id.as_str(), "X1");

    let update = setup.broker.fill(&broker_id, dec!(10), dec!(150)).unwrap();
    let outcome = assert_ok!(engine.apply_update(update).await);
    assert!(matches!(
        outcome,
        UpdateOutcome::Applied {
            status: OrderStatus::Filled,
            ..
        }
    ));

    let record = engine.executor().get(record.id()).await.unwrap();
    assert_eq!(record.status(), OrderStatus::Filled);
    assert_eq!(record.filled_quantity(), dec!(10));

    let position = engine.ledger().position(&aapl()).await.unwrap();
    assert_eq!(position.quantity, dec!(10));
    assert_eq!(position.avg_cost, dec!(150));
}

#[tokio::test]
async fn partial_fills_average_and_poll_completes() {
    let setup = Setup::new();
    let engine = setup.engine().await;

    let record = engine
        .submit(TradeIntent::limit("MSFT", OrderSide::Buy, dec!(10), dec!(400)))
        .await
        .unwrap();
    let broker_id = record.broker_order_id().cloned().unwrap();

    setup.broker.fill(&broker_id, dec!(4), dec!(399)).unwrap();
    let summary = engine.poll().await;
    assert_eq!(summary.applied, 1);
    assert_eq!(summary.completed, 0);

    setup.broker.fill(&broker_id, dec!(6), dec!(400)).unwrap();
    let summary = engine.poll().await;
    assert_eq!(summary.completed, 1);

    let position = engine.ledger().position(&Symbol::new("MSFT")).await.unwrap();
    assert_eq!(position.quantity, dec!(10));
    assert_eq!(position.avg_cost, dec!(399.6));
    assert!(engine.executor().open_orders().await.is_empty());
}

#[tokio::test]
async fn replayed_fill_is_applied_once() {
    let setup = Setup::new();
    let engine = setup.engine().await;

    let record = engine.execute_buy("AAPL", dec!(10)).await.unwrap();
    let broker_id = record.broker_order_id().cloned().unwrap();
    let update = setup.broker.fill(&broker_id, dec!(10), dec!(150)).unwrap();

    engine.apply_update(update.clone()).await.unwrap();
    let version = engine.ledger().version();
    let outcome = engine.apply_update(update).await.unwrap();

    assert!(matches!(outcome, UpdateOutcome::Duplicate { .. }));
    assert_eq!(engine.ledger().version(), version);
    assert_eq!(
        engine.ledger().position(&aapl()).await.unwrap().quantity,
        dec!(10)
    );
}

#[tokio::test]
async fn overfill_is_refused() {
    let setup = Setup::new();
    let engine = setup.engine().await;

    let record = engine.execute_buy("AAPL", dec!(10)).await.unwrap();
    let broker_id = record.broker_order_id().cloned().unwrap();
    let mut update = setup.broker.fill(&broker_id, dec!(5), dec!(150)).unwrap();
    update.status = OrderStatus::Filled;
    update.filled_quantity = dec!(11);

    let err = engine.apply_update(update).await.unwrap_err();

    assert_eq!(err.code(), ErrorCode::InvalidBrokerUpdate);
    let record = engine.executor().get(record.id()).await.unwrap();
    assert_eq!(record.filled_quantity(), Decimal::ZERO);
    assert!(engine.ledger().position(&aapl()).await.is_none());
}

#[tokio::test]
async fn sell_closes_position_and_realizes_pnl() {
    let setup = Setup::new();
    let engine = setup.engine().await;

    let buy = engine.execute_buy("AAPL", dec!(10)).await.unwrap();
    let update = setup
        .broker
        .fill(buy.broker_order_id().unwrap(), dec!(10), dec!(150))
        .unwrap();
    engine.apply_update(update).await.unwrap();

    let sell = engine.execute_sell("AAPL", dec!(10)).await.unwrap();
    let update = setup
        .broker
        .fill(sell.broker_order_id().unwrap(), dec!(10), dec!(160))
        .unwrap();
    engine.apply_update(update).await.unwrap();

    let position = engine.ledger().position(&aapl()).await.unwrap();
    assert!(position.is_flat());
    assert_eq!(position.realized_pnl, dec!(100));
}

// =============================================================================
// Validation and cancellation
// =============================================================================

#[tokio::test]
async fn invalid_intent_is_rejected_locally() {
    let setup = Setup::new();
    let engine = setup.engine().await;

    let err = engine.execute_buy("AAPL", Decimal::ZERO).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidOrderParams);

    let err = engine
        .submit(TradeIntent::limit("AAPL", OrderSide::Buy, dec!(1), dec!(-5)))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidOrderParams);

    assert_eq!(setup.broker.calls(BrokerCall::Submit), 0);
}

#[tokio::test]
async fn cancel_filled_order_conflicts() {
    let setup = Setup::new();
    let engine = setup.engine().await;

    let record = engine.execute_buy("AAPL", dec!(10)).await.unwrap();
    let update = setup
        .broker
        .fill(record.broker_order_id().unwrap(), dec!(10), dec!(150))
        .unwrap();
    engine.apply_update(update).await.unwrap();

    let err = assert_err!(engine.cancel(record.id()).await);

    assert_eq!(err.code(), ErrorCode::OrderConflict);
    assert_eq!(setup.broker.calls(BrokerCall::Cancel), 0);
}

#[tokio::test]
async fn cancel_unknown_order_is_not_found() {
    let setup = Setup::new();
    let engine = setup.engine().await;

    let err = assert_err!(engine.cancel(&OrderId::new("missing")).await);

    assert_eq!(err.code(), ErrorCode::OrderNotFound);
}

#[tokio::test]
async fn cancel_partially_filled_keeps_fill() {
    let setup = Setup::new();
    let engine = setup.engine().await;

    let record = engine.execute_buy("AAPL", dec!(10)).await.unwrap();
    setup
        .broker
        .fill(record.broker_order_id().unwrap(), dec!(4), dec!(150))
        .unwrap();

    let canceled = engine.cancel(record.id()).await.unwrap();

    assert_eq!(canceled.status(), OrderStatus::Canceled);
    assert_eq!(canceled.filled_quantity(), dec!(4));
    assert_eq!(
        engine.ledger().position(&aapl()).await.unwrap().quantity,
        dec!(4)
    );
}

// =============================================================================
// Retry behavior
// =============================================================================

#[tokio::test]
async fn transient_failures_use_five_attempts() {
    let setup = Setup::new();
    let engine = setup.engine().await;
    setup
        .broker
        .fail_next(BrokerCall::Submit, std::iter::repeat_with(transient).take(5));

    let err = engine.execute_buy("AAPL", dec!(1)).await.unwrap_err();

    assert_eq!(err.code(), ErrorCode::BrokerUnavailable);
    assert_eq!(setup.broker.calls(BrokerCall::Submit), 5);
    assert!(err.message().contains("connection reset"));
}

#[tokio::test]
async fn transient_failure_then_success() {
    let setup = Setup::new();
    let engine = setup.engine().await;
    setup
        .broker
        .fail_next(BrokerCall::Submit, [transient(), transient()]);

    let record = engine.execute_buy("AAPL", dec!(1)).await.unwrap();

    assert_eq!(record.status(), OrderStatus::Submitted);
    assert_eq!(setup.broker.calls(BrokerCall::Submit), 3);
}

#[tokio::test]
async fn validation_failure_is_not_retried() {
    let setup = Setup::new();
    let engine = setup.engine().await;
    setup.broker.fail_next(
        BrokerCall::Submit,
        [BrokerError::Validation {
            message: "insufficient buying power".to_string(),
        }],
    );

    let err = engine.execute_buy("AAPL", dec!(1)).await.unwrap_err();

    assert_eq!(err.code(), ErrorCode::InvalidOrderParams);
    assert_eq!(setup.broker.calls(BrokerCall::Submit), 1);
}

#[tokio::test]
async fn slow_broker_times_out_as_transient() {
    let setup = Setup::with_config(
        r"
retry:
  max_attempts: 3
  base_delay_ms: 1
  max_delay_ms: 2
  call_timeout_ms: 20
",
    );
    setup.broker.set_latency(Some(Duration::from_millis(200)));

    let Err(err) = setup.init().await else {
        panic!("init should fail against a broker slower than the call timeout");
    };

    assert!(matches!(err, FatalError::BrokerUnavailable(_)));
    assert_eq!(err.code(), ErrorCode::BrokerUnavailable);
    assert_eq!(setup.broker.calls(BrokerCall::GetAccount), 3);
}

#[tokio::test]
async fn shutdown_stops_new_broker_calls() {
    let setup = Setup::new();
    let engine = setup.engine().await;
    engine.shutdown().await.unwrap();

    let err = engine.execute_buy("AAPL", dec!(1)).await.unwrap_err();

    assert!(engine.is_shutting_down());
    assert_eq!(err.code(), ErrorCode::ShuttingDown);
    assert_eq!(setup.broker.calls(BrokerCall::Submit), 0);
}

// =============================================================================
// Startup
// =============================================================================

#[tokio::test]
async fn init_rejects_bad_credentials() {
    let setup = Setup::new();
    setup.broker.fail_next(
        BrokerCall::GetAccount,
        [BrokerError::Auth {
            message: "forbidden".to_string(),
        }],
    );

    let Err(err) = setup.init().await else {
        panic!("init should fail on rejected credentials");
    };

    assert!(matches!(err, FatalError::Authentication(_)));
    assert_eq!(err.code(), ErrorCode::AuthenticationFailed);
    assert_eq!(setup.broker.calls(BrokerCall::GetAccount), 1);
    assert!(!setup.sink.with_severity(Severity::Error).is_empty());
}

#[tokio::test]
async fn init_seeds_ledger_from_broker() {
    let setup = Setup::new();
    setup.broker.set_position("TSLA", dec!(3), dec!(210));

    let engine = setup.engine().await;

    let position = engine.ledger().position(&Symbol::new("TSLA")).await.unwrap();
    assert_eq!(position.quantity, dec!(3));
    assert_eq!(position.avg_cost, dec!(210));
    assert!(setup.sink.contains("Plutonic initialized"));
}

#[tokio::test]
async fn init_adopts_open_broker_orders() {
    let setup = Setup::new();
    let broker_id = setup.broker.seed_order(
        TradeIntent::market("NVDA", OrderSide::Buy, dec!(5)).with_client_order_id("external-1"),
    );

    let engine = setup.engine().await;

    let record = engine.executor().get(&OrderId::new("external-1")).await.unwrap();
    assert_eq!(record.broker_order_id(), Some(&broker_id));

    setup.broker.fill(&broker_id, dec!(5), dec!(100)).unwrap();
    engine.poll().await;
    assert_eq!(
        engine.ledger().position(&Symbol::new("NVDA")).await.unwrap().quantity,
        dec!(5)
    );
}

// =============================================================================
// Reconciliation
// =============================================================================

#[tokio::test]
async fn reconcile_reports_without_mutating() {
    let setup = Setup::new();
    let engine = setup.engine().await;

    let record = engine.execute_buy("AAPL", dec!(10)).await.unwrap();
    let update = setup
        .broker
        .fill(record.broker_order_id().unwrap(), dec!(10), dec!(150))
        .unwrap();
    engine.apply_update(update).await.unwrap();
    setup.broker.set_position("AAPL", dec!(7), dec!(150));
    let before = engine.ledger().snapshot().await;

    let report = assert_ok!(engine.reconcile_now().await);

    let discrepancy = report.get(&aapl()).unwrap();
    assert_eq!(discrepancy.local_qty, dec!(10));
    assert_eq!(discrepancy.broker_qty, dec!(7));
    assert_eq!(report.discrepancies.len(), 1);

    let after = engine.ledger().snapshot().await;
    assert_eq!(after.positions, before.positions);
    assert_eq!(after.version, before.version);
    assert!(setup.sink.contains("Position discrepancy"));
}

#[tokio::test]
async fn adopting_broker_position_clears_discrepancy() {
    let setup = Setup::new();
    let engine = setup.engine().await;
    setup.broker.set_position("AAPL", dec!(7), dec!(150));

    let position = engine.adopt_broker_position(&aapl()).await.unwrap();
    let report = engine.reconcile_now().await.unwrap();

    assert_eq!(position.quantity, dec!(7));
    assert!(report.is_clean());
}

// =============================================================================
// Persistence and service loop
// =============================================================================

#[tokio::test]
async fn state_survives_restart() {
    let setup = Setup::new();
    let engine = setup.engine().await;
    let filled = engine.execute_buy("AAPL", dec!(10)).await.unwrap();
    let update = setup
        .broker
        .fill(filled.broker_order_id().unwrap(), dec!(10), dec!(150))
        .unwrap();
    engine.apply_update(update).await.unwrap();
    let saves_before_shutdown = setup.store.save_count();
    engine.shutdown().await.unwrap();
    assert_eq!(setup.store.save_count(), saves_before_shutdown + 1);

    let restarted = setup.engine().await;

    let record = restarted.executor().get(filled.id()).await.unwrap();
    assert_eq!(record.status(), OrderStatus::Filled);
    let position = restarted.ledger().position(&aapl()).await.unwrap();
    assert_eq!(position.quantity, dec!(10));
    assert_eq!(position.avg_cost, dec!(150));
    assert!(setup.sink.contains("Restoring persisted state"));

    let err = restarted.cancel(filled.id()).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::OrderConflict);
}

#[tokio::test]
async fn state_survives_crash_without_shutdown() {
    let setup = Setup::new();
    let engine = setup.engine().await;
    let filled = engine.execute_buy("AAPL", dec!(10)).await.unwrap();
    let update = setup
        .broker
        .fill(filled.broker_order_id().unwrap(), dec!(10), dec!(150))
        .unwrap();
    engine.apply_update(update).await.unwrap();
    let canceled = engine.execute_buy("MSFT", dec!(5)).await.unwrap();
    engine.cancel(canceled.id()).await.unwrap();
    let working = engine.execute_sell("AAPL", dec!(4)).await.unwrap();
    drop(engine);

    let restarted = setup.engine().await;

    assert!(setup.sink.contains("Restoring persisted state"));
    assert_eq!(
        restarted.executor().get(filled.id()).await.unwrap().status(),
        OrderStatus::Filled
    );
    assert_eq!(
        restarted.executor().get(canceled.id()).await.unwrap().status(),
        OrderStatus::Canceled
    );
    assert_eq!(
        restarted.executor().get(working.id()).await.unwrap().status(),
        OrderStatus::Submitted
    );
    let position = restarted.ledger().position(&aapl()).await.unwrap();
    assert_eq!(position.quantity, dec!(10));
    assert_eq!(position.avg_cost, dec!(150));

    let update = setup
        .broker
        .fill(working.broker_order_id().unwrap(), dec!(4), dec!(160))
        .unwrap();
    restarted.apply_update(update).await.unwrap();
    assert_eq!(
        restarted.ledger().position(&aapl()).await.unwrap().quantity,
        dec!(6)
    );
}

#[tokio::test]
async fn order_accepted_behind_timeout_is_tracked_not_rejected() {
    let setup = Setup::with_config(
        r"
retry:
  max_attempts: 5
  base_delay_ms: 1
  max_delay_ms: 5
  call_timeout_ms: 50
engine:
  poll_interval_ms: 10
  reconcile_interval_secs: 60
",
    );
    let engine = setup.engine().await;
    setup.broker.stall_next_accept(Duration::from_millis(300));

    let record = assert_ok!(engine.execute_buy("AAPL", dec!(10)).await);

    assert_eq!(record.status(), OrderStatus::Submitted);
    let broker_id = record.broker_order_id().cloned().unwrap();
    assert_eq!(broker_id.as_str(), "X1");
    assert_eq!(setup.broker.calls(BrokerCall::Submit), 1);

    setup.broker.fill(&broker_id, dec!(10), dec!(150)).unwrap();
    engine.poll().await;
    assert_eq!(
        engine.executor().get(record.id()).await.unwrap().status(),
        OrderStatus::Filled
    );
    assert_eq!(
        engine.ledger().position(&aapl()).await.unwrap().quantity,
        dec!(10)
    );
}

#[tokio::test]
async fn run_stops_retries_when_cancelled() {
    let setup = Setup::with_config(
        r"
retry:
  max_attempts: 5
  base_delay_ms: 300
  max_delay_ms: 1000
  jitter_factor: 0.0
  call_timeout_ms: 1000
engine:
  poll_interval_ms: 10
  reconcile_interval_secs: 60
",
    );
    let engine = setup.engine().await;
    engine.execute_buy("AAPL", dec!(10)).await.unwrap();
    setup
        .broker
        .fail_next(BrokerCall::GetOrder, (0..5).map(|_| transient()));

    let cancel = CancellationToken::new();
    let stopper = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        stopper.cancel();
    });
    let started = std::time::Instant::now();
    tokio::time::timeout(Duration::from_secs(5), engine.run(cancel))
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_millis(280));
    assert!(engine.is_shutting_down());
    assert_eq!(setup.broker.calls(BrokerCall::GetOrder), 1);
}

#[tokio::test]
async fn run_polls_until_cancelled() {
    let setup = Setup::new();
    let engine = setup.engine().await;
    let record = engine.execute_buy("AAPL", dec!(10)).await.unwrap();
    setup
        .broker
        .fill(record.broker_order_id().unwrap(), dec!(10), dec!(150))
        .unwrap();

    let cancel = CancellationToken::new();
    let stopper = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        stopper.cancel();
    });
    tokio::time::timeout(Duration::from_secs(5), engine.run(cancel))
        .await
        .unwrap();

    assert!(engine.is_shutting_down());
    assert!(setup.broker.calls(BrokerCall::GetOrder) >= 1);
    assert_eq!(
        engine.executor().get(record.id()).await.unwrap().status(),
        OrderStatus::Filled
    );
    assert_eq!(
        engine.ledger().position(&aapl()).await.unwrap().quantity,
        dec!(10)
    );
}
