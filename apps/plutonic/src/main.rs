//! Plutonic Binary
//!
//! Connects to Alpaca, recovers state, and keeps orders and positions in
//! sync until interrupted.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin plutonic
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `ALPACA_API_KEY`: Alpaca API key
//! - `ALPACA_API_SECRET`: Alpaca API secret
//!
//! ## Optional
//! - `PLUTONIC_CONFIG`: config file path (default: config.yaml)
//! - `ALPACA_ENVIRONMENT`: paper | live (default: paper), used when no config file exists
//! - `RUST_LOG`: Log level (default: info)

use std::process::ExitCode;
use std::sync::Arc;

use plutonic::application::ports::{BrokerClient, EventSink, StateStore};
use plutonic::config::{self, Config, DEFAULT_CONFIG_PATH};
use plutonic::infrastructure::broker::alpaca::AlpacaBrokerAdapter;
use plutonic::infrastructure::logging::TracingEventSink;
use plutonic::infrastructure::persistence::JsonFileStateStore;
use plutonic::{FatalError, RetryError, telemetry};
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> ExitCode {
    load_dotenv();
    telemetry::init_tracing();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(code = %err.code(), error = %err, "Plutonic failed to start");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), FatalError> {
    let path = std::env::var("PLUTONIC_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = config::load_config(Some(&path))?;
    config::require_credentials(&config)?;
    log_config(&config);

    let adapter = AlpacaBrokerAdapter::new(&config.broker.to_alpaca_config())
        .map_err(|e| FatalError::from_retry(RetryError::NonRetryable(e.into())))?;
    let broker: Arc<dyn BrokerClient> = Arc::new(adapter);
    let sink: Arc<dyn EventSink> = Arc::new(TracingEventSink);
    let store: Option<Arc<dyn StateStore>> = config
        .persistence
        .enabled
        .then(|| Arc::new(JsonFileStateStore::new(&config.persistence.path)) as Arc<dyn StateStore>);

    let engine = plutonic::init(&config, broker, sink, store).await?;

    let cancel = CancellationToken::new();
    tokio::spawn(await_shutdown(cancel.clone()));

    engine.run(cancel).await;

    if let Err(err) = engine.shutdown().await {
        tracing::error!(error = %err, "Failed to persist state on shutdown");
    }
    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &Config) {
    tracing::info!(
        environment = %config.broker.environment,
        max_attempts = config.retry.max_attempts,
        poll_interval_ms = config.engine.poll_interval_ms,
        reconcile_interval_secs = config.engine.reconcile_interval_secs,
        persistence = config.persistence.enabled,
        "Configuration loaded"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for SIGINT or SIGTERM, then cancel.
async fn await_shutdown(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C, initiating shutdown"),
        () = terminate => tracing::info!("Received SIGTERM, initiating shutdown"),
    }

    cancel.cancel();
}
