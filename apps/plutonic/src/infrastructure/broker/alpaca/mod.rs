//! Alpaca Markets Broker Adapter
//!
//! `BrokerClient` over Alpaca's v2 REST API. Each call is a single HTTP
//! request; retries happen above the adapter in the retry runner.

mod adapter;
mod api_types;
mod config;
mod error;
mod http_client;

pub use adapter::AlpacaBrokerAdapter;
pub use config::{AlpacaConfig, AlpacaEnvironment};
pub use error::AlpacaError;
