//! Retry policies with exponential backoff for broker calls.
//!
//! Only [`BrokerError::Transient`](crate::application::ports::BrokerError)
//! failures are retried. Every attempt runs under a per-call timeout and an
//! elapsed timeout counts as a transient failure.
//!
//! # Example
//!
//! ```rust,ignore
//! use plutonic::retry::{RetryPolicy, RetryRunner};
//! use tokio_util::sync::CancellationToken;
//!
//! let runner = RetryRunner::new(RetryPolicy::default());
//! let account = runner
//!     .run("get_account", &CancellationToken::new(), || broker.get_account())
//!     .await?;
//! ```

mod policy;
mod runner;

pub use policy::{ExponentialBackoff, RetryPolicy};
pub use runner::{RetryError, RetryRunner};
