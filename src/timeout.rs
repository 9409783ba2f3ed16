//! Bounded Waits
//!
//! Every backend invocation and every durable store call carries its own
//! timeout. There is no global deadline across a whole chain execution.

use std::future::Future;
use std::time::Duration;

use crate::constants::{chain as chain_constants, storage as store_constants};
use crate::types::{BackendError, StoreError};

/// Timeout configuration for orchestrated operations
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Per-candidate backend invocation (default: 60 seconds)
    pub attempt: Duration,
    /// One-time durable store liveness probe (default: 5 seconds)
    pub probe: Duration,
    /// Single durable store read (default: 10 seconds)
    pub store_operation: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            attempt: Duration::from_secs(chain_constants::ATTEMPT_TIMEOUT_SECS),
            probe: Duration::from_secs(store_constants::PROBE_TIMEOUT_SECS),
            store_operation: Duration::from_secs(store_constants::OPERATION_TIMEOUT_SECS),
        }
    }
}

impl TimeoutConfig {
    /// Short timeouts for tests and local tooling
    pub fn fast() -> Self {
        Self {
            attempt: Duration::from_secs(5),
            probe: Duration::from_secs(1),
            store_operation: Duration::from_secs(2),
        }
    }
}

/// Run a backend invocation with a bounded wait
///
/// A timed-out invocation is reported as a `Network` failure.
pub async fn with_attempt_timeout<T, F>(timeout: Duration, future: F) -> Result<T, BackendError>
where
    F: Future<Output = Result<T, BackendError>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(BackendError::timeout(timeout)),
    }
}

/// Run a durable store call with a bounded wait
///
/// A timed-out call is reported as a connectivity failure.
pub async fn with_store_timeout<T, F>(
    timeout: Duration,
    future: F,
    operation_name: &str,
) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Unreachable(format!(
            "{} did not complete within {:?}",
            operation_name, timeout
        ))),
    }
}
