// Balance reconciliation engine
pub mod drift;
pub mod processor;
pub mod rate_limit;
pub mod recorder;
pub mod safe_block;
pub mod scheduler;
pub mod stats;

#[cfg(test)]
pub(crate) mod testing;

pub use scheduler::ReconciliationWorker;
pub use stats::WorkerRunStats;

use std::future::Future;
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Fail an external call with `AppError::Timeout` once `timeout_ms` elapses
pub(crate) async fn bounded<T, F>(operation: &'static str, timeout_ms: u64, fut: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    tokio::time::timeout(Duration::from_millis(timeout_ms), fut)
        .await
        .map_err(|_| AppError::Timeout {
            operation,
            timeout_ms,
        })?
}
