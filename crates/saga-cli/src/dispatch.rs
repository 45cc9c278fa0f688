//! Dispatch of blocking core calls from the async presentation layer.
//!
//! Core operations are synchronous (file I/O, vector math, blocking HTTP to
//! collaborators), so they run on the blocking thread pool. A deadline bounds
//! how long the caller waits, not how long the work runs: an elapsed timeout
//! returns [`SagaError::TimedOut`] while the underlying task keeps running to
//! completion in the background. That leaked work is a known cost of this
//! design, accepted here as in the systems this one descends from.

use std::time::Duration;

use saga_core::{SagaError, SagaResult};
use tokio::task;
use tokio::time::timeout;
use tracing::warn;

/// Runs a blocking core closure on the blocking pool with no deadline.
pub async fn run_blocking<T, F>(f: F) -> SagaResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> SagaResult<T> + Send + 'static,
{
    task::spawn_blocking(f)
        .await
        .map_err(|e| SagaError::Io(std::io::Error::other(format!("worker task failed: {e}"))))?
}

/// Runs a blocking core closure with a deadline.
///
/// Exceeding the deadline abandons the await and returns
/// [`SagaError::TimedOut`]; the blocking task is not cancelled.
pub async fn run_with_deadline<T, F>(deadline: Duration, f: F) -> SagaResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> SagaResult<T> + Send + 'static,
{
    let secs = deadline.as_secs();
    match timeout(deadline, task::spawn_blocking(f)).await {
        Ok(joined) => joined
            .map_err(|e| SagaError::Io(std::io::Error::other(format!("worker task failed: {e}"))))?,
        Err(_) => {
            warn!(deadline_secs = secs, "Operation exceeded deadline, abandoning await");
            Err(SagaError::TimedOut(secs))
        }
    }
}
