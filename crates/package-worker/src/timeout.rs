//! The one timeout combinator used by the selector, job cancellation and the
//! lifecycle dispatcher.

use std::future::Future;
use std::time::Duration;

use crate::error::{CheckResult, Rejection, WorkerError, WorkerResult};

/// Run `fut` with a time budget; elapsing yields [`WorkerError::Timeout`].
pub async fn with_timeout<F>(duration: Duration, label: &str, fut: F) -> WorkerResult<F::Output>
where
    F: Future,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(output) => Ok(output),
        Err(_) => Err(WorkerError::timeout(label, duration)),
    }
}

/// [`with_timeout`] for fallible futures, flattening the two error layers.
pub async fn try_with_timeout<T, F>(duration: Duration, label: &str, fut: F) -> WorkerResult<T>
where
    F: Future<Output = WorkerResult<T>>,
{
    with_timeout(duration, label, fut).await?
}

/// [`with_timeout`] for capability checks: elapsing becomes an unknown-reason
/// rejection instead of an error.
pub async fn check_with_timeout<F>(duration: Duration, label: &str, fut: F) -> CheckResult
where
    F: Future<Output = CheckResult>,
{
    match with_timeout(duration, label, fut).await {
        Ok(result) => result,
        Err(err) => Err(Rejection::unknown(
            format!("Timeout when running {label}"),
            err.to_string(),
        )),
    }
}
