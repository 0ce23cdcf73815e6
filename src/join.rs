//! Joining background workers on shutdown.

use tokio::task::JoinError;

/// Unwraps the result of joining a worker, re-raising its panic on the
/// caller's task.
///
/// Returns `None` if the worker was cancelled.
pub(crate) fn propagate_panics<T>(result: Result<T, JoinError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) if err.is_cancelled() => None,
        Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
        Err(err) => panic!("Worker failed to join: {err}"),
    }
}
