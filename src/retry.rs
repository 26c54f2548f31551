//! Fixed-delay retry helpers.
//!
//! Every retry loop in the engine (listing reconnect, object fetch, batch
//! commit) uses one fixed delay between attempts and retries indefinitely;
//! the only thing that ends a loop early is a stop request. These helpers
//! keep that contract in one place: both the attempt and the backoff sleep
//! race the cancellation token.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Sleep for `delay`, waking early if stop is requested.
///
/// Returns `false` if the token was cancelled before the delay elapsed.
pub(crate) async fn sleep_unless_stopped(cancel: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = cancel.cancelled() => false,
    }
}

/// Run `operation` until it succeeds, sleeping `delay` between failed
/// attempts, indefinitely.
///
/// Returns `None` only when stop is requested: either mid-attempt (the
/// attempt is abandoned) or during the backoff sleep. Failures are logged at
/// warn level with the given operation name; they never propagate.
pub(crate) async fn retry_until_stopped<F, Fut, T, E>(
    cancel: &CancellationToken,
    delay: Duration,
    what: &str,
    mut operation: F,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Display,
{
    loop {
        if cancel.is_cancelled() {
            return None;
        }
        let attempt = tokio::select! {
            result = operation() => result,
            _ = cancel.cancelled() => return None,
        };
        match attempt {
            Ok(value) => return Some(value),
            Err(e) => {
                tracing::warn!(error = %e, operation = what, "Operation failed, retrying");
            }
        }
        if !sleep_unless_stopped(cancel, delay).await {
            return None;
        }
    }
}
