//! Cooperative shutdown barrier for the session's worker tasks.

use std::future::Future;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Stop signal plus acknowledgement countdown.
///
/// Every suspension point in the engine (listing gate, space wait, slot wait,
/// network reads, every backoff sleep) races the coordinator's token, so a
/// stop request wakes every parked task. `shutdown` then waits for each
/// spawned task to actually exit — one acknowledgement per task, rather than
/// assuming anything about scheduling order.
pub(crate) struct ShutdownCoordinator {
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl ShutdownCoordinator {
    pub(crate) fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Token observed by every suspension point of the spawned tasks.
    pub(crate) fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Spawn a worker whose termination `shutdown` will wait for.
    pub(crate) fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(task);
    }

    /// Signal stop without waiting. Used when a running session is dropped.
    pub(crate) fn request_stop(&self) {
        self.cancel.cancel();
    }

    /// Signal stop and block until every spawned task has exited.
    pub(crate) async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}
