//! Writer task: drain slots in order, batch, commit atomically.

use super::PullShared;
use super::queue::Resolution;
use crate::retry::sleep_unless_stopped;
use crate::types::{Event, PendingObject};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// The single writer loop.
///
/// Accumulates resolutions from the oldest slot onward — at least one object,
/// at most `queue_capacity`, stopping early when the queue momentarily drains
/// — then commits the batch as one atomic operation. Commit failures retry
/// with the fixed delay while the batch stays in memory; nothing is ever
/// partially applied. Because the writer never advances past an unresolved
/// slot, committed order always equals listing order, whatever order the
/// fetches completed in.
///
/// On stop: a partially accumulated batch is discarded, never flushed. An
/// in-flight commit attempt is allowed to finish; only the backoff between
/// attempts observes the stop signal.
pub(crate) async fn run(shared: Arc<PullShared>, cancel: CancellationToken) {
    let capacity = shared.config.queue_capacity;
    let mut batch: Vec<PendingObject> = Vec::new();
    let mut skipped = 0usize;
    let mut started = Instant::now();

    'session: while !cancel.is_cancelled() {
        while batch.is_empty() || (batch.len() < capacity && shared.queue.backlog() > 0) {
            let Some(resolution) = shared.queue.take_next(&cancel).await else {
                break 'session;
            };
            match resolution {
                Resolution::Object(object) => {
                    if batch.is_empty() {
                        started = Instant::now();
                    }
                    batch.push(object);
                }
                Resolution::Skip => skipped += 1,
            }
        }

        loop {
            match shared.store.commit(&batch).await {
                Ok(()) => break,
                Err(e) => {
                    tracing::warn!(error = %e, objects = batch.len(), "Batch commit failed, retrying");
                }
            }
            if !sleep_unless_stopped(&cancel, shared.config.retry_delay).await {
                break 'session;
            }
        }

        let elapsed = started.elapsed().as_secs_f64().max(f64::EPSILON);
        let per_second = batch.len() as f64 / elapsed;
        tracing::info!(
            objects = batch.len(),
            skipped,
            per_second = format_args!("{per_second:.1}"),
            "Committed batch"
        );
        shared.emit(Event::BatchCommitted {
            objects: batch.len(),
            skipped,
            per_second,
        });
        batch.clear();
        skipped = 0;
    }

    if !batch.is_empty() {
        tracing::debug!(
            discarded = batch.len(),
            "Discarding uncommitted batch at shutdown"
        );
    }
    tracing::debug!("Writer task exiting");
}
