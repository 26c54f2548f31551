//! Reader task: claim the next identifier, reserve a slot, fetch, resolve.

use super::PullShared;
use super::listing::ListingConnection;
use super::queue::Resolution;
use crate::error::{PeerError, StoreError};
use crate::retry::retry_until_stopped;
use crate::types::ObjectId;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
enum FetchError {
    #[error(transparent)]
    Peer(#[from] PeerError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One of R concurrent reader loops.
///
/// Under the listing gate: read one identifier and reserve the next queue
/// slot, so reservation order equals the peer's emission order. Outside the
/// gate: resolve the reservation — Skip if the object is already local,
/// otherwise fetch and stage it, retrying indefinitely with the fixed delay.
/// A reservation is never left unresolved: a fetch abandoned at shutdown
/// resolves as Skip before the task acknowledges termination.
pub(crate) async fn run(
    shared: Arc<PullShared>,
    gate: Arc<tokio::sync::Mutex<ListingConnection>>,
    cancel: CancellationToken,
    index: usize,
) {
    loop {
        let (id, reservation) = {
            let mut listing = tokio::select! {
                guard = gate.lock() => guard,
                _ = cancel.cancelled() => break,
            };
            let Some(id) = listing.next_identifier(&cancel).await else {
                break;
            };
            let Some(reservation) = shared.queue.reserve(&cancel).await else {
                break;
            };
            (id, reservation)
        };

        let resolution = resolve_identifier(&shared, &id, &cancel).await;
        shared.queue.resolve(reservation, resolution);
    }
    tracing::debug!(reader = index, "Reader task exiting");
}

async fn resolve_identifier(
    shared: &PullShared,
    id: &ObjectId,
    cancel: &CancellationToken,
) -> Resolution {
    let fetched = retry_until_stopped(cancel, shared.config.retry_delay, "object fetch", || {
        fetch_one(shared, id)
    })
    .await;
    match fetched {
        Some(resolution) => resolution,
        // Abandoned at shutdown: the slot still has to advance the cursor.
        None => Resolution::Skip,
    }
}

async fn fetch_one(shared: &PullShared, id: &ObjectId) -> Result<Resolution, FetchError> {
    if shared.store.contains(id).await? {
        return Ok(Resolution::Skip);
    }
    let cookie = shared.cookie();
    let fetched = shared.peer.fetch_object(id, cookie.as_deref()).await?;
    let pending = shared
        .store
        .stage(id, &fetched.content_type, fetched.body)
        .await?;
    tracing::debug!(id = %id, bytes = pending.body.len(), "Fetched object");
    Ok(Resolution::Object(pending))
}
