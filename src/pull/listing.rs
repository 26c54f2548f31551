//! Shared listing stream with reconnect and re-authentication.

use super::PullShared;
use crate::error::PeerError;
use crate::peer::ListingStream;
use crate::retry::sleep_unless_stopped;
use crate::types::{Event, ObjectId};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// The single stream enumerating the peer's catalog entries for the query.
///
/// Lives behind the session's listing gate (`tokio::sync::Mutex`), so only
/// one reader is ever mid-read. The gate is held across "read one identifier
/// + reserve a slot" only — never across an object fetch.
pub(crate) struct ListingConnection {
    shared: Arc<PullShared>,
    stream: Option<Box<dyn ListingStream>>,
}

impl ListingConnection {
    pub(crate) fn new(shared: Arc<PullShared>) -> Self {
        Self {
            shared,
            stream: None,
        }
    }

    /// Read the next identifier from the shared stream.
    ///
    /// Runs the reconnect protocol whenever the stream ends or fails: the
    /// connection is dropped and re-established (reissuing the full listing
    /// query with current credentials) with the fixed delay between attempts,
    /// indefinitely. An authorization-required response triggers one
    /// credential refresh before the next attempt, and the attempt itself
    /// still counts as failed. Malformed lines are logged and skipped.
    ///
    /// Returns `None` only when stop is observed.
    pub(crate) async fn next_identifier(&mut self, cancel: &CancellationToken) -> Option<ObjectId> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }
            if let Some(stream) = self.stream.as_mut() {
                let read = tokio::select! {
                    read = stream.next_line() => read,
                    _ = cancel.cancelled() => return None,
                };
                match read {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        match line.parse::<ObjectId>() {
                            Ok(id) => return Some(id),
                            Err(e) => {
                                tracing::warn!(line, error = %e, "Skipping malformed listing entry");
                                continue;
                            }
                        }
                    }
                    Ok(None) => {
                        tracing::debug!("Listing snapshot ended, reconnecting");
                        self.stream = None;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Listing read failed, reconnecting");
                        self.stream = None;
                    }
                }
            }
            self.reconnect(cancel).await?;
        }
    }

    /// Re-establish the listing stream, retrying with the fixed delay until
    /// success or stop.
    async fn reconnect(&mut self, cancel: &CancellationToken) -> Option<()> {
        loop {
            let attempt = tokio::select! {
                attempt = self.connect() => attempt,
                _ = cancel.cancelled() => return None,
            };
            match attempt {
                Ok(stream) => {
                    self.stream = Some(stream);
                    tracing::info!(host = %self.shared.config.host, "Listing connected");
                    self.shared.emit(Event::ListingConnected);
                    return Some(());
                }
                Err(e) => {
                    tracing::warn!(host = %self.shared.config.host, error = %e, "Listing connect failed");
                    let auth_required = matches!(e, PeerError::AuthRequired);
                    self.shared.emit(Event::ListingRetry {
                        error: e.to_string(),
                    });
                    if auth_required {
                        self.refresh_credentials(cancel).await;
                    }
                }
            }
            if !sleep_unless_stopped(cancel, self.shared.config.retry_delay).await {
                return None;
            }
        }
    }

    async fn connect(&self) -> Result<Box<dyn ListingStream>, PeerError> {
        let cookie = self.shared.cookie();
        self.shared
            .peer
            .open_listing(&self.shared.config.query, cookie.as_deref())
            .await
    }

    /// Exchange credentials for a fresh session cookie.
    ///
    /// Failures are logged and left for the surrounding retry loop; the
    /// refreshed cookie is shared with the readers' fetch requests.
    async fn refresh_credentials(&self, cancel: &CancellationToken) {
        let config = &self.shared.config;
        let attempt = tokio::select! {
            attempt = self.shared.peer.authenticate(&config.username, &config.password) => attempt,
            _ = cancel.cancelled() => return,
        };
        match attempt {
            Ok(cookie) => {
                self.shared.set_cookie(cookie);
                tracing::info!("Session credentials refreshed");
                self.shared.emit(Event::AuthRefreshed);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Credential refresh failed");
            }
        }
    }
}
