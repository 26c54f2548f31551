//! Pull/replication engine.
//!
//! A [`PullSession`] pulls every object matching a query from a remote peer
//! and commits the ones missing locally, in listing order, through a bounded
//! producer/consumer pipeline:
//!
//! - [`listing`] — the single shared identifier stream, serialized by a gate,
//!   with reconnect and re-authentication
//! - [`queue`] — the bounded circular slot queue carrying backpressure both
//!   ways while preserving listing order
//! - [`reader`] — R concurrent fetch tasks
//! - [`writer`] — the single batching committer
//! - [`shutdown`] — stop signal plus acknowledgement countdown

mod listing;
mod queue;
mod reader;
mod shutdown;
mod writer;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::config::PullConfig;
use crate::error::{Error, Result};
use crate::peer::{HttpPeer, PeerClient};
use crate::store::ObjectStore;
use crate::types::Event;
use listing::ListingConnection;
use queue::SlotQueue;
use shutdown::ShutdownCoordinator;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;

/// Per-run state shared by the reader and writer tasks.
pub(crate) struct PullShared {
    pub(crate) config: PullConfig,
    pub(crate) peer: Arc<dyn PeerClient>,
    pub(crate) store: Arc<dyn ObjectStore>,
    /// Session cookie, replaced on credential refresh; outlives a single run
    cookie: Arc<Mutex<Option<String>>>,
    pub(crate) queue: SlotQueue,
    event_tx: broadcast::Sender<Event>,
}

impl PullShared {
    pub(crate) fn cookie(&self) -> Option<String> {
        self.cookie
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_cookie(&self, cookie: String) {
        *self.cookie.lock().unwrap_or_else(PoisonError::into_inner) = Some(cookie);
    }

    pub(crate) fn emit(&self, event: Event) {
        // send() fails only when nobody subscribed, which is fine
        self.event_tx.send(event).ok();
    }
}

enum SessionState {
    Idle,
    Running(RunningSession),
    Stopping,
}

struct RunningSession {
    coordinator: ShutdownCoordinator,
}

/// A replication session pulling from one remote peer into the local store.
///
/// Created idle; `start` spawns the worker tasks, `stop` joins them. All
/// operational failures (unreachable peer, fetch errors, commit errors) are
/// retried internally with a fixed delay and never surface — a persistently
/// unreachable peer shows up only as stalled progress. Subscribe to
/// [`Event`]s for observability.
pub struct PullSession {
    config: PullConfig,
    peer: Arc<dyn PeerClient>,
    store: Arc<dyn ObjectStore>,
    cookie: Arc<Mutex<Option<String>>>,
    event_tx: broadcast::Sender<Event>,
    state: tokio::sync::Mutex<SessionState>,
}

impl PullSession {
    /// Create a session talking HTTP to `config.host`.
    ///
    /// Validates the configuration and opens no connection; the session
    /// starts idle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a missing/invalid host, empty
    /// credentials or an empty query.
    pub fn new(config: PullConfig, store: Arc<dyn ObjectStore>) -> Result<Self> {
        config.validate()?;
        let peer = HttpPeer::new(&config.host).map_err(|e| Error::Config {
            message: format!("invalid peer host: {e}"),
            key: Some("host".to_string()),
        })?;
        Ok(Self::assemble(config, Arc::new(peer), store))
    }

    /// Create a session with a custom [`PeerClient`] implementation.
    ///
    /// Useful for tests and for transports other than plain HTTP.
    pub fn with_peer(
        config: PullConfig,
        peer: Arc<dyn PeerClient>,
        store: Arc<dyn ObjectStore>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::assemble(config, peer, store))
    }

    fn assemble(config: PullConfig, peer: Arc<dyn PeerClient>, store: Arc<dyn ObjectStore>) -> Self {
        let (event_tx, _rx) = broadcast::channel(1000);
        let cookie = Arc::new(Mutex::new(config.cookie.clone()));
        Self {
            config,
            peer,
            store,
            cookie,
            event_tx,
            state: tokio::sync::Mutex::new(SessionState::Idle),
        }
    }

    /// Subscribe to session events.
    ///
    /// Multiple subscribers are supported; each receives all events
    /// independently. A subscriber that lags more than 1000 events behind
    /// receives a `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Whether worker tasks are currently running.
    pub async fn is_running(&self) -> bool {
        matches!(*self.state.lock().await, SessionState::Running(_))
    }

    /// Spawn the reader pool and the writer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyRunning`] if the session is not idle.
    pub async fn start(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if !matches!(*state, SessionState::Idle) {
            return Err(Error::AlreadyRunning);
        }

        let coordinator = ShutdownCoordinator::new();
        let shared = Arc::new(PullShared {
            config: self.config.clone(),
            peer: self.peer.clone(),
            store: self.store.clone(),
            cookie: self.cookie.clone(),
            queue: SlotQueue::new(self.config.queue_capacity),
            event_tx: self.event_tx.clone(),
        });
        let gate = Arc::new(tokio::sync::Mutex::new(ListingConnection::new(
            shared.clone(),
        )));

        for index in 0..self.config.readers {
            coordinator.spawn(reader::run(
                shared.clone(),
                gate.clone(),
                coordinator.token(),
                index,
            ));
        }
        coordinator.spawn(writer::run(shared.clone(), coordinator.token()));

        tracing::info!(
            host = %self.config.host,
            query = %self.config.query,
            readers = self.config.readers,
            queue_capacity = self.config.queue_capacity,
            "Pull session started"
        );
        *state = SessionState::Running(RunningSession { coordinator });
        Ok(())
    }

    /// Stop the session and wait for every worker task to exit.
    ///
    /// Idempotent: a no-op when the session is idle. Unresolved queue slots
    /// and any partially accumulated batch are discarded — nothing is ever
    /// partially committed.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        let SessionState::Running(running) =
            std::mem::replace(&mut *state, SessionState::Stopping)
        else {
            *state = SessionState::Idle;
            return;
        };

        tracing::info!("Stopping pull session");
        running.coordinator.shutdown().await;
        *state = SessionState::Idle;
        self.event_tx.send(Event::Stopped).ok();
        tracing::info!("Pull session stopped");
    }
}

impl Drop for PullSession {
    fn drop(&mut self) {
        if let Ok(state) = self.state.try_lock()
            && let SessionState::Running(running) = &*state
        {
            running.coordinator.request_stop();
            tracing::warn!("Pull session dropped while running; worker tasks cancelled without join");
        }
    }
}
