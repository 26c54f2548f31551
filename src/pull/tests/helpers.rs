//! Shared helpers: a scriptable in-memory peer and session builders.

use crate::config::PullConfig;
use crate::error::PeerError;
use crate::peer::{FetchedObject, ListingStream, PeerClient};
use crate::pull::PullSession;
use crate::store::MemoryStore;
use crate::types::ObjectId;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub(crate) fn id(hash: &str) -> ObjectId {
    ObjectId::new("sha256", hash).unwrap()
}

pub(crate) fn uri(hash: &str) -> String {
    format!("hash://sha256/{hash}")
}

/// Cookie handed out by [`ScriptedPeer::authenticate`].
pub(crate) const SESSION_COOKIE: &str = "s=scripted";

/// In-memory [`PeerClient`] whose behavior is scripted per test: queued
/// listing snapshots, per-object fetch failures/delays/hangs, and an
/// always-reject-auth mode. Counts listing, fetch and auth attempts.
#[derive(Default)]
pub(crate) struct ScriptedPeer {
    listings: Mutex<VecDeque<Vec<String>>>,
    fetch_failures: Mutex<HashMap<String, usize>>,
    fetch_delays: HashMap<String, Duration>,
    hung_fetches: HashSet<String>,
    always_auth_required: bool,
    require_cookie: bool,
    pub(crate) listing_attempts: AtomicUsize,
    pub(crate) fetch_calls: AtomicUsize,
    pub(crate) auth_calls: AtomicUsize,
}

impl ScriptedPeer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Peer whose listing endpoint rejects every attempt as unauthorized.
    pub(crate) fn always_auth_required() -> Self {
        Self {
            always_auth_required: true,
            ..Self::default()
        }
    }

    /// Reject listings and fetches that do not carry the cookie handed out
    /// by `authenticate`.
    pub(crate) fn requiring_cookie(mut self) -> Self {
        self.require_cookie = true;
        self
    }

    /// Queue one listing snapshot; each (re)connect consumes the next one.
    /// Once exhausted, connects succeed but deliver no further lines.
    pub(crate) fn with_listing(mut self, hashes: &[&str]) -> Self {
        self.listings
            .get_mut()
            .unwrap()
            .push_back(hashes.iter().map(|h| uri(h)).collect());
        self
    }

    /// Make the first `failures` fetches of `hash` fail with a 500.
    pub(crate) fn failing_fetches(mut self, hash: &str, failures: usize) -> Self {
        self.fetch_failures
            .get_mut()
            .unwrap()
            .insert(hash.to_string(), failures);
        self
    }

    /// Delay every successful fetch of `hash`.
    pub(crate) fn delayed_fetch(mut self, hash: &str, delay: Duration) -> Self {
        self.fetch_delays.insert(hash.to_string(), delay);
        self
    }

    /// Make fetches of `hash` hang forever (until abandoned at stop).
    pub(crate) fn hanging_fetch(mut self, hash: &str) -> Self {
        self.hung_fetches.insert(hash.to_string());
        self
    }
}

#[async_trait]
impl PeerClient for ScriptedPeer {
    async fn open_listing(
        &self,
        _query: &str,
        cookie: Option<&str>,
    ) -> Result<Box<dyn ListingStream>, PeerError> {
        self.listing_attempts.fetch_add(1, Ordering::SeqCst);
        if self.always_auth_required {
            return Err(PeerError::AuthRequired);
        }
        if self.require_cookie && cookie != Some(SESSION_COOKIE) {
            return Err(PeerError::AuthRequired);
        }
        let next = self.listings.lock().unwrap().pop_front();
        match next {
            Some(lines) => Ok(Box::new(ScriptedListing {
                lines: lines.into(),
            })),
            // Connected but silent: models an open snapshot with no data.
            None => Ok(Box::new(IdleListing)),
        }
    }

    async fn fetch_object(
        &self,
        id: &ObjectId,
        cookie: Option<&str>,
    ) -> Result<FetchedObject, PeerError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.require_cookie && cookie != Some(SESSION_COOKIE) {
            return Err(PeerError::AuthRequired);
        }
        if self.hung_fetches.contains(&id.hash) {
            return std::future::pending().await;
        }
        let must_fail = {
            let mut failures = self.fetch_failures.lock().unwrap();
            match failures.get_mut(&id.hash) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            }
        };
        if must_fail {
            return Err(PeerError::Status(500));
        }
        if let Some(delay) = self.fetch_delays.get(&id.hash) {
            tokio::time::sleep(*delay).await;
        }
        Ok(FetchedObject {
            content_type: "application/octet-stream".to_string(),
            body: id.hash.clone().into_bytes(),
        })
    }

    async fn authenticate(&self, _username: &str, _password: &str) -> Result<String, PeerError> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        Ok(SESSION_COOKIE.to_string())
    }
}

struct ScriptedListing {
    lines: VecDeque<String>,
}

#[async_trait]
impl ListingStream for ScriptedListing {
    async fn next_line(&mut self) -> Result<Option<String>, PeerError> {
        Ok(self.lines.pop_front())
    }
}

struct IdleListing;

#[async_trait]
impl ListingStream for IdleListing {
    async fn next_line(&mut self) -> Result<Option<String>, PeerError> {
        std::future::pending().await
    }
}

/// Build a session over a scripted peer with a short retry delay.
pub(crate) fn scripted_session(
    peer: Arc<ScriptedPeer>,
    store: Arc<MemoryStore>,
    readers: usize,
    queue_capacity: usize,
) -> PullSession {
    let config = PullConfig {
        host: "http://peer.test".to_string(),
        username: "replicator".to_string(),
        password: "secret".to_string(),
        query: "*".to_string(),
        readers,
        queue_capacity,
        retry_delay: Duration::from_millis(5),
        ..Default::default()
    };
    PullSession::with_peer(config, peer, store).unwrap()
}

/// Poll `condition` until it holds or five seconds pass.
pub(crate) async fn wait_for(what: &str, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
