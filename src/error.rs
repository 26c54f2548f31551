//! Error types for cas-pull.
//!
//! The engine is designed for unattended, long-running synchronization, so
//! operational failures are never surfaced to the caller: peer and store
//! errors are retried indefinitely and observable only through logs and
//! events. Only [`Error`] variants escape the public API, and only at session
//! creation or start.

use thiserror::Error;

/// Result type alias for cas-pull operations
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal errors surfaced synchronously by the public API.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g. "host")
        key: Option<String>,
    },

    /// `start` was called on a session that is already running
    #[error("pull session is already running")]
    AlreadyRunning,
}

impl Error {
    pub(crate) fn config(message: impl Into<String>, key: &str) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}

/// Failures talking to the remote peer.
///
/// All variants are transient from the engine's point of view: listing
/// failures trigger the reconnect protocol, fetch failures are retried with
/// the fixed delay until success or stop.
#[derive(Debug, Error)]
pub enum PeerError {
    /// The peer rejected the request with an authorization-required status
    /// (401/403); the engine refreshes credentials before the next attempt
    #[error("peer requires authentication")]
    AuthRequired,

    /// The peer answered with a non-success status outside the auth class
    #[error("peer returned status {0}")]
    Status(u16),

    /// Transport-level failure
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O failure while reading a response stream
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer's response violated the catalog protocol
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Failures from the local object store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store refused the staged object or batch (e.g. hash mismatch)
    #[error("store rejected batch: {0}")]
    Rejected(String),

    /// Underlying storage I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
