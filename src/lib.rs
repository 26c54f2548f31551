//! # cas-pull
//!
//! Pull-based replication engine for content-addressable object stores.
//!
//! A [`PullSession`] connects to a remote peer exposing the same catalog
//! protocol, enumerates every object matching a query, fetches the ones not
//! yet present locally with a pool of concurrent readers, and commits them
//! to the local store in listing order, in atomic batches. It is built for
//! unattended federation/backup between nodes holding overlapping catalogs
//! of immutable, hash-identified objects.
//!
//! ## Design Philosophy
//!
//! - **Order-preserving** - commits always reflect the peer's listing order,
//!   however the concurrent fetches complete
//! - **Unattended** - every operational failure is retried with a fixed
//!   delay, indefinitely; only configuration errors surface to the caller
//! - **Library-first** - no CLI or UI, purely a Rust crate for embedding
//! - **Event-driven** - consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use cas_pull::{MemoryStore, PullConfig, PullSession};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PullConfig {
//!         host: "https://peer.example.com".to_string(),
//!         username: "replicator".to_string(),
//!         password: "secret".to_string(),
//!         query: "*".to_string(),
//!         ..Default::default()
//!     };
//!
//!     let store = Arc::new(MemoryStore::new());
//!     let session = PullSession::new(config, store)?;
//!     session.start().await?;
//!
//!     // Run until SIGTERM/SIGINT, then stop gracefully.
//!     cas_pull::run_until_shutdown(&session).await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Session configuration
pub mod config;
/// Error types
pub mod error;
/// Peer catalog protocol client
pub mod peer;
/// The pull/replication engine
pub mod pull;
/// Local object store interface
pub mod store;
/// Core types and events
pub mod types;

mod retry;

// Re-export commonly used types
pub use config::PullConfig;
pub use error::{Error, PeerError, Result, StoreError};
pub use peer::{FetchedObject, HttpPeer, ListingStream, PeerClient};
pub use pull::PullSession;
pub use store::{FsStore, MemoryStore, ObjectStore, StoredObject};
pub use types::{Event, ObjectId, ParseObjectIdError, PendingObject};

/// Run a started session until a termination signal arrives, then stop it.
///
/// - **Unix:** listens for SIGTERM and SIGINT, falling back to `ctrl_c` if
///   signal registration fails (containers, restricted environments).
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
pub async fn run_until_shutdown(session: &PullSession) {
    wait_for_signal().await;
    session.stop().await;
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                _ = sigint.recv() => tracing::info!("Received SIGINT signal (Ctrl+C)"),
            }
        }
        _ => {
            tracing::warn!("Could not register signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
    }
}
