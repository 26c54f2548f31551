//! Peer catalog protocol client.
//!
//! The engine drives the remote peer through the [`PeerClient`] trait: one
//! long-lived listing stream enumerating identifiers, per-object fetches, and
//! a credential exchange returning a session cookie. [`HttpPeer`] is the
//! production implementation over HTTP; tests script their own.

mod http;

pub use http::HttpPeer;

use crate::error::PeerError;
use crate::types::ObjectId;
use async_trait::async_trait;

/// An object body fetched from the peer, not yet staged locally.
#[derive(Debug, Clone)]
pub struct FetchedObject {
    /// Content type reported by the peer
    pub content_type: String,
    /// Raw object body
    pub body: Vec<u8>,
}

/// A remote peer exposing the catalog protocol.
#[async_trait]
pub trait PeerClient: Send + Sync {
    /// Open a listing stream enumerating every object matching `query`.
    ///
    /// The stream is a whole snapshot, terminated by connection close; there
    /// is no pagination. A 401/403-class response maps to
    /// [`PeerError::AuthRequired`].
    async fn open_listing(
        &self,
        query: &str,
        cookie: Option<&str>,
    ) -> Result<Box<dyn ListingStream>, PeerError>;

    /// Fetch one object's body by identifier.
    async fn fetch_object(
        &self,
        id: &ObjectId,
        cookie: Option<&str>,
    ) -> Result<FetchedObject, PeerError>;

    /// Submit credentials and obtain a fresh session cookie.
    async fn authenticate(&self, username: &str, password: &str) -> Result<String, PeerError>;
}

/// Line-oriented listing stream: one identifier per line.
#[async_trait]
pub trait ListingStream: Send + Sync {
    /// Read the next line, without its terminator.
    ///
    /// `Ok(None)` means the snapshot ended cleanly (connection closed).
    async fn next_line(&mut self) -> Result<Option<String>, PeerError>;
}

impl std::fmt::Debug for dyn ListingStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ListingStream")
    }
}
