//! Core types and events.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Maximum accepted length of a hash algorithm name.
const ALGO_MAX: usize = 31;
/// Maximum accepted length of a hash value.
const HASH_MAX: usize = 255;

/// Content reference naming one immutable object: a hash algorithm plus the hash
/// of the object's body.
///
/// The wire form used by the catalog protocol is `hash://<algorithm>/<hash>`,
/// one identifier per listing line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId {
    /// Hash algorithm name, e.g. `sha256`
    pub algorithm: String,
    /// Hash value, typically hex or URL-safe base64
    pub hash: String,
}

impl ObjectId {
    /// Build an identifier from its components, validating length and charset.
    pub fn new(
        algorithm: impl Into<String>,
        hash: impl Into<String>,
    ) -> std::result::Result<Self, ParseObjectIdError> {
        let algorithm = algorithm.into();
        let hash = hash.into();
        validate_component(&algorithm, "algorithm", ALGO_MAX)?;
        validate_component(&hash, "hash", HASH_MAX)?;
        Ok(Self { algorithm, hash })
    }
}

fn validate_component(
    value: &str,
    what: &str,
    max: usize,
) -> std::result::Result<(), ParseObjectIdError> {
    if value.is_empty() {
        return Err(ParseObjectIdError {
            reason: format!("empty {what}"),
        });
    }
    if value.len() > max {
        return Err(ParseObjectIdError {
            reason: format!("{what} longer than {max} bytes"),
        });
    }
    if !value
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'-' | b'_' | b'+' | b'='))
    {
        return Err(ParseObjectIdError {
            reason: format!("{what} contains invalid characters"),
        });
    }
    Ok(())
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hash://{}/{}", self.algorithm, self.hash)
    }
}

impl FromStr for ObjectId {
    type Err = ParseObjectIdError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let rest = s.strip_prefix("hash://").ok_or_else(|| ParseObjectIdError {
            reason: "missing hash:// prefix".to_string(),
        })?;
        let (algorithm, hash) = rest.split_once('/').ok_or_else(|| ParseObjectIdError {
            reason: "missing algorithm/hash separator".to_string(),
        })?;
        ObjectId::new(algorithm, hash)
    }
}

/// Error returned when an object identifier fails to parse or validate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid object identifier: {reason}")]
pub struct ParseObjectIdError {
    /// Why the identifier was rejected
    pub reason: String,
}

/// An object fetched from the peer and staged in the local store, awaiting
/// atomic batch commit.
#[derive(Debug, Clone)]
pub struct PendingObject {
    /// Identifier the peer listed this object under
    pub id: ObjectId,
    /// Content type reported by the peer
    pub content_type: String,
    /// Raw object body
    pub body: Vec<u8>,
}

/// Events broadcast by a running [`PullSession`](crate::PullSession).
///
/// Subscribers receive all events independently; if nobody subscribes the
/// events are silently dropped.
#[derive(Debug, Clone)]
pub enum Event {
    /// The listing stream (re)connected successfully
    ListingConnected,
    /// A listing connect attempt failed and will be retried after the
    /// configured delay
    ListingRetry {
        /// Failure description for the attempt
        error: String,
    },
    /// The session cookie was replaced after an authorization failure
    AuthRefreshed,
    /// A batch of objects was committed to the local store
    BatchCommitted {
        /// Number of objects in the batch
        objects: usize,
        /// Identifiers skipped since the previous commit (already present
        /// locally or abandoned at shutdown)
        skipped: usize,
        /// Commit throughput in objects per second
        per_second: f64,
    },
    /// The session finished stopping; all worker tasks have exited
    Stopped,
}
