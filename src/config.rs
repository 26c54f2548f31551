//! Session configuration.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Configuration for a [`PullSession`](crate::PullSession).
///
/// `host`, `username`, `password` and `query` are required; everything else
/// has the representative defaults (16 readers, a 512-slot queue, 5 second
/// retry delay).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullConfig {
    /// Base URL of the remote peer, e.g. `https://peer.example.com:8000`
    pub host: String,

    /// Username for the peer's credential-submission endpoint
    pub username: String,

    /// Password for the peer's credential-submission endpoint
    pub password: String,

    /// Pre-existing session cookie, if one was persisted from an earlier run
    #[serde(default)]
    pub cookie: Option<String>,

    /// Catalog query selecting the objects to replicate
    pub query: String,

    /// Number of concurrent reader tasks (default: 16)
    #[serde(default = "default_readers")]
    pub readers: usize,

    /// Capacity of the bounded slot queue between readers and the writer
    /// (default: 512). Also bounds the writer's commit batch size.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Fixed delay between attempts for every retry loop: listing reconnect,
    /// object fetch and batch commit (default: 5 seconds)
    #[serde(default = "default_retry_delay", with = "duration_serde")]
    pub retry_delay: Duration,
}

fn default_readers() -> usize {
    16
}

fn default_queue_capacity() -> usize {
    512
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(5)
}

impl Default for PullConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            username: String::new(),
            password: String::new(),
            cookie: None,
            query: String::new(),
            readers: default_readers(),
            queue_capacity: default_queue_capacity(),
            retry_delay: default_retry_delay(),
        }
    }
}

impl PullConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the offending key if the host is
    /// missing or unparsable, credentials or query are empty, or the
    /// concurrency/capacity settings are zero.
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(Error::config("peer host must not be empty", "host"));
        }
        Url::parse(&self.host)
            .map_err(|e| Error::config(format!("invalid peer host '{}': {e}", self.host), "host"))?;
        if self.username.is_empty() {
            return Err(Error::config("username must not be empty", "username"));
        }
        if self.password.is_empty() {
            return Err(Error::config("password must not be empty", "password"));
        }
        if self.query.is_empty() {
            return Err(Error::config("query must not be empty", "query"));
        }
        if self.readers == 0 {
            return Err(Error::config("at least one reader is required", "readers"));
        }
        if self.queue_capacity == 0 {
            return Err(Error::config(
                "queue capacity must be at least 1",
                "queue_capacity",
            ));
        }
        Ok(())
    }
}

// Duration (de)serialization as whole seconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
