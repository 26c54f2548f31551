//! HTTP implementation of the peer catalog protocol.

use super::{FetchedObject, ListingStream, PeerClient};
use crate::error::PeerError;
use crate::types::ObjectId;
use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use std::pin::Pin;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::io::StreamReader;
use url::Url;

/// Catalog peer reached over HTTP.
///
/// - Listing: `GET /cas/query?q=<query>&count=all`, body is one identifier
///   per line until connection close.
/// - Object fetch: `GET /cas/file/<algorithm>/<hash>`.
/// - Auth exchange: `POST /cas/auth` with JSON credentials, answered with a
///   `Set-Cookie` session cookie.
///
/// Requests carry the session cookie when one is held. 401/403 responses map
/// to [`PeerError::AuthRequired`]; other non-2xx statuses to
/// [`PeerError::Status`].
pub struct HttpPeer {
    client: reqwest::Client,
    base: Url,
}

impl HttpPeer {
    /// Build a peer client for the given base URL.
    ///
    /// Only the connect phase is bounded by a timeout; the listing response
    /// streams for as long as the snapshot lasts.
    pub fn new(host: &str) -> Result<Self, PeerError> {
        let base = Url::parse(host)
            .map_err(|e| PeerError::Protocol(format!("invalid peer host '{host}': {e}")))?;
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client, base })
    }

    fn endpoint(&self, path: &str) -> Result<Url, PeerError> {
        self.base
            .join(path)
            .map_err(|e| PeerError::Protocol(format!("invalid endpoint '{path}': {e}")))
    }
}

fn check_status(status: StatusCode) -> Result<(), PeerError> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(PeerError::AuthRequired);
    }
    if !status.is_success() {
        return Err(PeerError::Status(status.as_u16()));
    }
    Ok(())
}

#[async_trait]
impl PeerClient for HttpPeer {
    async fn open_listing(
        &self,
        query: &str,
        cookie: Option<&str>,
    ) -> Result<Box<dyn ListingStream>, PeerError> {
        let mut url = self.endpoint("cas/query")?;
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("count", "all");

        let mut request = self.client.get(url);
        if let Some(cookie) = cookie {
            request = request.header(COOKIE, cookie);
        }
        let response = request.send().await?;
        check_status(response.status())?;

        let reader = StreamReader::new(response.bytes_stream().map_err(std::io::Error::other));
        Ok(Box::new(HttpListing {
            reader: Box::pin(reader),
        }))
    }

    async fn fetch_object(
        &self,
        id: &ObjectId,
        cookie: Option<&str>,
    ) -> Result<FetchedObject, PeerError> {
        let url = self.endpoint(&format!("cas/file/{}/{}", id.algorithm, id.hash))?;

        let mut request = self.client.get(url);
        if let Some(cookie) = cookie {
            request = request.header(COOKIE, cookie);
        }
        let response = request.send().await?;
        check_status(response.status())?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let body = response.bytes().await?.to_vec();

        Ok(FetchedObject { content_type, body })
    }

    async fn authenticate(&self, username: &str, password: &str) -> Result<String, PeerError> {
        let url = self.endpoint("cas/auth")?;
        let response = self
            .client
            .post(url)
            .json(&serde_json::json!({
                "username": username,
                "password": password,
            }))
            .send()
            .await?;
        check_status(response.status())?;

        // The session cookie is everything before the first attribute.
        response
            .headers()
            .get(SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| PeerError::Protocol("auth response carried no session cookie".into()))
    }
}

struct HttpListing {
    reader: Pin<Box<dyn AsyncBufRead + Send + Sync>>,
}

#[async_trait]
impl ListingStream for HttpListing {
    async fn next_line(&mut self) -> Result<Option<String>, PeerError> {
        let mut line = String::new();
        let read = self.reader.read_line(&mut line).await?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }
}
