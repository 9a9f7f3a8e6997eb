//! Byte sources for dataset locations.
//!
//! The cache only needs an ordered stream of body chunks and, when known, the
//! declared body length. [`HttpTransport`] provides both for `http(s)` URLs.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} responded with HTTP status {status}")]
    Status { url: String, status: StatusCode },

    #[error("Failed reading response body: {0}")]
    Body(#[source] reqwest::Error),
}

/// A response whose body has not been read yet.
pub struct TransportResponse {
    /// The declared body length. May be absent or wrong.
    pub content_length: Option<u64>,
    pub chunks: BoxStream<'static, Result<Bytes, TransportError>>,
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportResponse")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Start retrieving `location`. Resolves once the response head is available.
    async fn fetch(&self, location: &str, headers: HeaderMap) -> Result<TransportResponse, TransportError>;
}

/// Retrieves datasets with HTTP GET requests.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, location: &str, headers: HeaderMap) -> Result<TransportResponse, TransportError> {
        let response = self
            .client
            .get(location)
            .headers(headers)
            .send()
            .await
            .map_err(|source| TransportError::Request {
                url: location.to_owned(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url: location.to_owned(),
                status,
            });
        }

        let content_length = response.content_length();
        debug!(location, ?content_length, "response received");

        Ok(TransportResponse {
            content_length,
            chunks: response.bytes_stream().map_err(TransportError::Body).boxed(),
        })
    }
}
