//! HTTP client wrapper shared by discovery and the processing functions.
//!
//! The client is created once and cloned into every task so connection
//! pooling applies across the whole run.

use std::path::Path;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use tracing::{debug, instrument};

use super::error::FetchError;
use crate::filename::remote_url;
use crate::user_agent;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default whole-request timeout (5 minutes). The pool's per-attempt timeout
/// usually fires first.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Source bytes plus the declared content type, when there was one.
#[derive(Debug, Clone)]
pub struct FetchedBody {
    /// Raw body bytes.
    pub bytes: Vec<u8>,
    /// `Content-Type` header value without parameters.
    pub content_type: Option<String>,
}

/// HTTP client with the harvester's timeouts and User-Agent.
///
/// # Example
///
/// ```no_run
/// use harvester_core::HttpClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::new()?;
/// let page = client.fetch_text("https://example.com/gallery").await?;
/// println!("{} bytes of markup", page.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Creates a client with the default timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Client`] if the TLS backend cannot be initialized.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeouts(CONNECT_TIMEOUT, REQUEST_TIMEOUT)
    }

    /// Creates a client with explicit timeout values.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Client`] if the TLS backend cannot be initialized.
    pub fn with_timeouts(connect: Duration, request: Duration) -> Result<Self, FetchError> {
        let ua = user_agent::default_user_agent();
        build_client(connect, request, &ua).map(|client| Self { client })
    }

    /// Creates a client that presents a browser User-Agent.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Client`] if the TLS backend cannot be initialized.
    pub fn with_browser_agent(connect: Duration, request: Duration) -> Result<Self, FetchError> {
        build_client(connect, request, user_agent::BROWSER_USER_AGENT)
            .map(|client| Self { client })
    }

    /// Returns the underlying reqwest client.
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Sends a GET and returns the response if its status is 2xx.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] if the URL is not http(s), the request fails,
    /// or the server answers with a non-2xx status.
    #[instrument(level = "debug", skip(self), fields(url = %url))]
    pub async fn get(&self, url: &str) -> Result<Response, FetchError> {
        let parsed = remote_url(url).ok_or_else(|| FetchError::invalid_url(url))?;
        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| FetchError::network(url, e))?;

        let status = response.status();
        if !status.is_success() {
            debug!(status = status.as_u16(), "non-success status");
            return Err(FetchError::http_status(url, status.as_u16()));
        }
        Ok(response)
    }

    /// Fetches a URL into memory.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`get`](Self::get), plus network errors
    /// while reading the body.
    pub async fn fetch_bytes(&self, url: &str) -> Result<FetchedBody, FetchError> {
        let response = self.get(url).await?;
        let content_type = content_type_of(&response);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::network(url, e))?;
        Ok(FetchedBody {
            bytes: bytes.to_vec(),
            content_type,
        })
    }

    /// Fetches a URL as text (used for gallery pages).
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`fetch_bytes`](Self::fetch_bytes).
    pub async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        let response = self.get(url).await?;
        response.text().await.map_err(|e| FetchError::network(url, e))
    }

    /// Reads a work item's source: GET for URLs, a file read for local paths.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] if the source cannot be fetched or read.
    pub async fn read_source(&self, locator: &str) -> Result<FetchedBody, FetchError> {
        if remote_url(locator).is_some() {
            return self.fetch_bytes(locator).await;
        }
        let path = Path::new(locator);
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| FetchError::read(path, e))?;
        Ok(FetchedBody {
            bytes,
            content_type: None,
        })
    }
}

/// Returns the response's media type without parameters.
pub(crate) fn content_type_of(response: &Response) -> Option<String> {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| {
            value
                .split(';')
                .next()
                .unwrap_or(value)
                .trim()
                .to_ascii_lowercase()
        })
        .filter(|value| !value.is_empty())
}

fn build_client(connect: Duration, request: Duration, user_agent: &str) -> Result<Client, FetchError> {
    Client::builder()
        .connect_timeout(connect)
        .timeout(request)
        .gzip(true)
        .user_agent(user_agent)
        .build()
        .map_err(|source| FetchError::Client { source })
}
