//! The HTTP seam.
//!
//! Everything above this module talks to the network through the
//! [`Transport`] trait, so the fetch policy and pagination walker can be
//! exercised against in-memory page sources. [`ReqwestTransport`] is the
//! production implementation.

use std::time::Duration;

use async_trait::async_trait;
use listcrawl_crawl_models::Identity;

/// A received HTTP response. Any status is a response; only failures to get
/// one at all are [`TransportError`]s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Final URL after redirects. Relative links on the page resolve
    /// against this.
    pub url: String,
    /// HTTP status code.
    pub status: u16,
    /// Decoded response body.
    pub body: String,
}

impl Response {
    /// Creates a response.
    #[must_use]
    pub fn new(url: &str, status: u16, body: &str) -> Self {
        Self {
            url: url.to_owned(),
            status,
            body: body.to_owned(),
        }
    }

    /// Returns `true` for `2xx` statuses.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Why a request produced no response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The request did not complete within its timeout.
    Timeout,
    /// The connection could not be established or was reset.
    Connect,
    /// The response body could not be read or decoded.
    Body,
    /// The request failed while being sent.
    Request,
    /// Anything else (invalid URL, invalid header, ...). Not retried.
    Other,
}

/// A request that produced no response.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind:?} error for {url}: {message}")]
pub struct TransportError {
    /// Failure category.
    pub kind: TransportErrorKind,
    /// The requested URL.
    pub url: String,
    /// Human-readable detail.
    pub message: String,
}

impl TransportError {
    /// Creates a transport error.
    #[must_use]
    pub fn new(kind: TransportErrorKind, url: &str, message: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.to_owned(),
            message: message.into(),
        }
    }

    /// A timeout after `after`.
    #[must_use]
    pub fn timeout(url: &str, after: Duration) -> Self {
        Self::new(
            TransportErrorKind::Timeout,
            url,
            format!("no response within {after:?}"),
        )
    }

    /// Returns `true` if repeating the request might succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.kind != TransportErrorKind::Other
    }
}

/// Performs a single HTTP GET.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetches `url`, sending `identity`'s user agent and headers when
    /// given, and giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if no response was received.
    async fn get(
        &self,
        url: &str,
        identity: Option<&Identity>,
        timeout: Duration,
    ) -> Result<Response, TransportError>;
}

/// [`Transport`] backed by a shared [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Creates a transport whose requests default to `user_agent` when no
    /// identity overrides it.
    ///
    /// # Errors
    ///
    /// Returns [`reqwest::Error`] if the client cannot be built (e.g. the TLS
    /// backend fails to initialize).
    pub fn new(user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().user_agent(user_agent).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(
        &self,
        url: &str,
        identity: Option<&Identity>,
        timeout: Duration,
    ) -> Result<Response, TransportError> {
        let mut request = self.client.get(url).timeout(timeout);
        if let Some(identity) = identity {
            request = request.header(reqwest::header::USER_AGENT, identity.user_agent.as_str());
            for (name, value) in &identity.headers {
                request = request.header(name.as_str(), value.as_str());
            }
        }

        let response = request.send().await.map_err(|e| classify(url, &e))?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let body = response.text().await.map_err(|e| classify(url, &e))?;

        Ok(Response {
            url: final_url,
            status,
            body,
        })
    }
}

/// Maps a [`reqwest::Error`] onto a [`TransportErrorKind`].
fn classify(url: &str, e: &reqwest::Error) -> TransportError {
    let kind = if e.is_timeout() {
        TransportErrorKind::Timeout
    } else if e.is_connect() {
        TransportErrorKind::Connect
    } else if e.is_body() || e.is_decode() {
        TransportErrorKind::Body
    } else if e.is_builder() {
        TransportErrorKind::Other
    } else if e.is_request() {
        TransportErrorKind::Request
    } else {
        TransportErrorKind::Other
    };
    TransportError::new(kind, url, e.to_string())
}
