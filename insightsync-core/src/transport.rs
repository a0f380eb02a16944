//! HTTP transport seam.
//!
//! The fetcher only needs "GET this URL with these query parameters and hand
//! me the status and body". Keeping that behind a trait lets tests script a
//! page chain without a network, the same way providers are mocked elsewhere.

use std::time::Duration;
use thiserror::Error;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// A fully-read HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// Final request URL, including the encoded query string.
    pub url: String,
    pub body: String,
}

impl HttpResponse {
    pub fn is_error(&self) -> bool {
        self.status >= 400
    }
}

/// Network-level failure: timeout, connection refused, TLS, unreadable body.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("network unreachable: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Other(String),
}

/// Blocking GET transport.
pub trait HttpTransport: Send + Sync {
    /// Issue one GET. An empty `params` slice sends the URL untouched.
    fn get(&self, url: &str, params: &[(String, String)]) -> Result<HttpResponse, TransportError>;
}

/// `reqwest` blocking client with a per-request timeout.
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("insightsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Other(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    pub fn with_timeout_secs(secs: u64) -> Result<Self, TransportError> {
        Self::new(Duration::from_secs(secs))
    }
}

fn classify(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Other(e.to_string())
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(&self, url: &str, params: &[(String, String)]) -> Result<HttpResponse, TransportError> {
        let mut request = self.client.get(url);
        if !params.is_empty() {
            request = request.query(params);
        }

        let resp = request.send().map_err(classify)?;
        let status = resp.status().as_u16();
        let final_url = resp.url().to_string();
        let body = resp.text().map_err(classify)?;

        Ok(HttpResponse {
            status,
            url: final_url,
            body,
        })
    }
}
