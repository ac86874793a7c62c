//! The seam between the engine and the system under test.
//!
//! The engine only needs to issue a request and observe a status code; it measures latency and
//! enforces timeouts itself. Implement [`Transport`] to drive something other than HTTP.
#[cfg(feature = "http")]
mod http;

#[cfg(feature = "http")]
pub use http::HttpTransport;

use std::time::Duration;
use thiserror::Error;

/// A JSON `POST` descriptor. `path` is relative to whatever base the transport targets.
#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    pub path: &'static str,
    pub body: serde_json::Value,
    pub timeout: Duration,
}

impl Request {
    pub fn post(path: &'static str, body: serde_json::Value, timeout: Duration) -> Self {
        Self {
            path,
            body,
            timeout,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self { status }
    }

    /// 2xx and 3xx; anything else counts toward `http_req_failed`.
    pub fn is_expected(&self) -> bool {
        (200..400).contains(&self.status)
    }
}

/// Failures below the HTTP layer. These are never retried.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum TransportError {
    #[error("Request timed out after {}", humantime::format_duration(*.0))]
    Timeout(Duration),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request failed: {0}")]
    Request(String),
}

#[trait_variant::make(Transport: Send)]
pub trait LocalTransport {
    /// Issue `request` and resolve with the response status.
    async fn send(&self, request: &Request) -> Result<Response, TransportError>;
}

impl<T: Transport + Send + Sync> Transport for std::sync::Arc<T> {
    async fn send(&self, request: &Request) -> Result<Response, TransportError> {
        Transport::send(self.as_ref(), request).await
    }
}

/// Send `request`, bounding the wait by the request's own timeout.
pub(crate) async fn send_with_timeout<T: Transport>(
    transport: &T,
    request: &Request,
) -> Result<Response, TransportError> {
    match tokio::time::timeout(request.timeout, Transport::send(transport, request)).await {
        Ok(res) => res,
        Err(_) => Err(TransportError::Timeout(request.timeout)),
    }
}
