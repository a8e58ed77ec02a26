use async_trait::async_trait;
use axum::body::Body as AxumBody;
use hyper::{Request, Response, StatusCode};
use thiserror::Error;

/// Custom error type for HTTP client operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpClientError {
    /// Error when connection to backend fails
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error when request times out
    #[error("Timeout error after {0} seconds")]
    Timeout(u64),

    /// Error when request is invalid
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Error when backend returns an error status code
    #[error("Backend returned error status: {status}, url: {url}")]
    BackendError {
        /// The URL that was requested
        url: String,
        /// The status code returned by the backend
        status: StatusCode,
    },

    /// Error when a response body is not the expected JSON document
    #[error("Malformed response body from {url}: {reason}")]
    MalformedBody {
        /// The URL that was requested
        url: String,
        /// Decoder error detail
        reason: String,
    },
}

/// Result type alias for HTTP client operations
pub type HttpClientResult<T> = Result<T, HttpClientError>;

/// HttpClient defines the port (interface) for talking to backend CDN nodes.
///
/// It covers the two outbound concerns this service has: proxying a client
/// request through to a chosen backend, and probing a backend's `/status`
/// endpoint for health and load.
#[async_trait]
pub trait HttpClient: Send + Sync + 'static {
    /// Send an HTTP request to a backend server (proxy passthrough)
    async fn send_request(&self, req: Request<AxumBody>) -> HttpClientResult<Response<AxumBody>>;

    /// Fetch a backend's status document as JSON.
    ///
    /// Returns an error for network failures, timeouts and non-2xx responses;
    /// a 2xx response with an unparseable body yields `MalformedBody`, which
    /// the poller treats as "reachable but reporting no usable load", not as
    /// a probe failure.
    async fn fetch_status(
        &self,
        url: &str,
        timeout_secs: u64,
    ) -> HttpClientResult<serde_json::Value>;
}
