use async_trait::async_trait;
use axum::body::Body as AxumBody;
use hyper::{Request, Response};
use thiserror::Error;

/// Errors raised while talking to an upstream
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpClientError {
    /// Error when the connection to the upstream fails
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error when the upstream does not answer in time
    #[error("Timeout error after {0} seconds")]
    Timeout(u64),

    /// Error when the outbound request cannot be built or sent
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Result type alias for HTTP client operations
pub type HttpClientResult<T> = Result<T, HttpClientError>;

/// HttpClient defines the port (interface) used by the reverse proxy to reach upstreams.
///
/// Any received response is `Ok`, whatever its status; only transport problems are errors.
#[async_trait]
pub trait HttpClient: Send + Sync + 'static {
    /// Send a fully addressed (absolute URI) request to an upstream.
    async fn send_request(&self, req: Request<AxumBody>) -> HttpClientResult<Response<AxumBody>>;
}
