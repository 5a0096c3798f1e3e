use std::{fmt, str::FromStr};

use hyper::Uri;
use thiserror::Error;

/// Errors related to upstream addressing
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum UpstreamError {
    /// Error when URL is invalid
    #[error("Invalid upstream URL: {0}")]
    InvalidUrl(String),
}

/// Result type for upstream operations
pub type UpstreamResult<T> = Result<T, UpstreamError>;

/// A parsed upstream base URL (`scheme://authority[/base/path][?query]`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamUrl {
    raw: String,
    scheme: String,
    authority: String,
    base_path: String,
    base_query: Option<String>,
}

impl UpstreamUrl {
    /// Parses an upstream URL; only http and https are accepted.
    pub fn new(url: &str) -> UpstreamResult<Self> {
        let uri: Uri = url
            .parse()
            .map_err(|e| UpstreamError::InvalidUrl(format!("{url}: {e}")))?;

        let scheme = match uri.scheme_str() {
            Some(s @ ("http" | "https")) => s.to_string(),
            _ => {
                return Err(UpstreamError::InvalidUrl(format!(
                    "Upstream URL must start with http:// or https://, got: {url}"
                )));
            }
        };
        let authority = uri
            .authority()
            .map(|a| a.to_string())
            .filter(|a| !a.is_empty())
            .ok_or_else(|| UpstreamError::InvalidUrl(format!("Upstream URL has no host: {url}")))?;

        Ok(Self {
            raw: url.to_string(),
            scheme,
            authority,
            base_path: uri.path().trim_end_matches('/').to_string(),
            base_query: uri.query().filter(|q| !q.is_empty()).map(str::to_string),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// `host[:port]` of the upstream, as reported in `x-zentro-upstream`.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn is_secure(&self) -> bool {
        self.scheme == "https"
    }

    /// Builds the outbound URI: the upstream base path joined with the request path,
    /// and the upstream query (if any) followed by the request query.
    pub fn join(&self, request_path: &str, request_query: Option<&str>) -> UpstreamResult<Uri> {
        let path = if request_path.starts_with('/') {
            format!("{}{}", self.base_path, request_path)
        } else {
            format!("{}/{}", self.base_path, request_path)
        };

        let query = match (self.base_query.as_deref(), request_query.filter(|q| !q.is_empty())) {
            (Some(base), Some(req)) => Some(format!("{base}&{req}")),
            (Some(base), None) => Some(base.to_string()),
            (None, Some(req)) => Some(req.to_string()),
            (None, None) => None,
        };

        let target = match query {
            Some(q) => format!("{}://{}{}?{}", self.scheme, self.authority, path, q),
            None => format!("{}://{}{}", self.scheme, self.authority, path),
        };

        target
            .parse()
            .map_err(|e| UpstreamError::InvalidUrl(format!("{target}: {e}")))
    }
}

impl FromStr for UpstreamUrl {
    type Err = UpstreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UpstreamUrl::new(s)
    }
}

impl fmt::Display for UpstreamUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}
