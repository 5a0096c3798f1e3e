//! The closed set of route filters.
//!
//! A route declares filters by name with untyped settings ([`FilterSpec`]). Each name maps
//! to one [`Filter`] variant that owns its typed settings; unknown names become a no-op
//! [`Filter::Generic`]. Conversion never fails: malformed settings fall back to the
//! variant's defaults and are reported as [`SettingWarning`]s.
mod auth;
mod body;
mod cors;
mod headers;
mod logging;
mod path;
mod rate_limit;
pub mod settings;
mod terminal;

use axum::body::Body;
use futures_util::future::BoxFuture;
use hyper::{HeaderMap, Request, Response};
use thiserror::Error;

pub use self::{
    auth::AuthFilter,
    body::{ModifyRequestBodyFilter, ModifyResponseBodyFilter, RequestSizeFilter},
    cors::CorsFilter,
    headers::{AddHeaderFilter, HeaderTarget, MapRequestHeaderFilter, RemoveHeaderFilter},
    logging::LoggingFilter,
    path::{
        AddRequestParamFilter, PrefixPathFilter, RewritePathFilter, SetPathFilter,
        StripPrefixFilter,
    },
    rate_limit::RateLimitFilter,
    settings::{SettingWarning, SettingsReader},
    terminal::{RedirectToFilter, SetStatusFilter},
};
use crate::{config::models::FilterSpec, core::chain::Next};

/// Errors raised by response hooks.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum FilterError {
    #[error("Failed to read response body: {0}")]
    Body(String),
}

/// Registry names of the known filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
    Logging,
    RateLimit,
    Auth,
    AddHeader,
    RemoveHeader,
    AddRequestParam,
    RewritePath,
    SetPath,
    StripPrefix,
    PrefixPath,
    RedirectTo,
    SetStatus,
    ModifyRequestBody,
    ModifyResponseBody,
    CorsWeb,
    MapRequestHeader,
    PreserveHostHeader,
    RequestSize,
    Generic,
}

impl FilterKind {
    /// Exact, case-sensitive lookup; unknown names resolve to `Generic`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "Logging" => FilterKind::Logging,
            "RateLimit" => FilterKind::RateLimit,
            "Auth" => FilterKind::Auth,
            "AddHeader" => FilterKind::AddHeader,
            "RemoveHeader" => FilterKind::RemoveHeader,
            "AddRequestParam" => FilterKind::AddRequestParam,
            "RewritePath" => FilterKind::RewritePath,
            "SetPath" => FilterKind::SetPath,
            "StripPrefix" => FilterKind::StripPrefix,
            "PrefixPath" => FilterKind::PrefixPath,
            "RedirectTo" => FilterKind::RedirectTo,
            "SetStatus" => FilterKind::SetStatus,
            "ModifyRequestBody" => FilterKind::ModifyRequestBody,
            "ModifyResponseBody" => FilterKind::ModifyResponseBody,
            "CorsWebFilter" => FilterKind::CorsWeb,
            "MapRequestHeader" => FilterKind::MapRequestHeader,
            "PreserveHostHeader" => FilterKind::PreserveHostHeader,
            "RequestSize" => FilterKind::RequestSize,
            _ => FilterKind::Generic,
        }
    }

    /// Inverse of [`FilterKind::from_name`].
    pub fn name(self) -> &'static str {
        match self {
            FilterKind::Logging => "Logging",
            FilterKind::RateLimit => "RateLimit",
            FilterKind::Auth => "Auth",
            FilterKind::AddHeader => "AddHeader",
            FilterKind::RemoveHeader => "RemoveHeader",
            FilterKind::AddRequestParam => "AddRequestParam",
            FilterKind::RewritePath => "RewritePath",
            FilterKind::SetPath => "SetPath",
            FilterKind::StripPrefix => "StripPrefix",
            FilterKind::PrefixPath => "PrefixPath",
            FilterKind::RedirectTo => "RedirectTo",
            FilterKind::SetStatus => "SetStatus",
            FilterKind::ModifyRequestBody => "ModifyRequestBody",
            FilterKind::ModifyResponseBody => "ModifyResponseBody",
            FilterKind::CorsWeb => "CorsWebFilter",
            FilterKind::MapRequestHeader => "MapRequestHeader",
            FilterKind::PreserveHostHeader => "PreserveHostHeader",
            FilterKind::RequestSize => "RequestSize",
            FilterKind::Generic => "Generic",
        }
    }
}

/// An executable filter with typed settings.
#[derive(Debug)]
pub enum Filter {
    Logging(LoggingFilter),
    RateLimit(RateLimitFilter),
    Auth(AuthFilter),
    AddHeader(AddHeaderFilter),
    RemoveHeader(RemoveHeaderFilter),
    AddRequestParam(AddRequestParamFilter),
    RewritePath(RewritePathFilter),
    SetPath(SetPathFilter),
    StripPrefix(StripPrefixFilter),
    PrefixPath(PrefixPathFilter),
    RedirectTo(RedirectToFilter),
    SetStatus(SetStatusFilter),
    ModifyRequestBody(ModifyRequestBodyFilter),
    ModifyResponseBody(ModifyResponseBodyFilter),
    CorsWeb(CorsFilter),
    MapRequestHeader(MapRequestHeaderFilter),
    /// The inbound `Host` header is always forwarded; kept so configs naming it stay valid.
    PreserveHostHeader,
    RequestSize(RequestSizeFilter),
    Generic { name: String },
}

impl Filter {
    /// Convert a declaration into its typed form. Pure: the same spec always yields the
    /// same settings and warnings.
    pub fn from_spec(spec: &FilterSpec) -> (Filter, Vec<SettingWarning>) {
        let mut reader = SettingsReader::new(spec);
        let filter = match FilterKind::from_name(&spec.name) {
            FilterKind::Logging => Filter::Logging(LoggingFilter::from_settings(&mut reader)),
            FilterKind::RateLimit => Filter::RateLimit(RateLimitFilter::from_settings(&mut reader)),
            FilterKind::Auth => Filter::Auth(AuthFilter::from_settings(&mut reader)),
            FilterKind::AddHeader => Filter::AddHeader(AddHeaderFilter::from_settings(&mut reader)),
            FilterKind::RemoveHeader => {
                Filter::RemoveHeader(RemoveHeaderFilter::from_settings(&mut reader))
            }
            FilterKind::AddRequestParam => {
                Filter::AddRequestParam(AddRequestParamFilter::from_settings(&mut reader))
            }
            FilterKind::RewritePath => {
                Filter::RewritePath(RewritePathFilter::from_settings(&mut reader))
            }
            FilterKind::SetPath => Filter::SetPath(SetPathFilter::from_settings(&mut reader)),
            FilterKind::StripPrefix => {
                Filter::StripPrefix(StripPrefixFilter::from_settings(&mut reader))
            }
            FilterKind::PrefixPath => {
                Filter::PrefixPath(PrefixPathFilter::from_settings(&mut reader))
            }
            FilterKind::RedirectTo => {
                Filter::RedirectTo(RedirectToFilter::from_settings(&mut reader))
            }
            FilterKind::SetStatus => Filter::SetStatus(SetStatusFilter::from_settings(&mut reader)),
            FilterKind::ModifyRequestBody => {
                Filter::ModifyRequestBody(ModifyRequestBodyFilter::from_settings(&mut reader))
            }
            FilterKind::ModifyResponseBody => {
                Filter::ModifyResponseBody(ModifyResponseBodyFilter::from_settings(&mut reader))
            }
            FilterKind::CorsWeb => Filter::CorsWeb(CorsFilter::from_settings(&mut reader)),
            FilterKind::MapRequestHeader => {
                Filter::MapRequestHeader(MapRequestHeaderFilter::from_settings(&mut reader))
            }
            FilterKind::PreserveHostHeader => Filter::PreserveHostHeader,
            FilterKind::RequestSize => {
                Filter::RequestSize(RequestSizeFilter::from_settings(&mut reader))
            }
            FilterKind::Generic => {
                reader.warn("name", "unknown filter, requests pass through unchanged");
                Filter::Generic {
                    name: spec.name.clone(),
                }
            }
        };
        (filter, reader.finish())
    }

    pub fn kind(&self) -> FilterKind {
        match self {
            Filter::Logging(_) => FilterKind::Logging,
            Filter::RateLimit(_) => FilterKind::RateLimit,
            Filter::Auth(_) => FilterKind::Auth,
            Filter::AddHeader(_) => FilterKind::AddHeader,
            Filter::RemoveHeader(_) => FilterKind::RemoveHeader,
            Filter::AddRequestParam(_) => FilterKind::AddRequestParam,
            Filter::RewritePath(_) => FilterKind::RewritePath,
            Filter::SetPath(_) => FilterKind::SetPath,
            Filter::StripPrefix(_) => FilterKind::StripPrefix,
            Filter::PrefixPath(_) => FilterKind::PrefixPath,
            Filter::RedirectTo(_) => FilterKind::RedirectTo,
            Filter::SetStatus(_) => FilterKind::SetStatus,
            Filter::ModifyRequestBody(_) => FilterKind::ModifyRequestBody,
            Filter::ModifyResponseBody(_) => FilterKind::ModifyResponseBody,
            Filter::CorsWeb(_) => FilterKind::CorsWeb,
            Filter::MapRequestHeader(_) => FilterKind::MapRequestHeader,
            Filter::PreserveHostHeader => FilterKind::PreserveHostHeader,
            Filter::RequestSize(_) => FilterKind::RequestSize,
            Filter::Generic { .. } => FilterKind::Generic,
        }
    }

    /// Registry name, as written in configuration.
    pub fn name(&self) -> &str {
        match self {
            Filter::Generic { name } => name,
            other => other.kind().name(),
        }
    }

    /// Whether the filter also post-processes upstream responses.
    pub fn is_response_filter(&self) -> bool {
        matches!(self, Filter::ModifyResponseBody(_) | Filter::CorsWeb(_))
    }

    /// Run the request side of the filter.
    pub fn apply<'a>(&'a self, req: Request<Body>, next: Next<'a>) -> BoxFuture<'a, Response<Body>> {
        Box::pin(async move {
            match self {
                Filter::Logging(f) => f.apply(req, next).await,
                Filter::RateLimit(f) => f.apply(req, next).await,
                Filter::Auth(f) => f.apply(req, next).await,
                Filter::AddHeader(f) => f.apply(req, next).await,
                Filter::RemoveHeader(f) => f.apply(req, next).await,
                Filter::AddRequestParam(f) => f.apply(req, next).await,
                Filter::RewritePath(f) => f.apply(req, next).await,
                Filter::SetPath(f) => f.apply(req, next).await,
                Filter::StripPrefix(f) => f.apply(req, next).await,
                Filter::PrefixPath(f) => f.apply(req, next).await,
                Filter::RedirectTo(f) => f.respond(),
                Filter::SetStatus(f) => f.respond(),
                Filter::ModifyRequestBody(f) => f.apply(req, next).await,
                Filter::CorsWeb(f) => f.apply(req, next).await,
                Filter::MapRequestHeader(f) => f.apply(req, next).await,
                Filter::RequestSize(f) => f.apply(req, next).await,
                Filter::ModifyResponseBody(_)
                | Filter::PreserveHostHeader
                | Filter::Generic { .. } => next.run(req).await,
            }
        })
    }

    /// Run the response hook, if the filter has one.
    pub async fn apply_response(
        &self,
        response: Response<Body>,
        request_headers: &HeaderMap,
    ) -> Result<Response<Body>, FilterError> {
        match self {
            Filter::ModifyResponseBody(f) => f.apply_response(response).await,
            Filter::CorsWeb(f) => Ok(f.apply_response(response, request_headers)),
            _ => Ok(response),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KNOWN_NAMES: [&str; 18] = [
        "Logging",
        "RateLimit",
        "Auth",
        "AddHeader",
        "RemoveHeader",
        "AddRequestParam",
        "RewritePath",
        "SetPath",
        "StripPrefix",
        "PrefixPath",
        "RedirectTo",
        "SetStatus",
        "ModifyRequestBody",
        "ModifyResponseBody",
        "CorsWebFilter",
        "MapRequestHeader",
        "PreserveHostHeader",
        "RequestSize",
    ];

    #[test]
    fn test_registry_resolves_every_known_name() {
        for name in KNOWN_NAMES {
            let (filter, _) = Filter::from_spec(&FilterSpec::new(name));
            assert_ne!(filter.kind(), FilterKind::Generic, "{name}");
            assert_eq!(filter.name(), name);
            assert_eq!(FilterKind::from_name(name).name(), name);
        }
    }

    #[test]
    fn test_empty_settings_convert_identically_twice() {
        for name in KNOWN_NAMES.into_iter().chain(["Unknown"]) {
            let spec = FilterSpec::new(name);
            let (first, first_warnings) = Filter::from_spec(&spec);
            let (second, second_warnings) = Filter::from_spec(&spec);
            assert_eq!(format!("{first:?}"), format!("{second:?}"), "{name}");
            assert_eq!(first_warnings, second_warnings, "{name}");
        }
    }

    #[test]
    fn test_unknown_names_become_generic() {
        let (filter, warnings) = Filter::from_spec(&FilterSpec::new("logging"));
        assert_eq!(filter.kind(), FilterKind::Generic);
        assert_eq!(filter.name(), "logging");
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_response_filters() {
        let (cors, _) = Filter::from_spec(&FilterSpec::new("CorsWebFilter"));
        let (body, _) = Filter::from_spec(&FilterSpec::new("ModifyResponseBody"));
        let (status, _) = Filter::from_spec(&FilterSpec::new("SetStatus"));
        assert!(cors.is_response_filter());
        assert!(body.is_response_filter());
        assert!(!status.is_response_filter());
    }
}
