//! First-match route selection.
//!
//! Routes are tested in catalog order; the first route whose predicates all hold wins.
//! There is no specificity scoring: operators order the catalog from most to least
//! specific.
use hyper::{Request, header};

use crate::config::models::RouteConfig;

/// Host of the request: the `Host` header, falling back to the URI authority.
pub fn request_host<B>(req: &Request<B>) -> Option<&str> {
    req.headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .or_else(|| req.uri().authority().map(|a| a.as_str()))
}

/// Whether every predicate declared on `route` holds for `req`.
pub fn route_matches<B>(route: &RouteConfig, req: &Request<B>) -> bool {
    if !route.is_enabled() {
        return false;
    }

    if !req.uri().path().starts_with(&route.path_prefix) {
        return false;
    }

    if !route.methods.is_empty() && !route.methods.iter().any(|m| m == req.method().as_str()) {
        return false;
    }

    if !route.host.is_empty() && request_host(req) != Some(route.host.as_str()) {
        return false;
    }

    let headers_match = route.headers.iter().all(|(name, expected)| {
        req.headers()
            .get(name.as_str())
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == expected)
    });
    if !headers_match {
        return false;
    }

    if !route.query_params.is_empty() {
        let query = req.uri().query().unwrap_or_default();
        let params_match = route.query_params.iter().all(|(key, expected)| {
            url::form_urlencoded::parse(query.as_bytes())
                .find(|(k, _)| k == key.as_str())
                .is_some_and(|(_, v)| v == expected.as_str())
        });
        if !params_match {
            return false;
        }
    }

    true
}

/// Index of the first route matching `req`.
pub fn find_route<'a, B, I>(routes: I, req: &Request<B>) -> Option<usize>
where
    I: IntoIterator<Item = &'a RouteConfig>,
{
    routes.into_iter().position(|route| route_matches(route, req))
}
