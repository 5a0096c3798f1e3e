//! Request target rewrites: path mutation and query parameters.
use std::collections::HashSet;

use axum::{body::Body, response::IntoResponse};
use hyper::{Request, Response, StatusCode, Uri, http::uri::PathAndQuery};
use regex::Regex;

use super::SettingsReader;
use crate::core::chain::Next;

/// Replace the path and query of `req`, keeping scheme and authority.
fn replace_target(req: &mut Request<Body>, path: &str, query: Option<&str>) -> Result<(), http::Error> {
    let path = match path {
        "" => "/".to_string(),
        p if p.starts_with('/') => p.to_string(),
        p => format!("/{p}"),
    };
    let target = match query {
        Some(q) if !q.is_empty() => format!("{path}?{q}"),
        _ => path,
    };
    let mut parts = req.uri().clone().into_parts();
    parts.path_and_query = Some(target.parse::<PathAndQuery>()?);
    *req.uri_mut() = Uri::from_parts(parts)?;
    Ok(())
}

/// Rewrite the path, keeping the query; answers 500 when the result is not a valid target.
async fn forward_with_path(mut req: Request<Body>, path: &str, next: Next<'_>) -> Response<Body> {
    let query = req.uri().query().map(str::to_owned);
    if let Err(e) = replace_target(&mut req, path, query.as_deref()) {
        tracing::warn!(path = %path, error = %e, "Rewritten path is not a valid request target");
        return (StatusCode::INTERNAL_SERVER_ERROR, "Invalid rewritten path").into_response();
    }
    next.run(req).await
}

#[derive(Debug)]
pub struct RewritePathFilter {
    /// `Err` holds the compile error of an unusable pattern.
    pattern: Result<Option<Regex>, String>,
    replacement: String,
}

impl RewritePathFilter {
    pub(super) fn from_settings(reader: &mut SettingsReader<'_>) -> Self {
        let from = reader.required_string("from");
        let replacement = reader.string_or("to", "");
        let pattern = if from.is_empty() {
            Ok(None)
        } else {
            Regex::new(&from).map(Some).map_err(|e| {
                reader.warn("from", format!("invalid regular expression: {e}"));
                e.to_string()
            })
        };
        Self { pattern, replacement }
    }

    pub(super) async fn apply(&self, req: Request<Body>, next: Next<'_>) -> Response<Body> {
        let pattern = match &self.pattern {
            Ok(Some(pattern)) => pattern,
            Ok(None) => return next.run(req).await,
            Err(e) => {
                tracing::error!(route = %next.context().route_id, error = %e, "RewritePath has no usable pattern");
                return (StatusCode::INTERNAL_SERVER_ERROR, "Invalid rewrite pattern").into_response();
            }
        };
        let path = pattern
            .replace_all(req.uri().path(), self.replacement.as_str())
            .into_owned();
        forward_with_path(req, &path, next).await
    }
}

#[derive(Debug)]
pub struct SetPathFilter {
    path: String,
}

impl SetPathFilter {
    pub(super) fn from_settings(reader: &mut SettingsReader<'_>) -> Self {
        Self {
            path: reader.required_string("path"),
        }
    }

    pub(super) async fn apply(&self, req: Request<Body>, next: Next<'_>) -> Response<Body> {
        forward_with_path(req, &self.path, next).await
    }
}

#[derive(Debug)]
pub struct StripPrefixFilter {
    prefix: String,
}

impl StripPrefixFilter {
    pub(super) fn from_settings(reader: &mut SettingsReader<'_>) -> Self {
        Self {
            prefix: reader.required_string("prefix"),
        }
    }

    pub(super) async fn apply(&self, req: Request<Body>, next: Next<'_>) -> Response<Body> {
        if self.prefix.is_empty() {
            return next.run(req).await;
        }
        let stripped = req
            .uri()
            .path()
            .strip_prefix(self.prefix.as_str())
            .map(str::to_owned);
        match stripped {
            Some(rest) => forward_with_path(req, &rest, next).await,
            None => next.run(req).await,
        }
    }
}

#[derive(Debug)]
pub struct PrefixPathFilter {
    prefix: String,
}

impl PrefixPathFilter {
    pub(super) fn from_settings(reader: &mut SettingsReader<'_>) -> Self {
        Self {
            prefix: reader.required_string("prefix"),
        }
    }

    pub(super) async fn apply(&self, req: Request<Body>, next: Next<'_>) -> Response<Body> {
        let path = format!("{}{}", self.prefix, req.uri().path());
        forward_with_path(req, &path, next).await
    }
}

/// Sets query parameters: existing keys are overwritten in place, new ones appended.
#[derive(Debug)]
pub struct AddRequestParamFilter {
    params: Vec<(String, String)>,
}

impl AddRequestParamFilter {
    pub(super) fn from_settings(reader: &mut SettingsReader<'_>) -> Self {
        Self {
            params: reader.string_map("params"),
        }
    }

    fn merged_query(&self, query: &str) -> String {
        let configured = |key: &str| {
            self.params
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };

        let mut written = HashSet::new();
        let mut out = url::form_urlencoded::Serializer::new(String::new());
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match configured(key.as_ref()) {
                Some(replacement) => {
                    if written.insert(key.to_string()) {
                        out.append_pair(&key, replacement);
                    }
                }
                None => {
                    out.append_pair(&key, &value);
                }
            }
        }
        for (key, value) in &self.params {
            if !written.contains(key) {
                out.append_pair(key, value);
            }
        }
        out.finish()
    }

    pub(super) async fn apply(&self, mut req: Request<Body>, next: Next<'_>) -> Response<Body> {
        if self.params.is_empty() {
            return next.run(req).await;
        }
        let query = self.merged_query(req.uri().query().unwrap_or_default());
        let path = req.uri().path().to_string();
        if let Err(e) = replace_target(&mut req, &path, Some(&query)) {
            tracing::warn!(error = %e, "Could not apply request params");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Invalid request params").into_response();
        }
        next.run(req).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{config::models::FilterSpec, core::chain::tests_support::run_filters};

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn forwarded_uri(filter: FilterSpec, uri: &str) -> String {
        let (response, endpoint) = run_filters(vec![filter], get(uri)).await;
        assert_eq!(response.status(), StatusCode::OK);
        endpoint.seen().unwrap().uri
    }

    #[tokio::test]
    async fn test_rewrite_path_with_capture_groups() {
        let filter = FilterSpec::new("RewritePath")
            .with_setting("from", "^/api/v1/(.*)$")
            .with_setting("to", "/internal/$1");
        assert_eq!(forwarded_uri(filter, "/api/v1/users?id=2").await, "/internal/users?id=2");
    }

    #[tokio::test]
    async fn test_invalid_rewrite_pattern_answers_500() {
        let filter = FilterSpec::new("RewritePath")
            .with_setting("from", "(unclosed")
            .with_setting("to", "/x");
        let (response, endpoint) = run_filters(vec![filter], get("/a")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(endpoint.calls(), 0);
    }

    #[tokio::test]
    async fn test_set_path_keeps_query() {
        let filter = FilterSpec::new("SetPath").with_setting("path", "/fixed");
        assert_eq!(forwarded_uri(filter, "/anything?q=1").await, "/fixed?q=1");
    }

    #[tokio::test]
    async fn test_strip_prefix() {
        let strip = || FilterSpec::new("StripPrefix").with_setting("prefix", "/api");
        assert_eq!(forwarded_uri(strip(), "/api/users").await, "/users");
        assert_eq!(forwarded_uri(strip(), "/api").await, "/");
        assert_eq!(forwarded_uri(strip(), "/other").await, "/other");
    }

    #[tokio::test]
    async fn test_prefix_path() {
        let filter = FilterSpec::new("PrefixPath").with_setting("prefix", "/v2");
        assert_eq!(forwarded_uri(filter, "/users").await, "/v2/users");
    }

    #[tokio::test]
    async fn test_add_request_param_overwrites_and_appends() {
        let filter = FilterSpec::new("AddRequestParam")
            .with_setting("params", json!({"version": "2", "lang": "en"}));
        let uri = forwarded_uri(filter, "/search?q=rust&version=1&version=3").await;
        let pairs: Vec<(String, String)> = url::form_urlencoded::parse(
            uri.split_once('?').unwrap().1.as_bytes(),
        )
        .into_owned()
        .collect();
        assert_eq!(pairs[0], ("q".to_string(), "rust".to_string()));
        assert_eq!(pairs[1], ("version".to_string(), "2".to_string()));
        assert_eq!(pairs[2], ("lang".to_string(), "en".to_string()));
        assert_eq!(pairs.len(), 3);
    }

    #[test]
    fn test_replace_target_keeps_authority() {
        let mut req = get("http://upstream.local:8080/a?b=1");
        replace_target(&mut req, "c", None).unwrap();
        assert_eq!(req.uri().to_string(), "http://upstream.local:8080/c");
    }
}
