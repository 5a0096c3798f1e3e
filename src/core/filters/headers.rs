use axum::body::Body;
use hyper::{
    HeaderMap, Request, Response,
    header::{HeaderName, HeaderValue},
};

use super::SettingsReader;
use crate::core::chain::Next;

/// Which message a header filter edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderTarget {
    Request,
    Response,
}

impl HeaderTarget {
    fn read(reader: &mut SettingsReader<'_>) -> Self {
        match reader.string_or("type", "response").as_str() {
            "response" => HeaderTarget::Response,
            _ => HeaderTarget::Request,
        }
    }
}

fn parse_name(reader: &mut SettingsReader<'_>, key: &str, raw: &str) -> Option<HeaderName> {
    match HeaderName::from_bytes(raw.as_bytes()) {
        Ok(name) => Some(name),
        Err(_) => {
            reader.warn(key, format!("skipping invalid header name '{raw}'"));
            None
        }
    }
}

#[derive(Debug)]
pub struct AddHeaderFilter {
    target: HeaderTarget,
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl AddHeaderFilter {
    pub(super) fn from_settings(reader: &mut SettingsReader<'_>) -> Self {
        let target = HeaderTarget::read(reader);
        let mut headers = Vec::new();
        for (name, value) in reader.string_map("headers") {
            let Some(name) = parse_name(reader, "headers", &name) else {
                continue;
            };
            match HeaderValue::from_str(&value) {
                Ok(value) => headers.push((name, value)),
                Err(_) => reader.warn("headers", format!("skipping invalid value for '{name}'")),
            }
        }
        Self { target, headers }
    }

    fn stamp(&self, map: &mut HeaderMap) {
        for (name, value) in &self.headers {
            map.insert(name.clone(), value.clone());
        }
    }

    pub(super) async fn apply(&self, mut req: Request<Body>, next: Next<'_>) -> Response<Body> {
        match self.target {
            HeaderTarget::Request => {
                self.stamp(req.headers_mut());
                next.run(req).await
            }
            HeaderTarget::Response => {
                let mut response = next.run(req).await;
                self.stamp(response.headers_mut());
                response
            }
        }
    }
}

#[derive(Debug)]
pub struct RemoveHeaderFilter {
    target: HeaderTarget,
    names: Vec<HeaderName>,
}

impl RemoveHeaderFilter {
    pub(super) fn from_settings(reader: &mut SettingsReader<'_>) -> Self {
        let target = HeaderTarget::read(reader);
        let raw_names = reader.name_list("headers");
        let names = raw_names
            .iter()
            .filter_map(|raw| parse_name(reader, "headers", raw))
            .collect();
        Self { target, names }
    }

    fn strip(&self, map: &mut HeaderMap) {
        for name in &self.names {
            map.remove(name);
        }
    }

    pub(super) async fn apply(&self, mut req: Request<Body>, next: Next<'_>) -> Response<Body> {
        match self.target {
            HeaderTarget::Request => {
                self.strip(req.headers_mut());
                next.run(req).await
            }
            HeaderTarget::Response => {
                let mut response = next.run(req).await;
                self.strip(response.headers_mut());
                response
            }
        }
    }
}

/// Moves a request header to a new name.
#[derive(Debug)]
pub struct MapRequestHeaderFilter {
    from: Option<HeaderName>,
    to: Option<HeaderName>,
}

impl MapRequestHeaderFilter {
    pub(super) fn from_settings(reader: &mut SettingsReader<'_>) -> Self {
        let from = reader.required_string("from");
        let to = reader.required_string("to");
        let from = if from.is_empty() { None } else { parse_name(reader, "from", &from) };
        let to = if to.is_empty() { None } else { parse_name(reader, "to", &to) };
        Self { from, to }
    }

    pub(super) async fn apply(&self, mut req: Request<Body>, next: Next<'_>) -> Response<Body> {
        if let (Some(from), Some(to)) = (&self.from, &self.to) {
            let headers = req.headers_mut();
            match headers.remove(from) {
                Some(value) => {
                    headers.insert(to.clone(), value);
                }
                None => {
                    tracing::debug!(from = %from, "MapRequestHeader: source header absent, skipping");
                }
            }
        }
        next.run(req).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{config::models::FilterSpec, core::chain::tests_support::run_filters};

    fn request() -> Request<Body> {
        Request::builder()
            .uri("/")
            .header("X-Old", "v1")
            .header("X-Drop", "gone")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_add_header_defaults_to_response() {
        let (response, endpoint) = run_filters(
            vec![FilterSpec::new("AddHeader").with_setting("headers", json!({"X-Served": "z"}))],
            request(),
        )
        .await;
        assert_eq!(response.headers().get("x-served").unwrap(), "z");
        assert!(endpoint.seen().unwrap().headers.get("x-served").is_none());
    }

    #[test]
    fn test_add_header_skips_invalid_names() {
        let spec = FilterSpec::new("AddHeader")
            .with_setting("type", "request")
            .with_setting("headers", json!({"bad name": "x", "X-Good": 7}));
        let mut reader = SettingsReader::new(&spec);
        let filter = AddHeaderFilter::from_settings(&mut reader);
        assert_eq!(filter.headers.len(), 1);
        assert_eq!(filter.headers[0].1, "7");
        assert_eq!(reader.finish().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_header_on_request_with_list_or_map() {
        for headers in [json!(["X-Drop"]), json!({"X-Drop": ""})] {
            let (_, endpoint) = run_filters(
                vec![
                    FilterSpec::new("RemoveHeader")
                        .with_setting("type", "request")
                        .with_setting("headers", headers),
                ],
                request(),
            )
            .await;
            let seen = endpoint.seen().unwrap();
            assert!(seen.headers.get("x-drop").is_none());
            assert!(seen.headers.get("x-old").is_some());
        }
    }

    #[tokio::test]
    async fn test_map_request_header_moves_the_value() {
        let (_, endpoint) = run_filters(
            vec![
                FilterSpec::new("MapRequestHeader")
                    .with_setting("from", "X-Old")
                    .with_setting("to", "X-New"),
            ],
            request(),
        )
        .await;
        let seen = endpoint.seen().unwrap();
        assert_eq!(seen.headers.get("x-new").unwrap(), "v1");
        assert!(seen.headers.get("x-old").is_none());
    }

    #[tokio::test]
    async fn test_map_request_header_without_source_is_a_no_op() {
        let (_, endpoint) = run_filters(
            vec![
                FilterSpec::new("MapRequestHeader")
                    .with_setting("from", "X-Missing")
                    .with_setting("to", "X-New"),
            ],
            request(),
        )
        .await;
        assert!(endpoint.seen().unwrap().headers.get("x-new").is_none());
    }
}
