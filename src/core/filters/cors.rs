use axum::body::Body;
use hyper::{
    HeaderMap, Method, Request, Response, StatusCode,
    header::{
        ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS,
        ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE,
        ACCESS_CONTROL_REQUEST_HEADERS, ACCESS_CONTROL_REQUEST_METHOD, HeaderValue, ORIGIN, VARY,
    },
};

use super::SettingsReader;
use crate::core::chain::Next;

const VARY_VALUES: [&str; 3] = [
    "Origin",
    "Access-Control-Request-Method",
    "Access-Control-Request-Headers",
];

/// Answers CORS preflights and stamps allowed origins on upstream responses.
#[derive(Debug)]
pub struct CorsFilter {
    allow_origins: Vec<String>,
    allow_methods: Vec<String>,
    allow_headers: Vec<String>,
    allow_credentials: bool,
    max_age: u64,
}

impl CorsFilter {
    pub(super) fn from_settings(reader: &mut SettingsReader<'_>) -> Self {
        Self {
            allow_origins: reader.string_list("allow_origins"),
            allow_methods: reader.string_list("allow_methods"),
            allow_headers: reader.string_list("allow_headers"),
            allow_credentials: reader.bool_or("allow_credentials", false),
            max_age: reader.u64_or("max_age", 0),
        }
    }

    /// `*` allows any non-empty origin; otherwise the origin must be listed exactly.
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        !origin.is_empty()
            && self
                .allow_origins
                .iter()
                .any(|allowed| allowed == "*" || allowed == origin)
    }

    fn allowed_origin(&self, request_headers: &HeaderMap) -> Option<HeaderValue> {
        let origin = request_headers.get(ORIGIN)?;
        self.is_origin_allowed(origin.to_str().ok()?)
            .then(|| origin.clone())
    }

    fn preflight(&self, request_headers: &HeaderMap) -> Response<Body> {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        let headers = response.headers_mut();

        if let Some(origin) = self.allowed_origin(request_headers) {
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        }
        insert_list_or_echo(
            headers,
            ACCESS_CONTROL_ALLOW_METHODS,
            &self.allow_methods,
            request_headers.get(ACCESS_CONTROL_REQUEST_METHOD),
        );
        insert_list_or_echo(
            headers,
            ACCESS_CONTROL_ALLOW_HEADERS,
            &self.allow_headers,
            request_headers.get(ACCESS_CONTROL_REQUEST_HEADERS),
        );
        if self.allow_credentials {
            headers.insert(ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
        }
        if self.max_age > 0 {
            headers.insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from(self.max_age));
        }
        response
    }

    pub(super) async fn apply(&self, req: Request<Body>, next: Next<'_>) -> Response<Body> {
        let mut response = if req.method() == Method::OPTIONS {
            tracing::debug!(route = %next.context().route_id, "Answering CORS preflight");
            self.preflight(req.headers())
        } else {
            next.run(req).await
        };
        for value in VARY_VALUES {
            response
                .headers_mut()
                .append(VARY, HeaderValue::from_static(value));
        }
        response
    }

    pub(super) fn apply_response(
        &self,
        mut response: Response<Body>,
        request_headers: &HeaderMap,
    ) -> Response<Body> {
        if let Some(origin) = self.allowed_origin(request_headers) {
            response.headers_mut().insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        }
        if self.allow_credentials {
            response
                .headers_mut()
                .insert(ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
        }
        response
    }
}

fn insert_list_or_echo(
    headers: &mut HeaderMap,
    name: hyper::header::HeaderName,
    configured: &[String],
    requested: Option<&HeaderValue>,
) {
    let value = if configured.is_empty() {
        requested.cloned()
    } else {
        HeaderValue::from_str(&configured.join(",")).ok()
    };
    if let Some(value) = value {
        headers.insert(name, value);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{config::models::FilterSpec, core::chain::tests_support::run_filters};

    fn cors(origins: serde_json::Value) -> FilterSpec {
        FilterSpec::new("CorsWebFilter")
            .with_setting("allow_origins", origins)
            .with_setting("allow_methods", json!(["GET", "POST"]))
            .with_setting("allow_credentials", true)
            .with_setting("max_age", 600)
    }

    fn preflight(origin: &str) -> Request<Body> {
        Request::builder()
            .method(Method::OPTIONS)
            .uri("/api")
            .header(ORIGIN, origin)
            .header(ACCESS_CONTROL_REQUEST_HEADERS, "X-Custom")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_preflight_for_allowed_origin() {
        let (response, endpoint) =
            run_filters(vec![cors(json!(["https://app.example"]))], preflight("https://app.example"))
                .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(endpoint.calls(), 0);
        let headers = response.headers();
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_ORIGIN], "https://app.example");
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_METHODS], "GET,POST");
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_HEADERS], "X-Custom");
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
        assert_eq!(headers[ACCESS_CONTROL_MAX_AGE], "600");
        assert_eq!(headers.get_all(VARY).iter().count(), 3);
    }

    #[tokio::test]
    async fn test_preflight_for_denied_origin_omits_allow_origin() {
        let (response, _) =
            run_filters(vec![cors(json!(["https://app.example"]))], preflight("https://evil.example"))
                .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }

    #[tokio::test]
    async fn test_simple_requests_pass_through_with_vary() {
        let req = Request::builder()
            .uri("/api")
            .header(ORIGIN, "https://any.example")
            .body(Body::empty())
            .unwrap();
        let (response, endpoint) = run_filters(vec![cors(json!(["*"]))], req).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(endpoint.calls(), 1);
        assert_eq!(response.headers().get_all(VARY).iter().count(), 3);
    }

    #[test]
    fn test_wildcard_and_empty_origin() {
        let spec = cors(json!(["*"]));
        let mut reader = SettingsReader::new(&spec);
        let filter = CorsFilter::from_settings(&mut reader);
        assert!(filter.is_origin_allowed("https://x.example"));
        assert!(!filter.is_origin_allowed(""));
    }

    #[test]
    fn test_response_hook_stamps_origin() {
        let spec = cors(json!(["https://app.example"]));
        let mut reader = SettingsReader::new(&spec);
        let filter = CorsFilter::from_settings(&mut reader);

        let mut request_headers = HeaderMap::new();
        request_headers.insert(ORIGIN, HeaderValue::from_static("https://app.example"));
        let response = filter.apply_response(Response::new(Body::empty()), &request_headers);
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "https://app.example");
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");

        let response = filter.apply_response(Response::new(Body::empty()), &HeaderMap::new());
        assert!(response.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }
}
