use axum::{body::Body, response::IntoResponse};
use hyper::{
    Request, Response, StatusCode,
    header::{self, HeaderName},
};

use super::SettingsReader;
use crate::core::chain::Next;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    Bearer,
    Basic,
    ApiKey,
    /// Any other configured type; every request is rejected.
    Unsupported,
}

impl AuthScheme {
    /// Exact, case-sensitive match.
    fn parse(value: &str) -> Self {
        match value {
            "bearer" => AuthScheme::Bearer,
            "basic" => AuthScheme::Basic,
            "api-key" => AuthScheme::ApiKey,
            _ => AuthScheme::Unsupported,
        }
    }
}

/// Presence check on a credential header. Tokens are not verified here.
#[derive(Debug)]
pub struct AuthFilter {
    scheme: AuthScheme,
    header: HeaderName,
}

impl AuthFilter {
    pub(super) fn from_settings(reader: &mut SettingsReader<'_>) -> Self {
        let raw_scheme = reader.string_or("type", "bearer");
        let scheme = AuthScheme::parse(&raw_scheme);
        if scheme == AuthScheme::Unsupported {
            reader.warn("type", format!("unsupported auth type '{raw_scheme}'; all requests will be rejected"));
        }

        let raw_header = reader.string_or("header", "");
        let header = if raw_header.is_empty() {
            header::AUTHORIZATION
        } else {
            match HeaderName::from_bytes(raw_header.as_bytes()) {
                Ok(name) => name,
                Err(_) => {
                    reader.warn("header", format!("invalid header name '{raw_header}'; using Authorization"));
                    header::AUTHORIZATION
                }
            }
        };

        Self { scheme, header }
    }

    pub fn scheme(&self) -> AuthScheme {
        self.scheme
    }

    fn authorized(&self, req: &Request<Body>) -> bool {
        let Some(value) = req
            .headers()
            .get(&self.header)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
        else {
            return false;
        };

        match self.scheme {
            AuthScheme::Bearer => value.starts_with("Bearer"),
            AuthScheme::Basic | AuthScheme::ApiKey => true,
            AuthScheme::Unsupported => false,
        }
    }

    pub(super) async fn apply(&self, req: Request<Body>, next: Next<'_>) -> Response<Body> {
        if !self.authorized(&req) {
            tracing::debug!(route = %next.context().route_id, header = %self.header, "Authentication failed");
            return (StatusCode::UNAUTHORIZED, "Unauthorized: Failed").into_response();
        }
        next.run(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::models::FilterSpec, core::chain::tests_support::run_filters};

    fn auth(auth_type: &str, header: &str) -> FilterSpec {
        FilterSpec::new("Auth")
            .with_setting("type", auth_type)
            .with_setting("header", header)
    }

    fn request(header: Option<(&str, &str)>) -> Request<Body> {
        let mut builder = Request::builder().uri("/secure");
        if let Some((name, value)) = header {
            builder = builder.header(name, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_bearer_requires_prefix() {
        let (response, _) = run_filters(vec![auth("bearer", "")], request(None)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let (response, _) =
            run_filters(vec![auth("bearer", "")], request(Some(("Authorization", "abc")))).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let (response, endpoint) = run_filters(
            vec![auth("bearer", "")],
            request(Some(("Authorization", "Bearer abc"))),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(endpoint.calls(), 1);

        // Only the prefix is checked, not the separator.
        let (response, _) =
            run_filters(vec![auth("bearer", "")], request(Some(("Authorization", "Bearer")))).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_basic_and_api_key_need_a_non_empty_header() {
        let (response, _) =
            run_filters(vec![auth("basic", "")], request(Some(("Authorization", "Basic eA==")))).await;
        assert_eq!(response.status(), StatusCode::OK);

        let (response, _) =
            run_filters(vec![auth("api-key", "X-Key")], request(Some(("X-Key", "")))).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let (response, _) =
            run_filters(vec![auth("api-key", "X-Key")], request(Some(("X-Key", "k1")))).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unsupported_type_rejects_everything() {
        let (response, endpoint) = run_filters(
            vec![auth("oauth", "")],
            request(Some(("Authorization", "Bearer abc"))),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(endpoint.calls(), 0);
    }

    #[tokio::test]
    async fn test_type_is_case_sensitive_and_never_empty() {
        for auth_type in ["BASIC", "Bearer", ""] {
            let (response, endpoint) = run_filters(
                vec![auth(auth_type, "")],
                request(Some(("Authorization", "Bearer abc"))),
            )
            .await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{auth_type:?}");
            assert_eq!(endpoint.calls(), 0);
        }

        let spec = auth("", "");
        let mut reader = SettingsReader::new(&spec);
        assert_eq!(AuthFilter::from_settings(&mut reader).scheme(), AuthScheme::Unsupported);
        assert_eq!(reader.finish().len(), 1);
    }

    #[test]
    fn test_missing_type_defaults_to_bearer() {
        let spec = FilterSpec::new("Auth");
        let mut reader = SettingsReader::new(&spec);
        let filter = AuthFilter::from_settings(&mut reader);
        assert_eq!(filter.scheme(), AuthScheme::Bearer);
        assert!(reader.finish().is_empty());
    }
}
