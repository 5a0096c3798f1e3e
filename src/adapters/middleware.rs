//! Axum middleware wrapped around the gateway's catch-all route.
//!
//! Both layers are stateless: one tags every exchange with a request id, the other logs
//! the start and end of each request with its latency.
use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use tokio::time::Instant;

pub static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Log start/end of a request including latency.
pub async fn request_timing_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();
    let version = req.version();

    tracing::debug!("Incoming {} {} {:?}", method, uri, version);

    let response = next.run(req).await;

    tracing::info!(
        "Completed {} {} {:?} - {} in {:?}",
        method,
        uri,
        version,
        response.status(),
        start.elapsed()
    );

    response
}

/// Keep the caller's `X-Request-ID`, or assign a fresh UUID, and echo it on the response.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let request_id = match req.headers().get(&REQUEST_ID_HEADER) {
        Some(value) if !value.is_empty() => value.clone(),
        _ => {
            let generated = HeaderValue::from_str(&uuid::Uuid::new_v4().to_string());
            match generated {
                Ok(value) => {
                    req.headers_mut()
                        .insert(REQUEST_ID_HEADER.clone(), value.clone());
                    value
                }
                Err(_) => return next.run(req).await,
            }
        }
    };

    let mut response = next.run(req).await;
    response
        .headers_mut()
        .insert(REQUEST_ID_HEADER.clone(), request_id);
    response
}

#[cfg(test)]
mod tests {
    use axum::{Router, body::Body, http::StatusCode, middleware, routing::get};
    use tower::ServiceExt; // for oneshot

    use super::*;

    fn echo_request_id_app() -> Router {
        Router::new()
            .route(
                "/",
                get(|req: Request| async move {
                    let seen = req
                        .headers()
                        .get(&REQUEST_ID_HEADER)
                        .map(|v| v.to_str().unwrap_or_default().to_string())
                        .unwrap_or_default();
                    (StatusCode::OK, seen)
                }),
            )
            .layer(middleware::from_fn(request_id_middleware))
    }

    #[tokio::test]
    async fn test_request_id_generated_when_missing() {
        let response = echo_request_id_app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let request_id = response
            .headers()
            .get(&REQUEST_ID_HEADER)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(uuid::Uuid::parse_str(&request_id).is_ok());

        // The handler saw the same id the client gets back
        let body = http_body_util::BodyExt::collect(response.into_body())
            .await
            .unwrap()
            .to_bytes();
        assert_eq!(body, request_id.as_bytes());
    }

    #[tokio::test]
    async fn test_request_id_kept_from_caller() {
        let response = echo_request_id_app()
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("x-request-id", "abc-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers().get(&REQUEST_ID_HEADER).unwrap(), "abc-123");
    }

    #[tokio::test]
    async fn test_timing_middleware_passes_response_through() {
        let app = Router::new()
            .route("/", get(|| async { StatusCode::ACCEPTED }))
            .layer(middleware::from_fn(request_timing_middleware));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }
}
