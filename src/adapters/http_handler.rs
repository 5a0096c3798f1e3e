use std::{net::SocketAddr, sync::Arc};

use axum::{
    Router,
    body::Body as AxumBody,
    extract::{ConnectInfo, Request},
    middleware,
    response::{IntoResponse, Response},
    routing::any,
};
use hyper::{StatusCode, header::HeaderValue};
use tokio::time::Instant;
use tower_http::catch_panic::CatchPanicLayer;
use tracing::Instrument;

use crate::{
    adapters::middleware::{REQUEST_ID_HEADER, request_id_middleware, request_timing_middleware},
    core::{
        chain::RequestContext,
        proxy::{ReverseProxy, X_ZENTRO_PROXY},
        snapshot::SnapshotHolder,
    },
    metrics::MetricsSink,
    ports::http_client::HttpClient,
    tracing_setup::create_request_span,
};

/// Entry point for every inbound request.
///
/// Each request reads the snapshot that is current when it arrives and keeps it until it
/// completes, so a reload never changes the route a request is already on.
pub struct GatewayHandler {
    snapshots: Arc<SnapshotHolder>,
    http_client: Arc<dyn HttpClient>,
    metrics: Arc<MetricsSink>,
}

impl GatewayHandler {
    pub fn new(
        snapshots: Arc<SnapshotHolder>,
        http_client: Arc<dyn HttpClient>,
        metrics: Arc<MetricsSink>,
    ) -> Self {
        Self {
            snapshots,
            http_client,
            metrics,
        }
    }

    pub fn metrics(&self) -> &MetricsSink {
        &self.metrics
    }

    /// Route, filter and forward one request.
    ///
    /// Only requests that matched a route are recorded in the metrics sink.
    pub async fn handle_request(
        &self,
        req: Request<AxumBody>,
        client_addr: Option<SocketAddr>,
    ) -> Response<AxumBody> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let request_id = req
            .headers()
            .get(&REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let span = create_request_span(method.as_str(), &path, &request_id);
        let start = Instant::now();

        let (mut response, matched) = self
            .dispatch(req, client_addr, &span)
            .instrument(span.clone())
            .await;

        response
            .headers_mut()
            .insert(X_ZENTRO_PROXY.clone(), HeaderValue::from_static("true"));

        let latency = start.elapsed();
        let status = response.status();
        span.record("http.status_code", status.as_u16());
        span.record("duration_ms", latency.as_millis() as u64);

        if matched {
            let client = client_addr
                .map(|addr| addr.to_string())
                .unwrap_or_default();
            self.metrics
                .record(method.as_str(), &path, status.as_u16(), latency, &client);
        }

        response
    }

    async fn dispatch(
        &self,
        req: Request<AxumBody>,
        client_addr: Option<SocketAddr>,
        span: &tracing::Span,
    ) -> (Response<AxumBody>, bool) {
        let snapshot = self.snapshots.load();

        let Some(route) = snapshot.find_route(&req) else {
            tracing::debug!("No route matched");
            return (
                (StatusCode::NOT_FOUND, "no route matched").into_response(),
                false,
            );
        };
        span.record("route", route.id());
        tracing::debug!(route = %route.id(), name = %route.config.name, "Route matched");

        let ctx = RequestContext::new(client_addr, route.id());
        let proxy = ReverseProxy::new(
            &route.balancer,
            &route.chain,
            self.http_client.as_ref(),
            snapshot.upstream_timeout(),
        );
        (route.chain.execute(req, &proxy, &ctx).await, true)
    }
}

/// Catch-all router: every method and path goes through [`GatewayHandler`].
pub fn router(handler: Arc<GatewayHandler>) -> Router {
    let route = any(move |req: Request| {
        let handler = handler.clone();
        async move {
            let client_addr = req
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| *addr);
            handler.handle_request(req, client_addr).await
        }
    });

    Router::new()
        .route("/", route.clone())
        .route("/{*path}", route)
        .layer(middleware::from_fn(request_timing_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(CatchPanicLayer::new())
}
