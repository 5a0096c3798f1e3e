//! The reverse proxy: terminal endpoint of every route's filter chain.
//!
//! The proxy picks an upstream from the route's [`LoadBalancer`] only once the chain
//! reaches it, so a request answered by a filter never consumes a probe. The outcome of
//! each forward is reported back to the balancer: a received response (any status)
//! recovers a probing upstream, a transport error or timeout counts as a failure.
use std::{net::SocketAddr, time::Duration};

use async_trait::async_trait;
use axum::{body::Body, response::IntoResponse};
use hyper::{
    HeaderMap, Request, Response, StatusCode,
    header::{self, HeaderName, HeaderValue},
};
use tracing::Instrument;

use crate::{
    core::{
        chain::{Endpoint, FilterChain, RequestContext},
        load_balancer::LoadBalancer,
        upstream::UpstreamUrl,
    },
    ports::http_client::{HttpClient, HttpClientError},
};

/// Set on every request the gateway forwards and every response it writes.
pub static X_ZENTRO_PROXY: HeaderName = HeaderName::from_static("x-zentro-proxy");
/// `host[:port]` of the upstream that produced a response.
pub static X_ZENTRO_UPSTREAM: HeaderName = HeaderName::from_static("x-zentro-upstream");
static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

static HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Remove hop-by-hop headers, including any listed in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in listed.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, client: Option<SocketAddr>) {
    let Some(client) = client else {
        return;
    };
    let ip = client.ip().to_string();
    let value = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(existing) if !existing.is_empty() => format!("{existing}, {ip}"),
        _ => ip,
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR.clone(), value);
    }
}

fn bad_gateway(message: &'static str) -> Response<Body> {
    (StatusCode::BAD_GATEWAY, message).into_response()
}

/// Forwards one route's requests to the upstreams of its balancer.
pub struct ReverseProxy<'a> {
    balancer: &'a LoadBalancer,
    chain: &'a FilterChain,
    client: &'a dyn HttpClient,
    timeout: Duration,
}

impl<'a> ReverseProxy<'a> {
    pub fn new(
        balancer: &'a LoadBalancer,
        chain: &'a FilterChain,
        client: &'a dyn HttpClient,
        timeout: Duration,
    ) -> Self {
        Self {
            balancer,
            chain,
            client,
            timeout,
        }
    }

    async fn send(&self, req: Request<Body>) -> Result<Response<Body>, HttpClientError> {
        match tokio::time::timeout(self.timeout, self.client.send_request(req)).await {
            Ok(result) => result,
            Err(_) => Err(HttpClientError::Timeout(self.timeout.as_secs())),
        }
    }
}

#[async_trait]
impl Endpoint for ReverseProxy<'_> {
    async fn call(&self, req: Request<Body>, ctx: &RequestContext) -> Response<Body> {
        let Some(target) = self.balancer.next() else {
            tracing::warn!(route = %ctx.route_id, "Route has no upstreams");
            return bad_gateway("bad upstream");
        };

        let upstream = match UpstreamUrl::new(target) {
            Ok(upstream) => upstream,
            Err(e) => {
                tracing::warn!(route = %ctx.route_id, error = %e, "Unusable upstream URL");
                return bad_gateway("bad upstream");
            }
        };

        let (mut parts, body) = req.into_parts();
        parts.uri = match upstream.join(parts.uri.path(), parts.uri.query()) {
            Ok(uri) => uri,
            Err(e) => {
                tracing::warn!(route = %ctx.route_id, error = %e, "Could not build upstream URI");
                return bad_gateway("bad upstream");
            }
        };
        strip_hop_by_hop(&mut parts.headers);
        append_forwarded_for(&mut parts.headers, ctx.client_addr);
        parts
            .headers
            .insert(X_ZENTRO_PROXY.clone(), HeaderValue::from_static("true"));

        let request_headers = self
            .chain
            .has_response_hooks()
            .then(|| parts.headers.clone());

        let span = tracing::info_span!(
            "upstream_request",
            upstream = %upstream.authority(),
            route = %ctx.route_id,
            status = tracing::field::Empty,
        );
        let result = self
            .send(Request::from_parts(parts, body))
            .instrument(span.clone())
            .await;

        let mut response = match result {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(parent: &span, error = %e, "Upstream request failed");
                self.balancer.failure(target);
                return bad_gateway("Bad gateway");
            }
        };

        self.balancer.recovered(target);
        span.record("status", response.status().as_u16());

        strip_hop_by_hop(response.headers_mut());
        if let Ok(value) = HeaderValue::from_str(upstream.authority()) {
            response.headers_mut().insert(X_ZENTRO_UPSTREAM.clone(), value);
        }

        match request_headers {
            Some(headers) => match self.chain.apply_response_hooks(response, &headers).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(parent: &span, error = %e, "Response filter failed");
                    bad_gateway("Bad gateway")
                }
            },
            None => response,
        }
    }
}
