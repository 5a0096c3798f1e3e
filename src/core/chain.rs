//! Executable filter chains.
//!
//! A route's filters run in declaration order around a terminal [`Endpoint`] (normally
//! the reverse proxy). Each filter receives the request together with a [`Next`]
//! continuation; it may rewrite the request and call `next.run(req)`, post-process the
//! response it gets back, or answer on its own without calling `next` at all.
use std::net::SocketAddr;

use async_trait::async_trait;
use axum::body::Body;
use futures_util::future::BoxFuture;
use hyper::{HeaderMap, Request, Response};

use crate::{
    config::models::{FilterSpec, RouteConfig},
    core::filters::{Filter, FilterError},
};

/// Per-request data shared by every filter of the chain.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub client_addr: Option<SocketAddr>,
    pub route_id: String,
}

impl RequestContext {
    pub fn new(client_addr: Option<SocketAddr>, route_id: impl Into<String>) -> Self {
        Self {
            client_addr,
            route_id: route_id.into(),
        }
    }

    /// Key identifying the client for per-client accounting.
    pub fn client_key(&self) -> String {
        self.client_addr
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Terminal handler invoked once every filter has called `next`.
#[async_trait]
pub trait Endpoint: Send + Sync {
    async fn call(&self, req: Request<Body>, ctx: &RequestContext) -> Response<Body>;
}

/// The remainder of a chain, as seen from inside a filter.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    filters: &'a [Filter],
    endpoint: &'a dyn Endpoint,
    ctx: &'a RequestContext,
}

impl<'a> Next<'a> {
    pub fn new(filters: &'a [Filter], endpoint: &'a dyn Endpoint, ctx: &'a RequestContext) -> Self {
        Self {
            filters,
            endpoint,
            ctx,
        }
    }

    pub fn context(&self) -> &'a RequestContext {
        self.ctx
    }

    /// Run the next filter, or the endpoint when no filters remain.
    pub fn run(self, req: Request<Body>) -> BoxFuture<'a, Response<Body>> {
        match self.filters.split_first() {
            Some((filter, rest)) => filter.apply(
                req,
                Next {
                    filters: rest,
                    ..self
                },
            ),
            None => self.endpoint.call(req, self.ctx),
        }
    }
}

/// The ordered, typed filters of one route.
#[derive(Debug, Default)]
pub struct FilterChain {
    filters: Vec<Filter>,
}

impl FilterChain {
    /// Build the chain for `route`. A route with auth enabled gets an `Auth` filter in
    /// front of its declared filters.
    pub fn build(route: &RouteConfig) -> Self {
        let mut specs = Vec::with_capacity(route.filters.len() + 1);
        if route.auth.enabled {
            specs.push(
                FilterSpec::new("Auth")
                    .with_setting("type", route.auth.auth_type.as_str())
                    .with_setting("header", route.auth.header.as_str()),
            );
        }
        specs.extend(route.filters.iter().cloned());

        let filters = specs
            .iter()
            .map(|spec| {
                let (filter, warnings) = Filter::from_spec(spec);
                for warning in warnings {
                    tracing::warn!(route = %route.id, "{warning}");
                }
                filter
            })
            .collect();

        Self { filters }
    }

    pub fn from_filters(filters: Vec<Filter>) -> Self {
        Self { filters }
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn has_response_hooks(&self) -> bool {
        self.filters.iter().any(Filter::is_response_filter)
    }

    /// Run the request through every filter and finally `endpoint`.
    pub async fn execute(
        &self,
        req: Request<Body>,
        endpoint: &dyn Endpoint,
        ctx: &RequestContext,
    ) -> Response<Body> {
        Next::new(&self.filters, endpoint, ctx).run(req).await
    }

    /// Apply the response hooks, in declaration order, to an upstream response.
    pub async fn apply_response_hooks(
        &self,
        mut response: Response<Body>,
        request_headers: &HeaderMap,
    ) -> Result<Response<Body>, FilterError> {
        for filter in self.filters.iter().filter(|f| f.is_response_filter()) {
            response = filter.apply_response(response, request_headers).await?;
        }
        Ok(response)
    }
}
