//! The executable form of a configuration, swapped atomically on reload.
//!
//! A [`GatewaySnapshot`] is built once per loaded configuration: every route gets its own
//! [`LoadBalancer`] and [`FilterChain`], so balancer health and rate-limit counters live
//! exactly as long as the route set they belong to. Requests take an `Arc` to the current
//! snapshot and keep using it even if a reload swaps in a new one mid-flight.
use std::{sync::Arc, time::Duration};

use arc_swap::ArcSwap;
use hyper::Request;

use crate::{
    config::models::{GatewayConfig, GlobalSettings, RouteConfig},
    core::{chain::FilterChain, load_balancer::LoadBalancer, matcher},
};

/// A route with its runtime state.
#[derive(Debug)]
pub struct Route {
    pub config: RouteConfig,
    pub balancer: LoadBalancer,
    pub chain: FilterChain,
}

impl Route {
    pub fn build(config: RouteConfig, defaults: &GatewayConfig) -> Self {
        let health = config
            .health
            .unwrap_or(defaults.config.health)
            .with_defaults();
        let balancer = LoadBalancer::new(config.upstreams.iter().cloned(), health);
        let chain = FilterChain::build(&config);
        Self {
            config,
            balancer,
            chain,
        }
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }
}

/// Immutable, fully built view of one configuration.
#[derive(Debug)]
pub struct GatewaySnapshot {
    routes: Vec<Route>,
    settings: GlobalSettings,
    upstream_timeout: Duration,
}

impl GatewaySnapshot {
    pub fn from_config(config: &GatewayConfig) -> Self {
        let routes = config
            .routes
            .iter()
            .cloned()
            .map(|route| Route::build(route, config))
            .collect::<Vec<_>>();

        tracing::info!(
            routes = routes.len(),
            enabled = routes.iter().filter(|r| r.config.is_enabled()).count(),
            "Built gateway snapshot"
        );

        Self {
            routes,
            settings: config.settings.clone(),
            upstream_timeout: Duration::from_secs(config.config.upstream_timeout_secs),
        }
    }

    /// First route whose predicates all hold for `req`.
    pub fn find_route<B>(&self, req: &Request<B>) -> Option<&Route> {
        matcher::find_route(self.routes.iter().map(|r| &r.config), req).map(|i| &self.routes[i])
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn settings(&self) -> &GlobalSettings {
        &self.settings
    }

    pub fn upstream_timeout(&self) -> Duration {
        self.upstream_timeout
    }
}

/// Single-writer, many-reader holder of the current snapshot.
#[derive(Debug)]
pub struct SnapshotHolder {
    current: ArcSwap<GatewaySnapshot>,
}

impl SnapshotHolder {
    pub fn new(snapshot: GatewaySnapshot) -> Self {
        Self {
            current: ArcSwap::from_pointee(snapshot),
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(GatewaySnapshot::from_config(config))
    }

    /// The snapshot to use for one request.
    pub fn load(&self) -> Arc<GatewaySnapshot> {
        self.current.load_full()
    }

    /// Replace the snapshot wholesale.
    pub fn store(&self, snapshot: GatewaySnapshot) {
        self.current.store(Arc::new(snapshot));
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;

    use super::*;
    use crate::config::models::{HealthConfig, RouteConfig};

    fn config() -> GatewayConfig {
        GatewayConfig {
            routes: vec![
                RouteConfig::new("users", "/users")
                    .with_id("users-1")
                    .with_upstreams(["http://10.0.0.1:80"]),
                RouteConfig::new("all", "/")
                    .with_id("all-1")
                    .with_upstreams(["http://10.0.0.2:80"])
                    .with_health(HealthConfig {
                        cooldown: 60,
                        failures: 0,
                    }),
            ],
            ..GatewayConfig::default()
        }
    }

    fn get(path: &str) -> Request<Body> {
        Request::builder().uri(path).body(Body::empty()).unwrap()
    }

    #[test]
    fn test_find_route_uses_catalog_order() {
        let snapshot = GatewaySnapshot::from_config(&config());
        assert_eq!(snapshot.find_route(&get("/users/7")).unwrap().id(), "users-1");
        assert_eq!(snapshot.find_route(&get("/orders")).unwrap().id(), "all-1");
    }

    #[tokio::test]
    async fn test_reload_replaces_route_state() {
        let holder = SnapshotHolder::from_config(&config());
        let before = holder.load();
        let route = before.find_route(&get("/users")).unwrap();
        route.balancer.failure("http://10.0.0.1:80");

        holder.store(GatewaySnapshot::from_config(&config()));
        let after = holder.load();
        let fresh = after.find_route(&get("/users")).unwrap();

        assert!(!Arc::ptr_eq(&before, &after));
        assert_ne!(
            route.balancer.state("http://10.0.0.1:80"),
            fresh.balancer.state("http://10.0.0.1:80")
        );
    }
}
