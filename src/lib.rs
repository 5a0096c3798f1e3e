//! Zentro - an HTTP API gateway with declarative routes.
//!
//! Every inbound request is matched against an ordered route catalog. The first matching
//! route runs its filter chain (header and path rewriting, auth, rate limiting, CORS, body
//! rewriting, ...) around a reverse proxy that forwards to one of the route's upstreams,
//! chosen by a passive, health-aware round-robin balancer. Outcomes are recorded in an
//! in-memory metrics sink.
//!
//! # Features
//! - First-match routing on path prefix, methods, host, headers and query parameters
//! - Per-route filter chains built from untyped JSON settings into typed filters
//! - Round-robin load balancing with failure counting, cooldown and single-probe recovery
//! - Per-client fixed-window rate limiting as a route filter
//! - Hot reload: a new configuration is validated, built and swapped in atomically
//! - Structured logging via `tracing` and graceful shutdown on SIGINT/SIGTERM
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use zentro::{GatewayHandler, HttpClientAdapter, MetricsSink, SnapshotHolder};
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let cfg = zentro::config::loader::load_config("config/routes.json").await?;
//! let snapshots = Arc::new(SnapshotHolder::from_config(&cfg));
//! let handler = Arc::new(GatewayHandler::new(
//!     snapshots,
//!     Arc::new(HttpClientAdapter::new()?),
//!     Arc::new(MetricsSink::new()),
//! ));
//! let app = zentro::adapters::router(handler);
//! # let _ = app;
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters** (implementations) while keeping
//! routing, filtering and balancing inside `core`.
//!
//! # Error Handling
//! Module-level failures are `thiserror` enums; application plumbing returns
//! `eyre::Result<T>` with `WrapErr` context.
//!
//! # Concurrency & Data Structures
//! The active configuration is an immutable snapshot behind `arc_swap::ArcSwap`. Keyed
//! rate-limit counters live in an `scc::HashMap`.
pub mod config;
pub mod metrics;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

// Re-export the specific types needed by the binary crate
pub use crate::{
    adapters::{FileConfigProvider, GatewayHandler, HttpClientAdapter, HttpConfigProvider},
    core::{GatewaySnapshot, SnapshotHolder},
    metrics::MetricsSink,
    ports::{config_provider::ConfigProvider, http_client::HttpClient},
    utils::GracefulShutdown,
};
