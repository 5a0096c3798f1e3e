pub mod chain;
pub mod filters;
pub mod load_balancer;
pub mod matcher;
pub mod proxy;
pub mod rate_limiter;
pub mod snapshot;
pub mod upstream;

pub use chain::{Endpoint, FilterChain, RequestContext};
pub use load_balancer::{LoadBalancer, UpstreamState};
pub use proxy::ReverseProxy;
pub use snapshot::{GatewaySnapshot, Route, SnapshotHolder};
