use std::time::Duration;

use axum::{body::Body, response::IntoResponse};
use hyper::{Request, Response, StatusCode};

use super::SettingsReader;
use crate::core::{chain::Next, rate_limiter::FixedWindowLimiter};

const DEFAULT_MAX_REQUESTS: u64 = 100;
const DEFAULT_WINDOW_SECS: u64 = 10;

/// Per-client fixed window limit. Counters belong to this filter instance and start
/// fresh whenever the route set is reloaded.
#[derive(Debug)]
pub struct RateLimitFilter {
    limiter: FixedWindowLimiter,
}

impl RateLimitFilter {
    pub(super) fn from_settings(reader: &mut SettingsReader<'_>) -> Self {
        let max_requests = reader.u64_or("max_requests", DEFAULT_MAX_REQUESTS);
        let mut per_seconds = reader.u64_any_or(&["per_seconds", "per_second"], DEFAULT_WINDOW_SECS);
        if per_seconds == 0 {
            reader.warn("per_seconds", format!("must be positive; using {DEFAULT_WINDOW_SECS}"));
            per_seconds = DEFAULT_WINDOW_SECS;
        }
        Self {
            limiter: FixedWindowLimiter::new(max_requests, Duration::from_secs(per_seconds)),
        }
    }

    pub fn limiter(&self) -> &FixedWindowLimiter {
        &self.limiter
    }

    pub(super) async fn apply(&self, req: Request<Body>, next: Next<'_>) -> Response<Body> {
        let client = next.context().client_key();
        if !self.limiter.check(&client).await {
            tracing::debug!(client = %client, route = %next.context().route_id, "Rate limit exceeded");
            return (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded").into_response();
        }
        next.run(req).await
    }
}
