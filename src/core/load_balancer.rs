//! Health-aware round-robin load balancing.
//!
//! Every route owns one [`LoadBalancer`]. Selection walks the targets round-robin from a
//! shared atomic cursor and skips upstreams that recent proxy failures marked unhealthy.
//! Outcomes reported by the proxy ([`LoadBalancer::failure`], [`LoadBalancer::recovered`])
//! drive each upstream through a small state machine:
//!
//! ```text
//!   Healthy --(fail_count >= threshold)--> Unhealthy
//!   Unhealthy --(cooldown elapsed, selected)--> Probing   (exactly one trial request)
//!   Probing --(failure)--> Unhealthy (fresh timestamp)
//!   Probing --(response received)--> Healthy
//! ```
//!
//! When no upstream is selectable the first target is returned anyway; the gateway prefers
//! trying a possibly-dead upstream over refusing the request outright.
use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;

use crate::config::models::HealthConfig;

/// Load balancing strategies understood by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    #[default]
    RoundRobin,
}

/// Health of a single upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamState {
    Healthy { fail_count: u32 },
    Unhealthy { since: Instant },
    /// A single trial request is in flight.
    Probing { started: Instant },
}

impl UpstreamState {
    fn healthy() -> Self {
        UpstreamState::Healthy { fail_count: 0 }
    }
}

/// Read-only view of an upstream's state for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpstreamStatus {
    pub target: String,
    pub state: &'static str,
    pub fail_count: u32,
}

#[derive(Debug)]
struct Target {
    url: String,
    state: Mutex<UpstreamState>,
}

/// Round-robin balancer with passive health tracking.
#[derive(Debug)]
pub struct LoadBalancer {
    targets: Vec<Target>,
    strategy: Strategy,
    cursor: AtomicUsize,
    cooldown: Duration,
    failure_threshold: u32,
}

impl LoadBalancer {
    /// Create a balancer with every target healthy.
    pub fn new<I, S>(targets: I, health: HealthConfig) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let health = health.with_defaults();
        Self {
            targets: targets
                .into_iter()
                .map(|url| Target {
                    url: url.into(),
                    state: Mutex::new(UpstreamState::healthy()),
                })
                .collect(),
            strategy: Strategy::RoundRobin,
            cursor: AtomicUsize::new(0),
            cooldown: Duration::from_secs(health.cooldown),
            failure_threshold: health.failures,
        }
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Select the next upstream to try, or `None` when the route has no upstreams.
    pub fn next(&self) -> Option<&str> {
        let n = self.targets.len();
        if n == 0 {
            return None;
        }

        let now = Instant::now();
        for _ in 0..n {
            let index = self.cursor.fetch_add(1, Ordering::SeqCst) % n;
            let candidate = &self.targets[index];
            if Self::try_acquire(&candidate.state, now, self.cooldown) {
                return Some(candidate.url.as_str());
            }
        }

        tracing::warn!(
            upstream = %self.targets[0].url,
            "No healthy upstream available, falling back to the first target"
        );
        Some(self.targets[0].url.as_str())
    }

    /// Decide under the upstream's lock whether it may serve this request. Granting a
    /// probe and checking health happen in one step, so at most one caller wins a probe.
    fn try_acquire(state: &Mutex<UpstreamState>, now: Instant, cooldown: Duration) -> bool {
        let mut state = state.lock();
        match *state {
            UpstreamState::Healthy { .. } => true,
            UpstreamState::Unhealthy { since } if now.duration_since(since) >= cooldown => {
                *state = UpstreamState::Probing { started: now };
                true
            }
            // A probe that never reported back (client gone) is abandoned after a cooldown.
            UpstreamState::Probing { started } if now.duration_since(started) >= cooldown => {
                *state = UpstreamState::Probing { started: now };
                true
            }
            _ => false,
        }
    }

    /// Move an unhealthy upstream whose cooldown has elapsed into probing.
    /// Returns true when this call granted the probe.
    pub fn try_recover(&self, target: &str) -> bool {
        let Some(t) = self.find(target) else {
            return false;
        };
        let mut state = t.state.lock();
        match *state {
            UpstreamState::Unhealthy { since } if since.elapsed() >= self.cooldown => {
                *state = UpstreamState::Probing {
                    started: Instant::now(),
                };
                true
            }
            _ => false,
        }
    }

    /// Record a transport failure against `target`.
    pub fn failure(&self, target: &str) {
        let Some(t) = self.find(target) else {
            return;
        };
        let mut state = t.state.lock();
        match *state {
            UpstreamState::Probing { .. } => {
                tracing::warn!(upstream = %t.url, "Probe request failed, upstream stays unhealthy");
                *state = UpstreamState::Unhealthy {
                    since: Instant::now(),
                };
            }
            UpstreamState::Healthy { fail_count } => {
                let fail_count = fail_count.saturating_add(1);
                if fail_count >= self.failure_threshold {
                    tracing::warn!(
                        upstream = %t.url,
                        fail_count,
                        "Upstream marked unhealthy"
                    );
                    *state = UpstreamState::Unhealthy {
                        since: Instant::now(),
                    };
                } else {
                    *state = UpstreamState::Healthy { fail_count };
                }
            }
            UpstreamState::Unhealthy { .. } => {}
        }
    }

    /// Record that `target` produced a response. Only a probing upstream changes state.
    pub fn recovered(&self, target: &str) {
        let Some(t) = self.find(target) else {
            return;
        };
        let mut state = t.state.lock();
        if let UpstreamState::Probing { .. } = *state {
            tracing::info!(upstream = %t.url, "Upstream recovered");
            *state = UpstreamState::healthy();
        }
    }

    pub fn state(&self, target: &str) -> Option<UpstreamState> {
        self.find(target).map(|t| *t.state.lock())
    }

    /// Snapshot of every upstream's state, in target order.
    pub fn status(&self) -> Vec<UpstreamStatus> {
        self.targets
            .iter()
            .map(|t| {
                let (state, fail_count) = match *t.state.lock() {
                    UpstreamState::Healthy { fail_count } => ("healthy", fail_count),
                    UpstreamState::Unhealthy { .. } => ("unhealthy", 0),
                    UpstreamState::Probing { .. } => ("probing", 0),
                };
                UpstreamStatus {
                    target: t.url.clone(),
                    state,
                    fail_count,
                }
            })
            .collect()
    }

    pub fn healthy_count(&self) -> usize {
        self.targets
            .iter()
            .filter(|t| matches!(*t.state.lock(), UpstreamState::Healthy { .. }))
            .count()
    }

    fn find(&self, target: &str) -> Option<&Target> {
        self.targets.iter().find(|t| t.url == target)
    }
}
