//! In-memory request metrics for Zentro.
//!
//! [`MetricsSink`] keeps a bounded picture of recent traffic:
//! * the last [`MAX_LOG_ENTRIES`] request records
//! * the last [`MAX_LATENCY_SAMPLES`] latencies, averaged on read
//! * total request and error counters (error means status >= 400)
//! * per-minute ([`MAX_MINUTE_POINTS`]) and per-hour ([`MAX_HOUR_POINTS`]) request counts,
//!   each point holding the requests seen since the previous point closed
//!
//! Mutation happens under one exclusive lock; [`MetricsSink::snapshot`] copies the data
//! out under a shared lock so readers never observe a half-applied record.
use std::{collections::VecDeque, time::Duration};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::time::Instant;

pub const MAX_LOG_ENTRIES: usize = 100;
pub const MAX_LATENCY_SAMPLES: usize = 1000;
pub const MAX_MINUTE_POINTS: usize = 60;
pub const MAX_HOUR_POINTS: usize = 24;

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);

/// One completed request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRecord {
    pub time: DateTime<Utc>,
    pub method: String,
    pub path: String,
    pub status_code: u16,
    pub latency_ms: f64,
    pub client_ip: String,
}

/// Requests counted during one closed interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPoint {
    pub time: DateTime<Utc>,
    pub request_count: u64,
}

/// Point-in-time copy of the sink, as served to metrics consumers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub total_requests: u64,
    pub total_errors: u64,
    pub average_latency_ms: f64,
    /// Percentage of requests with status >= 400
    pub error_rate: f64,
    pub request_log: Vec<RequestRecord>,
    pub time_series: Vec<DataPoint>,
    pub time_series_24h: Vec<DataPoint>,
}

/// Fixed-interval roll-up of the total request counter.
#[derive(Debug)]
struct Series {
    interval: Duration,
    cap: usize,
    last_close: Instant,
    total_at_last_close: u64,
    points: VecDeque<DataPoint>,
}

impl Series {
    fn new(interval: Duration, cap: usize, now: Instant) -> Self {
        Self {
            interval,
            cap,
            last_close: now,
            total_at_last_close: 0,
            points: VecDeque::with_capacity(cap),
        }
    }

    fn observe(&mut self, total: u64, now: Instant) {
        if now.duration_since(self.last_close) < self.interval {
            return;
        }
        push_capped(
            &mut self.points,
            self.cap,
            DataPoint {
                time: Utc::now(),
                request_count: total - self.total_at_last_close,
            },
        );
        self.last_close = now;
        self.total_at_last_close = total;
    }
}

fn push_capped<T>(queue: &mut VecDeque<T>, cap: usize, item: T) {
    if queue.len() >= cap {
        queue.pop_front();
    }
    queue.push_back(item);
}

#[derive(Debug)]
struct Inner {
    total_requests: u64,
    total_errors: u64,
    request_log: VecDeque<RequestRecord>,
    latencies: VecDeque<Duration>,
    minutes: Series,
    hours: Series,
}

/// Thread-safe, bounded request metrics.
#[derive(Debug)]
pub struct MetricsSink {
    started: Instant,
    inner: RwLock<Inner>,
}

impl Default for MetricsSink {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            started: now,
            inner: RwLock::new(Inner {
                total_requests: 0,
                total_errors: 0,
                request_log: VecDeque::with_capacity(MAX_LOG_ENTRIES),
                latencies: VecDeque::with_capacity(MAX_LATENCY_SAMPLES),
                minutes: Series::new(MINUTE, MAX_MINUTE_POINTS, now),
                hours: Series::new(HOUR, MAX_HOUR_POINTS, now),
            }),
        }
    }

    /// Record one completed request.
    pub fn record(&self, method: &str, path: &str, status: u16, latency: Duration, client: &str) {
        let now = Instant::now();
        let record = RequestRecord {
            time: Utc::now(),
            method: method.to_string(),
            path: path.to_string(),
            status_code: status,
            latency_ms: latency.as_secs_f64() * 1000.0,
            client_ip: client.to_string(),
        };

        let mut inner = self.inner.write();
        inner.total_requests += 1;
        if status >= 400 {
            inner.total_errors += 1;
        }
        push_capped(&mut inner.request_log, MAX_LOG_ENTRIES, record);
        push_capped(&mut inner.latencies, MAX_LATENCY_SAMPLES, latency);

        let total = inner.total_requests;
        inner.minutes.observe(total, now);
        inner.hours.observe(total, now);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.read();

        let average_latency = if inner.latencies.is_empty() {
            Duration::ZERO
        } else {
            inner.latencies.iter().sum::<Duration>() / inner.latencies.len() as u32
        };
        let error_rate = if inner.total_requests == 0 {
            0.0
        } else {
            inner.total_errors as f64 / inner.total_requests as f64 * 100.0
        };

        MetricsSnapshot {
            uptime_secs: self.started.elapsed().as_secs(),
            total_requests: inner.total_requests,
            total_errors: inner.total_errors,
            average_latency_ms: average_latency.as_secs_f64() * 1000.0,
            error_rate,
            request_log: inner.request_log.iter().cloned().collect(),
            time_series: inner.minutes.points.iter().copied().collect(),
            time_series_24h: inner.hours.points.iter().copied().collect(),
        }
    }

    /// Emit one summary line with the current totals.
    pub fn log_summary(&self) {
        let snapshot = self.snapshot();
        tracing::info!(
            total_requests = snapshot.total_requests,
            total_errors = snapshot.total_errors,
            error_rate = %format_args!("{:.2}", snapshot.error_rate),
            average_latency_ms = %format_args!("{:.2}", snapshot.average_latency_ms),
            uptime_secs = snapshot.uptime_secs,
            "Metrics summary"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counts_errors_and_rate() {
        let sink = MetricsSink::new();
        for status in [200, 200, 404, 500, 200] {
            sink.record("GET", "/api", status, Duration::from_millis(10), "10.0.0.1");
        }
        let snapshot = sink.snapshot();
        assert_eq!(snapshot.total_requests, 5);
        assert_eq!(snapshot.total_errors, 2);
        assert!((snapshot.error_rate - 40.0).abs() < 1e-9);
        assert!((snapshot.average_latency_ms - 10.0).abs() < 1e-9);
        assert_eq!(snapshot.request_log.len(), 5);
        assert_eq!(snapshot.request_log[2].status_code, 404);
    }

    #[tokio::test]
    async fn test_empty_sink() {
        let snapshot = MetricsSink::new().snapshot();
        assert_eq!(snapshot.total_requests, 0);
        assert_eq!(snapshot.error_rate, 0.0);
        assert_eq!(snapshot.average_latency_ms, 0.0);
    }

    #[tokio::test]
    async fn test_logs_are_capped() {
        let sink = MetricsSink::new();
        for i in 0..(MAX_LATENCY_SAMPLES + 5) {
            sink.record("GET", &format!("/{i}"), 200, Duration::from_millis(1), "c");
        }
        let snapshot = sink.snapshot();
        assert_eq!(snapshot.request_log.len(), MAX_LOG_ENTRIES);
        let first = MAX_LATENCY_SAMPLES + 5 - MAX_LOG_ENTRIES;
        assert_eq!(snapshot.request_log[0].path, format!("/{first}"));
        assert_eq!(sink.inner.read().latencies.len(), MAX_LATENCY_SAMPLES);
    }

    #[tokio::test(start_paused = true)]
    async fn test_minute_series_holds_deltas() {
        let sink = MetricsSink::new();
        sink.record("GET", "/", 200, Duration::ZERO, "c");
        sink.record("GET", "/", 200, Duration::ZERO, "c");
        assert!(sink.snapshot().time_series.is_empty());

        tokio::time::advance(MINUTE).await;
        sink.record("GET", "/", 200, Duration::ZERO, "c");
        tokio::time::advance(MINUTE).await;
        sink.record("GET", "/", 200, Duration::ZERO, "c");

        let series = sink.snapshot().time_series;
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].request_count, 3);
        assert_eq!(series[1].request_count, 1);
    }

    #[tokio::test]
    async fn test_snapshot_serializes() {
        let sink = MetricsSink::new();
        sink.record("POST", "/x", 201, Duration::from_millis(3), "1.2.3.4");
        let json = serde_json::to_value(sink.snapshot()).unwrap();
        assert_eq!(json["totalRequests"], 1);
        assert_eq!(json["requestLog"][0]["clientIp"], "1.2.3.4");
    }
}
