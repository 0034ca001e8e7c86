//! Telemetry Hook — observable counters/gauges/histograms on the
//! Dispatcher and Worker Pool (spec.md §4.6).
//!
//! `NullTelemetry` is a no-op, valid for library consumers and tests.
//! `InMemoryTelemetry` registers its series with a private `prometheus`
//! registry and backs the HTTP layer's `/metrics` Prometheus exposition
//! (SPEC_FULL.md §6).

use std::time::Duration;

use prometheus::{Encoder, Gauge, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::error::ErrorCode;

/// Counters: submissions, cache_hits, dedup_joins, completions, errors by
/// code. Gauges: pool queue depth, active workers (read directly off the
/// pool at render time). Histograms: submit->ready latency, execution
/// byte size.
pub trait Telemetry: Send + Sync {
    fn record_submission(&self) {}
    fn record_cache_hit(&self) {}
    fn record_dedup_join(&self) {}
    fn record_completion(&self) {}
    fn record_error(&self, _code: ErrorCode) {}
    fn observe_submit_to_ready(&self, _latency: Duration) {}
    fn observe_execution_bytes(&self, _bytes: u64) {}
}

/// No-op implementation; the default for library consumers.
pub struct NullTelemetry;

impl Telemetry for NullTelemetry {}

/// `prometheus`-backed implementation driving `/metrics`. Each instance owns
/// a private `Registry` rather than the global default one, so tests can
/// construct independent instances without colliding on metric names.
pub struct InMemoryTelemetry {
    registry: Registry,
    submissions: IntCounter,
    cache_hits: IntCounter,
    dedup_joins: IntCounter,
    completions: IntCounter,
    errors: IntCounterVec,
    queue_depth: Gauge,
    active_workers: Gauge,
    submit_to_ready: Histogram,
    execution_bytes: Histogram,
}

impl InMemoryTelemetry {
    pub fn new() -> Self {
        let registry = Registry::new();

        let submissions = IntCounter::new("flight_submissions_total", "Total query submissions.").unwrap();
        let cache_hits = IntCounter::new(
            "flight_cache_hits_total",
            "Submissions that resolved to an already-ready job.",
        )
        .unwrap();
        let dedup_joins = IntCounter::new(
            "flight_dedup_joins_total",
            "Submissions that joined an in-flight job.",
        )
        .unwrap();
        let completions = IntCounter::new("flight_completions_total", "Jobs that reached ready.").unwrap();
        let errors = IntCounterVec::new(
            Opts::new("flight_errors_total", "Jobs that reached error, by code."),
            &["code"],
        )
        .unwrap();
        let queue_depth = Gauge::new(
            "flight_pool_queue_depth",
            "Current depth of the worker pool submission queue.",
        )
        .unwrap();
        let active_workers = Gauge::new(
            "flight_pool_active_workers",
            "Workers currently executing a job.",
        )
        .unwrap();
        let submit_to_ready = Histogram::with_opts(HistogramOpts::new(
            "flight_submit_to_ready_seconds",
            "Submit-to-ready latency in seconds.",
        ))
        .unwrap();
        let execution_bytes = Histogram::with_opts(
            HistogramOpts::new("flight_execution_bytes", "Artifact byte size per completed job.").buckets(vec![
                1024.0,
                64.0 * 1024.0,
                1024.0 * 1024.0,
                16.0 * 1024.0 * 1024.0,
                256.0 * 1024.0 * 1024.0,
                1024.0 * 1024.0 * 1024.0,
            ]),
        )
        .unwrap();

        registry.register(Box::new(submissions.clone())).unwrap();
        registry.register(Box::new(cache_hits.clone())).unwrap();
        registry.register(Box::new(dedup_joins.clone())).unwrap();
        registry.register(Box::new(completions.clone())).unwrap();
        registry.register(Box::new(errors.clone())).unwrap();
        registry.register(Box::new(queue_depth.clone())).unwrap();
        registry.register(Box::new(active_workers.clone())).unwrap();
        registry.register(Box::new(submit_to_ready.clone())).unwrap();
        registry.register(Box::new(execution_bytes.clone())).unwrap();

        Self {
            registry,
            submissions,
            cache_hits,
            dedup_joins,
            completions,
            errors,
            queue_depth,
            active_workers,
            submit_to_ready,
            execution_bytes,
        }
    }

    /// Render the current series as Prometheus text exposition, after
    /// updating the pool gauges to their latest values.
    pub fn render(&self, queue_depth: usize, active_workers: usize) -> String {
        self.queue_depth.set(queue_depth as f64);
        self.active_workers.set(active_workers as f64);

        let metric_families = self.registry.gather();
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&metric_families, &mut buf)
            .expect("prometheus text encoding never fails for well-formed metrics");
        String::from_utf8(buf).expect("prometheus text exposition is always valid UTF-8")
    }
}

impl Default for InMemoryTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl Telemetry for InMemoryTelemetry {
    fn record_submission(&self) {
        self.submissions.inc();
    }

    fn record_cache_hit(&self) {
        self.cache_hits.inc();
    }

    fn record_dedup_join(&self) {
        self.dedup_joins.inc();
    }

    fn record_completion(&self) {
        self.completions.inc();
    }

    fn record_error(&self, code: ErrorCode) {
        if matches!(code, ErrorCode::NotFound | ErrorCode::NotReady) {
            // Client-facing 4xx outcomes, not job failures; not counted here.
            return;
        }
        self.errors.with_label_values(&[code.as_str()]).inc();
    }

    fn observe_submit_to_ready(&self, latency: Duration) {
        self.submit_to_ready.observe(latency.as_secs_f64());
    }

    fn observe_execution_bytes(&self, bytes: u64) {
        self.execution_bytes.observe(bytes as f64);
    }
}
