//! Metrics collection and monitoring.
//!
//! This module provides metrics collection using Prometheus for monitoring
//! the lock service's behavior, trimmed to the series the lock manager and
//! heartbeat loop actually produce.

use prometheus::{Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct Metrics {
    pub locks_acquired_total: Counter,
    pub locks_stolen_total: Counter,
    pub locks_released_total: Counter,
    pub locks_abandoned_total: Counter,
    pub lock_operations_total: CounterVec,

    pub lock_operation_duration: Histogram,

    pub active_locks: Gauge,

    pub registry: Arc<Registry>,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Arc::new(Registry::new());

        let locks_acquired_total = Counter::new("locks_acquired_total", "Total locks freshly acquired")?;
        let locks_stolen_total = Counter::new("locks_stolen_total", "Total locks stolen from an expired holder")?;
        let locks_released_total = Counter::new("locks_released_total", "Total locks released")?;
        let locks_abandoned_total = Counter::new(
            "locks_abandoned_total",
            "Total locks given up for exceeding the abandonment threshold",
        )?;

        let lock_operations_total = CounterVec::new(
            Opts::new("lock_operations_total", "Total lock operations by outcome"),
            &["operation", "outcome"],
        )?;

        let lock_operation_duration = Histogram::with_opts(
            HistogramOpts::new("lock_operation_duration_seconds", "Lock operation duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
        )?;

        let active_locks = Gauge::new("active_locks", "Locks this process currently believes it holds")?;

        registry.register(Box::new(locks_acquired_total.clone()))?;
        registry.register(Box::new(locks_stolen_total.clone()))?;
        registry.register(Box::new(locks_released_total.clone()))?;
        registry.register(Box::new(locks_abandoned_total.clone()))?;
        registry.register(Box::new(lock_operations_total.clone()))?;
        registry.register(Box::new(lock_operation_duration.clone()))?;
        registry.register(Box::new(active_locks.clone()))?;

        Ok(Metrics {
            locks_acquired_total,
            locks_stolen_total,
            locks_released_total,
            locks_abandoned_total,
            lock_operations_total,
            lock_operation_duration,
            active_locks,
            registry,
        })
    }

    pub fn record_operation(&self, operation: &str, outcome: &str) {
        self.lock_operations_total
            .with_label_values(&[operation, outcome])
            .inc();
    }

    pub fn record_operation_duration(&self, duration: f64) {
        self.lock_operation_duration.observe(duration);
    }

    pub fn increment_locks_acquired(&self) {
        self.locks_acquired_total.inc();
        self.active_locks.inc();
    }

    pub fn increment_locks_stolen(&self) {
        self.locks_stolen_total.inc();
        self.active_locks.inc();
    }

    pub fn increment_locks_released(&self) {
        self.locks_released_total.inc();
        self.active_locks.dec();
    }

    pub fn increment_locks_abandoned(&self) {
        self.locks_abandoned_total.inc();
        self.active_locks.dec();
    }

    /// A held lease was lost to another owner's steal or conditional delete.
    /// No dedicated counter — `lock_operations_total{outcome="unavailable"}`
    /// already tracks this path — but `active_locks` must still come down.
    pub fn decrement_active_locks_lost(&self) {
        self.active_locks.dec();
    }

    pub fn get_metrics(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).to_string())
    }
}

/// Times a lock operation and records both the operation/outcome counter and
/// the duration histogram when dropped or finished explicitly.
pub struct MetricsTimer {
    start: Instant,
    metrics: Arc<Metrics>,
    operation: String,
}

impl MetricsTimer {
    pub fn new(metrics: Arc<Metrics>, operation: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            metrics,
            operation: operation.into(),
        }
    }

    pub fn finish(self, outcome: &str) {
        let duration = self.start.elapsed().as_secs_f64();
        self.metrics.record_operation(&self.operation, outcome);
        self.metrics.record_operation_duration(duration);
    }
}
