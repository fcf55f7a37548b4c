use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use once_cell::sync::Lazy;

/// Global runtime metrics for the collector.
///
/// Purpose:
/// - Track cycle and task outcomes
/// - Track upstream traffic and rejections
/// - Track reconciliation and eviction volume
/// - Track cache writes
///
/// Design:
/// - Lock-free (Atomics)
/// - Cheap to update from any task
#[derive(Default)]
pub struct RuntimeMetrics {
    pub cycles_started: AtomicUsize,

    // Task outcomes
    pub tasks_completed: AtomicUsize,
    pub tasks_failed: AtomicUsize,
    pub tasks_faulted: AtomicUsize,
    pub tasks_cancelled: AtomicUsize,

    // Upstream
    pub upstream_requests: AtomicUsize,
    pub upstream_rejections: AtomicUsize,

    // Store
    pub rows_inserted: AtomicUsize,
    pub rows_updated: AtomicUsize,
    pub store_errors: AtomicUsize,
    pub samples_evicted: AtomicUsize,

    // Cache
    pub cache_writes: AtomicUsize,
    pub cache_errors: AtomicUsize,
}

impl RuntimeMetrics {
    pub fn incr(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// One-line summary for the periodic reporter.
    pub fn summary(&self) -> String {
        let g = |c: &AtomicUsize| c.load(Ordering::Relaxed);
        format!(
            "cycles={} done={} failed={} faulted={} cancelled={} req={} rejected={} ins={} upd={} store_err={} evicted={} cache={} cache_err={}",
            g(&self.cycles_started),
            g(&self.tasks_completed),
            g(&self.tasks_failed),
            g(&self.tasks_faulted),
            g(&self.tasks_cancelled),
            g(&self.upstream_requests),
            g(&self.upstream_rejections),
            g(&self.rows_inserted),
            g(&self.rows_updated),
            g(&self.store_errors),
            g(&self.samples_evicted),
            g(&self.cache_writes),
            g(&self.cache_errors),
        )
    }
}

/// Global metrics registry (singleton)
pub static METRICS: Lazy<Arc<RuntimeMetrics>> =
    Lazy::new(|| Arc::new(RuntimeMetrics::default()));
