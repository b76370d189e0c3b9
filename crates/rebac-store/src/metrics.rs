//! Storage backend metrics

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

/// Storage operation metrics
#[derive(Debug)]
pub struct StoreMetrics {
    // Tuple read metrics
    read_count: AtomicU64,
    read_latency_us: AtomicU64,
    read_errors: AtomicU64,

    // Namespace read metrics
    namespace_read_count: AtomicU64,

    // Write metrics (tuples and namespaces)
    write_count: AtomicU64,
    write_latency_us: AtomicU64,

    // Reads rejected because the revision fell behind the GC horizon
    expired_reads: AtomicU64,
}

impl StoreMetrics {
    pub fn new() -> Self {
        Self {
            read_count: AtomicU64::new(0),
            read_latency_us: AtomicU64::new(0),
            read_errors: AtomicU64::new(0),
            namespace_read_count: AtomicU64::new(0),
            write_count: AtomicU64::new(0),
            write_latency_us: AtomicU64::new(0),
            expired_reads: AtomicU64::new(0),
        }
    }

    /// Record a tuple read operation
    pub fn record_read(&self, duration: Duration, error: bool) {
        self.read_count.fetch_add(1, Ordering::Relaxed);
        self.read_latency_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        if error {
            self.read_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a namespace definition read
    pub fn record_namespace_read(&self) {
        self.namespace_read_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a write operation
    pub fn record_write(&self, duration: Duration) {
        self.write_count.fetch_add(1, Ordering::Relaxed);
        self.write_latency_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// Record a read refused for an expired revision
    pub fn record_expired_read(&self) {
        self.expired_reads.fetch_add(1, Ordering::Relaxed);
    }

    /// Get metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        let read_count = self.read_count.load(Ordering::Relaxed);
        let write_count = self.write_count.load(Ordering::Relaxed);
        let read_latency_us = self.read_latency_us.load(Ordering::Relaxed);
        let write_latency_us = self.write_latency_us.load(Ordering::Relaxed);

        MetricsSnapshot {
            read_count,
            read_avg_latency_us: if read_count > 0 { read_latency_us / read_count } else { 0 },
            read_errors: self.read_errors.load(Ordering::Relaxed),
            namespace_read_count: self.namespace_read_count.load(Ordering::Relaxed),
            write_count,
            write_avg_latency_us: if write_count > 0 { write_latency_us / write_count } else { 0 },
            expired_reads: self.expired_reads.load(Ordering::Relaxed),
        }
    }

    /// Reset all metrics
    pub fn reset(&self) {
        self.read_count.store(0, Ordering::Relaxed);
        self.read_latency_us.store(0, Ordering::Relaxed);
        self.read_errors.store(0, Ordering::Relaxed);
        self.namespace_read_count.store(0, Ordering::Relaxed);
        self.write_count.store(0, Ordering::Relaxed);
        self.write_latency_us.store(0, Ordering::Relaxed);
        self.expired_reads.store(0, Ordering::Relaxed);
    }
}

impl Default for StoreMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`StoreMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub read_count: u64,
    pub read_avg_latency_us: u64,
    pub read_errors: u64,
    pub namespace_read_count: u64,
    pub write_count: u64,
    pub write_avg_latency_us: u64,
    pub expired_reads: u64,
}

/// Measures one operation from construction to [`OpTimer::elapsed`]
pub struct OpTimer {
    start: Instant,
}

impl OpTimer {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for OpTimer {
    fn default() -> Self {
        Self::new()
    }
}
