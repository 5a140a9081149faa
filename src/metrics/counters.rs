//! Atomic counters for hot-path metrics
//!
//! Lock-free counters that can be safely updated from any thread.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics instance
pub static METRICS: Metrics = Metrics::new();

/// Atomic metrics counters
pub struct Metrics {
    // Scheduling metrics
    pub ticks_total: AtomicU64,
    pub passes_total: AtomicU64,
    pub probes_total: AtomicU64,
    pub probe_failures: AtomicU64,

    // I/O metrics
    pub reads_total: AtomicU64,
    pub writes_total: AtomicU64,
    pub read_failures: AtomicU64,
    pub write_failures: AtomicU64,
    pub error_events: AtomicU64,
    pub bytes_received: AtomicU64,
    pub bytes_sent: AtomicU64,

    // Connection metrics
    pub connect_attempts: AtomicU64,
    pub sessions_established: AtomicU64,
    pub reconnects_triggered: AtomicU64,
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            ticks_total: AtomicU64::new(0),
            passes_total: AtomicU64::new(0),
            probes_total: AtomicU64::new(0),
            probe_failures: AtomicU64::new(0),
            reads_total: AtomicU64::new(0),
            writes_total: AtomicU64::new(0),
            read_failures: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
            error_events: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            connect_attempts: AtomicU64::new(0),
            sessions_established: AtomicU64::new(0),
            reconnects_triggered: AtomicU64::new(0),
        }
    }

    // Scheduling
    #[inline]
    pub fn tick(&self) {
        self.ticks_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn pass(&self) {
        self.passes_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn probe(&self) {
        self.probes_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn probe_failed(&self) {
        self.probe_failures.fetch_add(1, Ordering::Relaxed);
    }

    // I/O tracking
    #[inline]
    pub fn read(&self, bytes: u64) {
        self.reads_total.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    #[inline]
    pub fn write(&self, bytes: u64) {
        self.writes_total.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    #[inline]
    pub fn read_failed(&self) {
        self.read_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn write_failed(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn error_event(&self) {
        self.error_events.fetch_add(1, Ordering::Relaxed);
    }

    // Connection tracking
    #[inline]
    pub fn connect_attempt(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn session_established(&self) {
        self.sessions_established.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn reconnect_triggered(&self) {
        self.reconnects_triggered.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ticks_total: self.ticks_total.load(Ordering::Relaxed),
            passes_total: self.passes_total.load(Ordering::Relaxed),
            probes_total: self.probes_total.load(Ordering::Relaxed),
            probe_failures: self.probe_failures.load(Ordering::Relaxed),
            reads_total: self.reads_total.load(Ordering::Relaxed),
            writes_total: self.writes_total.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            error_events: self.error_events.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            sessions_established: self.sessions_established.load(Ordering::Relaxed),
            reconnects_triggered: self.reconnects_triggered.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics for reporting
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub ticks_total: u64,
    pub passes_total: u64,
    pub probes_total: u64,
    pub probe_failures: u64,
    pub reads_total: u64,
    pub writes_total: u64,
    pub read_failures: u64,
    pub write_failures: u64,
    pub error_events: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub connect_attempts: u64,
    pub sessions_established: u64,
    pub reconnects_triggered: u64,
}
