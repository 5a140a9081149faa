//! Connection state

use std::time::{Duration, Instant};

/// Stable identifier for a registered connection
///
/// Allocated monotonically by the reactor, so ordering by id is
/// registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    /// Create from raw u64
    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Get raw value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Transport lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// Built but `connect()` not yet called
    Idle,
    /// Non-blocking connect in flight
    Connecting,
    /// TCP is up, TLS handshake in progress
    Handshaking,
    /// Transport ready for application traffic
    Established,
    /// Waiting out a reconnect delay
    Backoff,
    /// Retries exhausted
    GaveUp,
    /// Released by `stop()`
    Stopped,
}

/// Per-connection traffic counters
#[derive(Debug, Clone)]
pub struct ConnectionStats {
    /// Time the current transport was established
    pub established_at: Option<Instant>,
    /// Last successful read or write
    pub last_active: Instant,
    /// Bytes received
    pub bytes_rx: u64,
    /// Bytes sent
    pub bytes_tx: u64,
    /// Times the transport was re-established
    pub reconnects: u64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self {
            established_at: None,
            last_active: Instant::now(),
            bytes_rx: 0,
            bytes_tx: 0,
            reconnects: 0,
        }
    }

    /// Mark the transport as established
    pub fn set_established(&mut self) {
        self.established_at = Some(Instant::now());
        self.touch();
    }

    /// Update last activity timestamp
    pub fn touch(&mut self) {
        self.last_active = Instant::now();
    }

    /// Record received bytes
    pub fn record_rx(&mut self, bytes: u64) {
        self.bytes_rx = self.bytes_rx.saturating_add(bytes);
        self.touch();
    }

    /// Record sent bytes
    pub fn record_tx(&mut self, bytes: u64) {
        self.bytes_tx = self.bytes_tx.saturating_add(bytes);
        self.touch();
    }

    /// Record a completed re-establishment
    pub fn record_reconnect(&mut self) {
        self.reconnects = self.reconnects.saturating_add(1);
    }

    /// Time since the current transport came up
    pub fn uptime(&self) -> Option<Duration> {
        self.established_at.map(|at| at.elapsed())
    }

    /// Get idle duration
    pub fn idle_duration(&self) -> Duration {
        self.last_active.elapsed()
    }
}

impl Default for ConnectionStats {
    fn default() -> Self {
        Self::new()
    }
}
