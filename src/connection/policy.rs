//! Reconnect policy
//!
//! Retry bound and backoff schedule owned by each connection.

use std::time::{Duration, Instant};

use crate::config::ReconnectConfig;

/// Static reconnect parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Attempts allowed before giving up (0 = never retry)
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Growth factor applied after each retry
    pub multiplier: f64,
}

impl ReconnectPolicy {
    /// Policy for single-shot sessions that must not retry
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Build from the `[reconnect]` config section
    pub fn from_config(config: &ReconnectConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            multiplier: config.backoff_multiplier,
        }
    }

    /// Fresh per-connection schedule
    pub fn start(&self) -> Backoff {
        Backoff {
            retries_left: self.max_retries,
            next_delay: self.initial_delay.min(self.max_delay),
            policy: self.clone(),
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_retries: 20,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(10_000),
            multiplier: 1.5,
        }
    }
}

/// Mutable retry state for one connection
#[derive(Debug, Clone)]
pub struct Backoff {
    retries_left: u32,
    next_delay: Duration,
    policy: ReconnectPolicy,
}

impl Backoff {
    /// Consume one retry and return the deadline for the next attempt.
    ///
    /// Returns `None` once retries are exhausted.
    pub fn schedule(&mut self, now: Instant) -> Option<Instant> {
        if self.retries_left == 0 {
            return None;
        }
        self.retries_left -= 1;

        let delay = self.next_delay;
        let grown = delay.as_secs_f64() * self.policy.multiplier;
        // Out-of-range growth (overflow, NaN) saturates at the cap
        self.next_delay = Duration::try_from_secs_f64(grown)
            .unwrap_or(self.policy.max_delay)
            .min(self.policy.max_delay);

        Some(now + delay)
    }

    /// Restore the full retry budget after a successful session
    pub fn reset(&mut self) {
        self.retries_left = self.policy.max_retries;
        self.next_delay = self.policy.initial_delay.min(self.policy.max_delay);
    }

    pub fn retries_left(&self) -> u32 {
        self.retries_left
    }

    pub fn next_delay(&self) -> Duration {
        self.next_delay
    }
}
