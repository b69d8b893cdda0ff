//! Reconnection Supervision
//!
//! Backoff policy and host rotation for re-establishing a failed connection.
//!
//! # Overview
//!
//! Any fatal error while no attempt is pending triggers a teardown followed
//! by a scheduled retry. The first failure since the last successful ready
//! waits the base backoff; under the exponential strategy each further
//! failure doubles the wait up to the configured cap, while the linear
//! strategy keeps it constant. A successful ready resets the series.
//!
//! Host rotation picks the initial host by explicit preference or at random,
//! then advances round-robin on every retry.

use std::time::Duration;

use log::debug;
use rand::Rng;

/// How successive backoff waits grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    Linear,
    Exponential,
}

/// Retry scheduling state.
pub struct ReconnectSupervisor {
    enabled: bool,
    strategy: BackoffStrategy,
    base_ms: u64,
    exponential_limit_ms: u64,
    current_ms: Option<u64>,
    attempt_pending: bool,
}

impl ReconnectSupervisor {
    pub fn new(
        enabled: bool,
        strategy: BackoffStrategy,
        base_ms: u64,
        exponential_limit_ms: u64,
    ) -> Self {
        ReconnectSupervisor {
            enabled,
            strategy,
            base_ms,
            exponential_limit_ms,
            current_ms: None,
            attempt_pending: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether a retry is already scheduled; further errors are folded into
    /// the pending attempt.
    pub fn attempt_pending(&self) -> bool {
        self.attempt_pending
    }

    pub fn set_attempt_pending(&mut self, pending: bool) {
        self.attempt_pending = pending;
    }

    /// Compute the wait before the next attempt, advancing the series.
    ///
    /// Returns `None` when reconnection is disabled.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if !self.enabled {
            return None;
        }
        let next = match self.current_ms {
            None => self.base_ms,
            Some(current) => match self.strategy {
                BackoffStrategy::Exponential => {
                    (current * 2).min(self.exponential_limit_ms)
                }
                BackoffStrategy::Linear => current,
            },
        };
        self.current_ms = Some(next);
        debug!("reconnect scheduled in {}ms", next);
        Some(Duration::from_millis(next))
    }

    /// A successful ready resets the backoff series.
    pub fn on_ready(&mut self) {
        self.current_ms = None;
        self.attempt_pending = false;
    }
}

/// Ordered host list with preference-or-random initial pick.
pub struct HostRotation {
    hosts: Vec<String>,
    index: usize,
}

impl HostRotation {
    /// `preference` is clamped to the last valid index; absent picks at
    /// random.
    pub fn new(hosts: Vec<String>, preference: Option<usize>) -> Self {
        let len = hosts.len().max(1);
        let index = match preference {
            Some(preferred) => preferred.min(len - 1),
            None if len > 1 => rand::thread_rng().gen_range(0..len),
            None => 0,
        };
        HostRotation { hosts, index }
    }

    pub fn current(&self) -> &str {
        self.hosts.get(self.index).map(String::as_str).unwrap_or("localhost")
    }

    /// Move to the next host; called once per reconnect attempt.
    pub fn advance(&mut self) -> &str {
        if !self.hosts.is_empty() {
            self.index = (self.index + 1) % self.hosts.len();
        }
        self.current()
    }
}
