//! Heartbeat Supervision
//!
//! Two independent liveness timers over one negotiated interval.
//!
//! - **Outbound**: fires `interval` after the last outbound frame; the driver
//!   responds by sending a heartbeat frame if the transport is writable.
//! - **Inbound**: fires after `2 × interval` (the grace period) with no
//!   inbound bytes. If the transport still looks readable and
//!   `heartbeat_force_reconnect` is off, the expiry is ignored; otherwise it
//!   raises a heartbeat timeout.
//!
//! The monitor only does deadline bookkeeping; the async driver owns the
//! actual sleeping. An interval of 0 disables both timers.

use std::time::{Duration, Instant};

use crate::error::AmqpError;

/// What an expired deadline asks the driver to do.
#[derive(Debug, PartialEq, Eq)]
pub enum HeartbeatEvent {
    /// Send a heartbeat frame if the transport is writable, then re-arm.
    SendHeartbeat,
    /// The inbound grace elapsed; tear down with `HeartbeatTimeout`.
    InboundTimeout { grace_secs: u32 },
}

/// Deadline bookkeeping for both heartbeat directions.
pub struct HeartbeatMonitor {
    interval: Option<Duration>,
    force_reconnect: bool,
    outbound_deadline: Option<Instant>,
    inbound_deadline: Option<Instant>,
}

impl HeartbeatMonitor {
    /// Interval in seconds; 0 disables heartbeats entirely.
    pub fn new(interval_secs: u16, force_reconnect: bool) -> Self {
        let interval = if interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(u64::from(interval_secs)))
        };
        HeartbeatMonitor {
            interval,
            force_reconnect,
            outbound_deadline: None,
            inbound_deadline: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.interval.is_some()
    }

    /// Grace before the inbound timer fires: twice the interval.
    pub fn grace(&self) -> Option<Duration> {
        self.interval.map(|i| i * 2)
    }

    /// Arm both timers; called when the connection reaches ready.
    pub fn arm(&mut self, now: Instant) {
        if let Some(interval) = self.interval {
            self.outbound_deadline = Some(now + interval);
            self.inbound_deadline = Some(now + interval * 2);
        }
    }

    /// Cancel both timers; called on shutdown and teardown.
    pub fn cancel(&mut self) {
        self.outbound_deadline = None;
        self.inbound_deadline = None;
    }

    /// Reset the outbound timer; called after every outbound frame.
    pub fn record_outbound(&mut self, now: Instant) {
        if let (Some(interval), Some(_)) = (self.interval, self.outbound_deadline) {
            self.outbound_deadline = Some(now + interval);
        }
    }

    /// Reset the inbound timer; called on every inbound byte.
    pub fn record_inbound(&mut self, now: Instant) {
        if let (Some(interval), Some(_)) = (self.interval, self.inbound_deadline) {
            self.inbound_deadline = Some(now + interval * 2);
        }
    }

    /// The next instant the driver must wake at, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.outbound_deadline, self.inbound_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) => Some(a),
            (None, b) => b,
        }
    }

    /// Check both deadlines against `now`. Inbound expiry wins over an
    /// outbound send when both are due.
    ///
    /// `transport_readable` suppresses the inbound expiry unless force
    /// reconnect was requested.
    pub fn poll(&mut self, now: Instant, transport_readable: bool) -> Option<HeartbeatEvent> {
        let interval = self.interval?;

        if let Some(deadline) = self.inbound_deadline {
            if now >= deadline {
                if transport_readable && !self.force_reconnect {
                    self.inbound_deadline = Some(now + interval * 2);
                } else {
                    let grace_secs = (interval * 2).as_secs() as u32;
                    self.cancel();
                    return Some(HeartbeatEvent::InboundTimeout { grace_secs });
                }
            }
        }

        if let Some(deadline) = self.outbound_deadline {
            if now >= deadline {
                self.outbound_deadline = Some(now + interval);
                return Some(HeartbeatEvent::SendHeartbeat);
            }
        }

        None
    }

    /// The error an inbound timeout surfaces as.
    pub fn timeout_error(grace_secs: u32) -> AmqpError {
        AmqpError::HeartbeatTimeout { grace_secs }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_zero_interval_disables() {
        let mut monitor = HeartbeatMonitor::new(0, false);
        assert!(!monitor.is_enabled());
        let now = Instant::now();
        monitor.arm(now);
        assert_eq!(monitor.next_deadline(), None);
        assert_eq!(monitor.poll(now + secs(3600), false), None);
    }

    #[test]
    fn test_outbound_fires_after_interval() {
        let mut monitor = HeartbeatMonitor::new(60, false);
        let now = Instant::now();
        monitor.arm(now);

        assert_eq!(monitor.poll(now + secs(59), true), None);
        assert_eq!(monitor.poll(now + secs(60), true), Some(HeartbeatEvent::SendHeartbeat));
        // re-armed relative to the fire time
        assert_eq!(monitor.poll(now + secs(61), true), None);
    }

    #[test]
    fn test_outbound_reset_by_traffic() {
        let mut monitor = HeartbeatMonitor::new(60, false);
        let now = Instant::now();
        monitor.arm(now);
        monitor.record_outbound(now + secs(50));

        assert_eq!(monitor.poll(now + secs(60), true), None);
        assert_eq!(monitor.poll(now + secs(110), true), Some(HeartbeatEvent::SendHeartbeat));
    }

    #[test]
    fn test_inbound_grace_is_twice_the_interval() {
        let mut monitor = HeartbeatMonitor::new(60, true);
        let now = Instant::now();
        monitor.arm(now);
        // consume the outbound expiry first
        assert_eq!(monitor.poll(now + secs(60), false), Some(HeartbeatEvent::SendHeartbeat));

        assert_eq!(monitor.poll(now + secs(119), false), None);
        assert_eq!(
            monitor.poll(now + secs(120), false),
            Some(HeartbeatEvent::InboundTimeout { grace_secs: 120 })
        );
        // timers are canceled after a timeout
        assert_eq!(monitor.next_deadline(), None);
    }

    #[test]
    fn test_inbound_expiry_skipped_while_readable() {
        let mut monitor = HeartbeatMonitor::new(30, false);
        let now = Instant::now();
        monitor.arm(now);
        assert_eq!(monitor.poll(now + secs(30), true), Some(HeartbeatEvent::SendHeartbeat));

        // readable transport and no force flag: inbound expiry is ignored and
        // re-armed, the due outbound send still goes out
        assert_eq!(monitor.poll(now + secs(60), true), Some(HeartbeatEvent::SendHeartbeat));
        assert_eq!(monitor.poll(now + secs(61), true), None);
        assert!(monitor.next_deadline().is_some());
    }

    #[test]
    fn test_force_reconnect_times_out_despite_readable() {
        let mut monitor = HeartbeatMonitor::new(30, true);
        let now = Instant::now();
        monitor.arm(now);
        assert_eq!(monitor.poll(now + secs(30), true), Some(HeartbeatEvent::SendHeartbeat));
        assert_eq!(
            monitor.poll(now + secs(60), true),
            Some(HeartbeatEvent::InboundTimeout { grace_secs: 60 })
        );
    }

    #[test]
    fn test_inbound_reset_by_traffic() {
        let mut monitor = HeartbeatMonitor::new(30, true);
        let now = Instant::now();
        monitor.arm(now);
        monitor.record_inbound(now + secs(59));

        assert_eq!(monitor.poll(now + secs(60), false), Some(HeartbeatEvent::SendHeartbeat));
        assert_eq!(monitor.poll(now + secs(89), false), None);
        assert_eq!(
            monitor.poll(now + secs(119), false),
            Some(HeartbeatEvent::InboundTimeout { grace_secs: 60 })
        );
    }

    #[test]
    fn test_cancel_stops_both_timers() {
        let mut monitor = HeartbeatMonitor::new(10, true);
        let now = Instant::now();
        monitor.arm(now);
        monitor.cancel();
        assert_eq!(monitor.poll(now + secs(3600), false), None);
        assert_eq!(monitor.next_deadline(), None);
    }
}
