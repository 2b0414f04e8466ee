//! Ping/pong bookkeeping for one broker session
//!
//! A fresh [`KeepaliveMonitor`] is created on every successful connect, so
//! nothing carries over between sessions. Pings are due every `keepalive / 2`;
//! the session is considered dead once no ping acknowledgment has been seen
//! for a full `keepalive`.

use crate::clock::{duration_to_ticks, Ticks};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeepaliveMonitor {
    last_ping_sent_at: Ticks,
    last_pong_received_at: Ticks,
    ping_interval: Duration,
    pong_deadline: Duration,
}

impl KeepaliveMonitor {
    /// Start tracking with both timestamps at `now`
    pub fn new(keepalive: Duration, now: Ticks) -> Self {
        Self {
            last_ping_sent_at: now,
            last_pong_received_at: now,
            ping_interval: keepalive / 2,
            pong_deadline: keepalive,
        }
    }

    pub fn should_ping(&self, now: Ticks) -> bool {
        now.elapsed_at_least(self.last_ping_sent_at, self.ping_interval)
    }

    pub fn is_expired(&self, now: Ticks) -> bool {
        now.elapsed_at_least(self.last_pong_received_at, self.pong_deadline)
    }

    /// Pinging never touches the pong timestamp
    pub fn record_ping(&mut self, now: Ticks) {
        self.last_ping_sent_at = now;
    }

    pub fn record_pong(&mut self, now: Ticks) {
        self.last_pong_received_at = now;
    }

    /// Milliseconds since the last pong, as a signed wraparound difference
    pub fn since_last_pong(&self, now: Ticks) -> i64 {
        now.diff(self.last_pong_received_at)
    }

    pub fn last_ping_sent_at(&self) -> Ticks {
        self.last_ping_sent_at
    }

    pub fn last_pong_received_at(&self) -> Ticks {
        self.last_pong_received_at
    }

    pub fn ping_interval(&self) -> Duration {
        self.ping_interval
    }

    pub fn pong_deadline(&self) -> Duration {
        self.pong_deadline
    }

    /// Ticks until the next ping falls due (0 when already due)
    pub fn until_next_ping(&self, now: Ticks) -> u32 {
        let remaining =
            i64::from(duration_to_ticks(self.ping_interval)) - now.diff(self.last_ping_sent_at);
        remaining.max(0) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: u64) -> Ticks {
        Ticks(0).add(Duration::from_secs(secs))
    }

    #[test]
    fn test_intervals_derive_from_keepalive() {
        let monitor = KeepaliveMonitor::new(Duration::from_secs(60), at(0));
        assert_eq!(monitor.ping_interval(), Duration::from_secs(30));
        assert_eq!(monitor.pong_deadline(), Duration::from_secs(60));
        assert_eq!(monitor.last_ping_sent_at(), at(0));
        assert_eq!(monitor.last_pong_received_at(), at(0));
    }

    #[test]
    fn test_should_ping_at_half_keepalive() {
        let monitor = KeepaliveMonitor::new(Duration::from_secs(60), at(0));
        assert!(!monitor.should_ping(at(29)));
        assert!(monitor.should_ping(at(30)));
        assert!(monitor.should_ping(at(45)));
    }

    #[test]
    fn test_ping_resets_only_ping_timestamp() {
        let mut monitor = KeepaliveMonitor::new(Duration::from_secs(60), at(0));
        monitor.record_ping(at(30));

        assert!(!monitor.should_ping(at(59)));
        assert!(monitor.should_ping(at(60)));
        assert_eq!(monitor.last_pong_received_at(), at(0));
        assert!(monitor.is_expired(at(60)));
    }

    #[test]
    fn test_expiry_boundary() {
        let monitor = KeepaliveMonitor::new(Duration::from_secs(60), at(0));
        assert!(!monitor.is_expired(Ticks(at(60).0 - 1)));
        assert!(monitor.is_expired(at(60)));
        assert!(monitor.is_expired(at(61)));
    }

    #[test]
    fn test_pong_extends_deadline() {
        let mut monitor = KeepaliveMonitor::new(Duration::from_secs(60), at(0));
        monitor.record_pong(at(31));
        assert!(!monitor.is_expired(at(61)));
        assert!(monitor.is_expired(at(91)));
        assert_eq!(monitor.since_last_pong(at(61)), 30_000);
    }

    #[test]
    fn test_deadlines_hold_across_counter_wrap() {
        let start = Ticks(u32::MAX - 2_000);
        let mut monitor = KeepaliveMonitor::new(Duration::from_secs(10), start);

        let later = start.add(Duration::from_secs(5));
        assert!(later.0 < start.0, "counter should have wrapped");
        assert!(monitor.should_ping(later));
        assert!(!monitor.is_expired(later));

        monitor.record_ping(later);
        assert!(monitor.is_expired(start.add(Duration::from_secs(10))));
    }

    #[test]
    fn test_until_next_ping() {
        let monitor = KeepaliveMonitor::new(Duration::from_secs(60), at(0));
        assert_eq!(monitor.until_next_ping(at(10)), 20_000);
        assert_eq!(monitor.until_next_ping(at(30)), 0);
        assert_eq!(monitor.until_next_ping(at(40)), 0);
    }
}
