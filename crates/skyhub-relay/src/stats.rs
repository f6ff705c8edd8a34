//! Traffic counters, shared lock-free between the packet path and the
//! periodic stats logger.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters over the whole life of the hub. Gauges (`local_sessions`,
/// `remote_sessions`) track the current registry state; everything
/// else only grows.
#[derive(Debug, Default)]
pub struct HubStats {
    pub packets_received: AtomicU64,
    /// Dropped on the blacklist before any parsing.
    pub blacklist_rejected: AtomicU64,
    /// Failed size, magic or version validation.
    pub invalid_packets: AtomicU64,
    /// Carried the relay magic from an address we do not know.
    pub unknown_relay: AtomicU64,
    /// Valid packets that arrived with the relay magic.
    pub relayed_in: AtomicU64,
    pub position_msgs: AtomicU64,
    pub chat_msgs: AtomicU64,
    pub ping_msgs: AtomicU64,
    pub pong_msgs: AtomicU64,
    pub unknown_msgs: AtomicU64,
    pub crossfeed_sent: AtomicU64,
    /// Counted by the I/O layer when a crossfeed send errors.
    pub crossfeed_failed: AtomicU64,
    pub local_sessions: AtomicU64,
    pub remote_sessions: AtomicU64,
    /// High-water mark of concurrent sessions.
    pub max_sessions: AtomicU64,
}

/// Plain-number copy of the counters for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub packets_received: u64,
    pub blacklist_rejected: u64,
    pub invalid_packets: u64,
    pub unknown_relay: u64,
    pub relayed_in: u64,
    pub position_msgs: u64,
    pub chat_msgs: u64,
    pub ping_msgs: u64,
    pub pong_msgs: u64,
    pub unknown_msgs: u64,
    pub crossfeed_sent: u64,
    pub crossfeed_failed: u64,
    pub local_sessions: u64,
    pub remote_sessions: u64,
    pub max_sessions: u64,
}

impl HubStats {
    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Set the session gauges, ratcheting the high-water mark.
    pub fn set_session_gauges(&self, local: u64, remote: u64) {
        self.local_sessions.store(local, Ordering::Relaxed);
        self.remote_sessions.store(remote, Ordering::Relaxed);
        self.max_sessions.fetch_max(local + remote, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            packets_received: self.packets_received.load(Ordering::Relaxed),
            blacklist_rejected: self.blacklist_rejected.load(Ordering::Relaxed),
            invalid_packets: self.invalid_packets.load(Ordering::Relaxed),
            unknown_relay: self.unknown_relay.load(Ordering::Relaxed),
            relayed_in: self.relayed_in.load(Ordering::Relaxed),
            position_msgs: self.position_msgs.load(Ordering::Relaxed),
            chat_msgs: self.chat_msgs.load(Ordering::Relaxed),
            ping_msgs: self.ping_msgs.load(Ordering::Relaxed),
            pong_msgs: self.pong_msgs.load(Ordering::Relaxed),
            unknown_msgs: self.unknown_msgs.load(Ordering::Relaxed),
            crossfeed_sent: self.crossfeed_sent.load(Ordering::Relaxed),
            crossfeed_failed: self.crossfeed_failed.load(Ordering::Relaxed),
            local_sessions: self.local_sessions.load(Ordering::Relaxed),
            remote_sessions: self.remote_sessions.load(Ordering::Relaxed),
            max_sessions: self.max_sessions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gauges_ratchet_the_high_water_mark() {
        let stats = HubStats::default();
        stats.set_session_gauges(3, 2);
        stats.set_session_gauges(1, 1);
        let snap = stats.snapshot();
        assert_eq!(snap.local_sessions, 1);
        assert_eq!(snap.remote_sessions, 1);
        assert_eq!(snap.max_sessions, 5);
    }

    #[test]
    fn snapshot_reflects_increments() {
        let stats = HubStats::default();
        HubStats::inc(&stats.packets_received);
        HubStats::inc(&stats.packets_received);
        HubStats::inc(&stats.position_msgs);
        let snap = stats.snapshot();
        assert_eq!(snap.packets_received, 2);
        assert_eq!(snap.position_msgs, 1);
        assert_eq!(snap.invalid_packets, 0);
    }
}
