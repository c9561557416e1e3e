use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of a session's traffic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NetworkStats {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    /// Datagrams that failed to decode or came from someone other than the peer.
    pub packets_dropped: u64,
    /// Datagrams deliberately not sent by the loss simulation.
    pub packets_simulated_lost: u64,
    /// Accepted frames that carried a list count above capacity.
    pub truncated_frames: u64,
    /// Events not queued because the event channel was full.
    pub events_dropped: u64,
    /// Round trip of the most recent heartbeat, if one has completed.
    pub rtt_ms: Option<u64>,
}

const NO_RTT: u64 = u64::MAX;

/// Counters shared by the session threads.
#[derive(Debug)]
pub(crate) struct StatsCounters {
    packets_sent: AtomicU64,
    packets_received: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    packets_dropped: AtomicU64,
    packets_simulated_lost: AtomicU64,
    truncated_frames: AtomicU64,
    events_dropped: AtomicU64,
    rtt_ms: AtomicU64,
}

impl Default for StatsCounters {
    fn default() -> Self {
        Self {
            packets_sent: AtomicU64::new(0),
            packets_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            packets_dropped: AtomicU64::new(0),
            packets_simulated_lost: AtomicU64::new(0),
            truncated_frames: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            rtt_ms: AtomicU64::new(NO_RTT),
        }
    }
}

impl StatsCounters {
    pub fn record_sent(&self, bytes: usize) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_received(&self, bytes: usize) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.packets_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_simulated_loss(&self) {
        self.packets_simulated_lost.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_truncated(&self) {
        self.truncated_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rtt(&self, rtt_ms: u64) {
        self.rtt_ms.store(rtt_ms.min(NO_RTT - 1), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> NetworkStats {
        let rtt = self.rtt_ms.load(Ordering::Relaxed);
        NetworkStats {
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            packets_dropped: self.packets_dropped.load(Ordering::Relaxed),
            packets_simulated_lost: self.packets_simulated_lost.load(Ordering::Relaxed),
            truncated_frames: self.truncated_frames.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            rtt_ms: (rtt != NO_RTT).then_some(rtt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters() {
        let stats = StatsCounters::default();
        assert_eq!(stats.snapshot(), NetworkStats::default());

        stats.record_sent(17);
        stats.record_sent(6);
        stats.record_received(14);
        stats.record_dropped();
        stats.record_rtt(3);

        let snap = stats.snapshot();
        assert_eq!(snap.packets_sent, 2);
        assert_eq!(snap.bytes_sent, 23);
        assert_eq!(snap.packets_received, 1);
        assert_eq!(snap.bytes_received, 14);
        assert_eq!(snap.packets_dropped, 1);
        assert_eq!(snap.rtt_ms, Some(3));
    }
}
