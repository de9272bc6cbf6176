//! In-memory tunnel counters

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Statistics for one running tunnel
#[derive(Debug, Default)]
pub struct TunnelStats {
    /// Client connections accepted
    pub accepted: AtomicU64,
    /// Connections currently open
    pub active: AtomicUsize,
    /// Clients dropped during handshake or request parsing
    pub failed_handshakes: AtomicU64,
    /// Direct channels the session could not open
    pub channel_failures: AtomicU64,
    /// Connections evicted for inactivity
    pub evicted_idle: AtomicU64,
    /// Bytes relayed in both directions
    pub bytes_relayed: AtomicU64,
}

impl TunnelStats {
    /// Create new tunnel stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an accepted client
    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a client connection ending
    pub fn record_closed(&self) {
        // Saturating so a stray double close cannot wrap the gauge.
        let _ = self
            .active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    /// Record a handshake or request failure
    pub fn record_failed_handshake(&self) {
        self.failed_handshakes.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a channel open failure
    pub fn record_channel_failure(&self) {
        self.channel_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record idle evictions
    pub fn record_evicted(&self, count: usize) {
        self.evicted_idle.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Get current stats snapshot
    pub fn snapshot(&self) -> TunnelStatsSnapshot {
        TunnelStatsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Relaxed),
            failed_handshakes: self.failed_handshakes.load(Ordering::Relaxed),
            channel_failures: self.channel_failures.load(Ordering::Relaxed),
            evicted_idle: self.evicted_idle.load(Ordering::Relaxed),
            bytes_relayed: self.bytes_relayed.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of tunnel statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct TunnelStatsSnapshot {
    pub accepted: u64,
    pub active: usize,
    pub failed_handshakes: u64,
    pub channel_failures: u64,
    pub evicted_idle: u64,
    pub bytes_relayed: u64,
}
