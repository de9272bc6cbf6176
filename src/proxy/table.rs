//! Active connection table
//!
//! Tracks every open client connection with its cancellation token and the
//! time it last relayed data. The idle sweep reads this table; workers own
//! a [`ConnectionGuard`] that removes their entry when dropped.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

struct Entry {
    peer: SocketAddr,
    token: CancellationToken,
    /// Milliseconds since the table epoch
    last_activity: Arc<AtomicU64>,
}

/// Concurrent map of open connections
pub struct ConnectionTable {
    epoch: Instant,
    next_id: AtomicU64,
    entries: Mutex<HashMap<u64, Entry>>,
}

impl Default for ConnectionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionTable {
    /// Create an empty table
    pub fn new() -> Self {
        ConnectionTable {
            epoch: Instant::now(),
            next_id: AtomicU64::new(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn millis_since_epoch(&self, at: Instant) -> u64 {
        at.saturating_duration_since(self.epoch).as_millis() as u64
    }

    /// Register a new connection whose token is a child of `parent`
    pub fn register(self: &Arc<Self>, peer: SocketAddr, parent: &CancellationToken) -> ConnectionGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = parent.child_token();
        let last_activity = Arc::new(AtomicU64::new(self.millis_since_epoch(Instant::now())));

        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(
                id,
                Entry {
                    peer,
                    token: token.clone(),
                    last_activity: last_activity.clone(),
                },
            );

        ConnectionGuard {
            id,
            peer,
            token,
            last_activity,
            table: Arc::clone(self),
        }
    }

    /// Remove an entry; returns whether it was present
    pub fn remove(&self, id: u64) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id)
            .is_some()
    }

    /// Cancel and remove every entry idle for longer than `max_idle` at `now`
    ///
    /// Returns the peers that were evicted.
    pub fn sweep_idle(&self, now: Instant, max_idle: Duration) -> Vec<SocketAddr> {
        let now_ms = self.millis_since_epoch(now);
        let max_ms = max_idle.as_millis() as u64;

        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let idle: Vec<u64> = entries
            .iter()
            .filter(|(_, entry)| {
                now_ms.saturating_sub(entry.last_activity.load(Ordering::Relaxed)) > max_ms
            })
            .map(|(id, _)| *id)
            .collect();

        idle.into_iter()
            .filter_map(|id| entries.remove(&id))
            .map(|entry| {
                entry.token.cancel();
                entry.peer
            })
            .collect()
    }

    /// Cancel and remove every entry; returns how many there were
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<Entry> = self
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
            .map(|(_, entry)| entry)
            .collect();

        for entry in &drained {
            entry.token.cancel();
        }
        drained.len()
    }

    /// Number of tracked connections
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether no connection is tracked
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle a worker holds for its table entry
///
/// Dropping the guard removes the entry.
pub struct ConnectionGuard {
    id: u64,
    peer: SocketAddr,
    token: CancellationToken,
    last_activity: Arc<AtomicU64>,
    table: Arc<ConnectionTable>,
}

impl ConnectionGuard {
    /// Table id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Client address
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Token cancelled on eviction or shutdown
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Record activity now
    pub fn touch(&self) {
        self.touch_at(Instant::now());
    }

    /// Record activity at `at`
    pub fn touch_at(&self, at: Instant) {
        self.last_activity
            .store(self.table.millis_since_epoch(at), Ordering::Relaxed);
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.table.remove(self.id);
    }
}
