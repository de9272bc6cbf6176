//! User-facing event log
//!
//! The log sink is the append-only history a front end renders as a live
//! list of lines. Every entry is also forwarded to `tracing`, so the same
//! events reach the process log without a second call site.

use chrono::{DateTime, Local};
use std::fmt;
use std::sync::RwLock;
use tokio::sync::broadcast;

/// Capacity of the live subscription channel
const LIVE_CHANNEL_CAPACITY: usize = 256;

/// Severity attached to a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Unclassified message
    #[default]
    None,
    /// Debugging detail
    Debug,
    /// Normal lifecycle event
    Info,
    /// Recoverable problem
    Warn,
    /// Failure
    Error,
}

impl LogLevel {
    /// Upper-case name used in the rendered line
    pub fn name(self) -> &'static str {
        match self {
            LogLevel::None => "NONE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

/// A single timestamped entry
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Local wall-clock time the entry was added
    pub timestamp: DateTime<Local>,
    /// Severity
    pub level: LogLevel,
    /// Message text
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] [{}] {}",
            self.timestamp.format("%H:%M:%S"),
            self.level.name(),
            self.message
        )
    }
}

/// Ordered, append-only log shared by every component of a tunnel
#[derive(Debug)]
pub struct LogSink {
    entries: RwLock<Vec<LogEntry>>,
    live: broadcast::Sender<LogEntry>,
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new()
    }
}

impl LogSink {
    /// Create an empty sink
    pub fn new() -> Self {
        let (live, _) = broadcast::channel(LIVE_CHANNEL_CAPACITY);
        LogSink {
            entries: RwLock::new(Vec::new()),
            live,
        }
    }

    /// Append an entry
    pub fn add_log(&self, message: impl Into<String>, level: LogLevel) {
        let entry = LogEntry {
            timestamp: Local::now(),
            level,
            message: message.into(),
        };

        match level {
            LogLevel::Error => tracing::error!(target: "sshtun::events", "{}", entry.message),
            LogLevel::Warn => tracing::warn!(target: "sshtun::events", "{}", entry.message),
            LogLevel::Debug => tracing::debug!(target: "sshtun::events", "{}", entry.message),
            LogLevel::Info | LogLevel::None => {
                tracing::info!(target: "sshtun::events", "{}", entry.message)
            }
        }

        // The write lock also orders the broadcast, so subscribers see the
        // same sequence as `logs()`.
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.push(entry.clone());
        let _ = self.live.send(entry);
    }

    /// Shorthand for an `Info` entry
    pub fn info(&self, message: impl Into<String>) {
        self.add_log(message, LogLevel::Info);
    }

    /// Shorthand for a `Warn` entry
    pub fn warn(&self, message: impl Into<String>) {
        self.add_log(message, LogLevel::Warn);
    }

    /// Shorthand for an `Error` entry
    pub fn error(&self, message: impl Into<String>) {
        self.add_log(message, LogLevel::Error);
    }

    /// Rendered lines in insertion order
    pub fn logs(&self) -> Vec<String> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    /// Raw entries in insertion order
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether the sink holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop the stored history
    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Receive entries added from now on
    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.live.subscribe()
    }

    /// Whether any stored message contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|e| e.message.contains(needle))
    }
}
