//! Helper utilities for Sshtun
//!
//! Shared constants and the reconnect policy.

use std::time::Duration;

/// Default relay buffer size
pub const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;

/// Retry configuration for the SSH connect loop
///
/// The delay between attempts is fixed. `max_attempts` of `None` retries
/// until the caller cancels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of connect attempts
    pub max_attempts: Option<u32>,
    /// Delay between attempts
    pub delay: Duration,
}

impl RetryConfig {
    /// Create a new retry configuration
    pub fn new(max_attempts: Option<u32>, delay: Duration) -> Self {
        RetryConfig {
            max_attempts,
            delay,
        }
    }

    /// Whether another attempt may follow attempt number `attempt` (1-based)
    pub fn should_retry(&self, attempt: u32) -> bool {
        match self.max_attempts {
            Some(max) => attempt < max,
            None => true,
        }
    }
}
