//! Per-client rate limit record.

use std::time::{Duration, Instant};

/// Tracks one client's messages inside the current window.
///
/// Entries are replaced, not deleted, when their window closes; the sweeper
/// only reclaims memory for clients that went quiet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    /// Messages accepted in the current window
    pub count: u32,
    /// When the current window closes
    pub reset_at: Instant,
    /// When the most recent accepted message arrived
    pub last_message_at: Instant,
}

impl RateLimitEntry {
    /// Open a new window starting at `now` with one accepted message.
    pub fn open(now: Instant, window: Duration) -> Self {
        Self {
            count: 1,
            reset_at: now + window,
            last_message_at: now,
        }
    }

    /// Whether the window has closed at `now`.
    pub fn is_expired(&self, now: Instant) -> bool {
        now > self.reset_at
    }

    /// Time elapsed since the last accepted message.
    pub fn since_last_message(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_message_at)
    }

    /// Get the duration until the current window resets.
    pub fn duration_until_reset(&self, now: Instant) -> Duration {
        self.reset_at.saturating_duration_since(now)
    }
}
