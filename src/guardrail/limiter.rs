//! Dual-criteria rate limiter: minimum spacing plus a per-window cap.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

use super::entry::RateLimitEntry;
use crate::config::GuardrailConfig;

/// Why a message was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateLimitReason {
    /// Sent sooner than the minimum spacing after the previous message
    #[serde(rename = "too_fast")]
    TooFast,
    /// The per-window message cap is used up
    #[serde(rename = "rate_limit")]
    WindowExceeded,
}

impl fmt::Display for RateLimitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitReason::TooFast => write!(f, "too_fast"),
            RateLimitReason::WindowExceeded => write!(f, "rate_limit"),
        }
    }
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Denied(RateLimitReason),
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed)
    }
}

/// Per-client rate limiter.
///
/// The table is sharded by `DashMap`; holding the entry guard for the whole
/// check makes the read-modify-write for one client atomic with respect to
/// concurrent requests from the same client.
pub struct RateLimiter {
    /// Rate limit entries indexed by opaque client id
    entries: DashMap<String, RateLimitEntry>,
    /// Maximum accepted messages per window
    max_per_window: u32,
    /// Window length
    window: Duration,
    /// Minimum time between two accepted messages
    min_spacing: Duration,
}

impl RateLimiter {
    /// Create a new rate limiter.
    pub fn new(max_per_window: u32, window: Duration, min_spacing: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            max_per_window,
            window,
            min_spacing,
        }
    }

    pub fn from_config(config: &GuardrailConfig) -> Self {
        Self::new(
            config.max_messages_per_window,
            config.window(),
            config.min_spacing(),
        )
    }

    /// Check and record a message from `client_id` arriving now.
    pub fn check(&self, client_id: &str) -> RateLimitDecision {
        self.check_at(client_id, Instant::now())
    }

    /// Check and record a message from `client_id` arriving at `now`.
    ///
    /// The spacing check runs before the count check. Denied messages leave
    /// the entry untouched.
    pub fn check_at(&self, client_id: &str, now: Instant) -> RateLimitDecision {
        let mut occupied = match self.entries.entry(client_id.to_string()) {
            Entry::Vacant(vacant) => {
                debug!(client = %client_id, "Opening rate limit window for new client");
                vacant.insert(RateLimitEntry::open(now, self.window));
                return RateLimitDecision::Allowed;
            }
            Entry::Occupied(occupied) => occupied,
        };
        let entry = occupied.get_mut();

        if entry.is_expired(now) {
            trace!(client = %client_id, "Rate limit window elapsed, opening a new one");
            *entry = RateLimitEntry::open(now, self.window);
            return RateLimitDecision::Allowed;
        }

        if entry.since_last_message(now) < self.min_spacing {
            debug!(
                client = %client_id,
                since_last_ms = entry.since_last_message(now).as_millis() as u64,
                "Message sent too fast"
            );
            return RateLimitDecision::Denied(RateLimitReason::TooFast);
        }

        if entry.count >= self.max_per_window {
            debug!(
                client = %client_id,
                count = entry.count,
                reset_in_secs = entry.duration_until_reset(now).as_secs(),
                "Rate limit window exhausted"
            );
            return RateLimitDecision::Denied(RateLimitReason::WindowExceeded);
        }

        entry.count += 1;
        entry.last_message_at = now;
        trace!(client = %client_id, count = entry.count, "Message within rate limit");
        RateLimitDecision::Allowed
    }

    /// Get a copy of the entry for a client.
    ///
    /// Returns `None` if the client has never been seen (or was purged).
    pub fn entry(&self, client_id: &str) -> Option<RateLimitEntry> {
        self.entries.get(client_id).map(|e| *e)
    }

    /// Drop entries whose window closed before `now`. Returns how many were removed.
    pub fn purge_expired(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Get the number of tracked clients.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

/// Periodically drop rate limit entries for clients whose window closed.
pub async fn run_sweeper(limiter: Arc<RateLimiter>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    info!(interval_secs = every.as_secs(), "Rate limit sweeper started");

    loop {
        interval.tick().await;
        let removed = limiter.purge_expired(Instant::now());
        if removed > 0 {
            debug!(
                removed,
                remaining = limiter.entry_count(),
                "Purged expired rate limit entries"
            );
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::from_config(&GuardrailConfig::default())
    }
}
