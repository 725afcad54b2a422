//! Input policy: sanitizing, injection screening and per-client rate limits.

mod entry;
mod injection;
mod limiter;
mod sanitize;

pub use entry::RateLimitEntry;
pub use injection::{is_injection_attempt, matched_categories, InjectionCategory};
pub use limiter::{run_sweeper, RateLimitDecision, RateLimitReason, RateLimiter};
pub use sanitize::{sanitize, strip_tags};
