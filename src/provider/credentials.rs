//! Provider credentials and the shared round-robin cursor.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

use crate::error::{ConciergeError, Result};

/// Comma-separated list of API keys.
pub const API_KEYS_ENV: &str = "CONCIERGE_API_KEYS";
/// Prefix for numbered keys: `CONCIERGE_API_KEY_1`, `CONCIERGE_API_KEY_2`, ...
pub const API_KEY_ENV_PREFIX: &str = "CONCIERGE_API_KEY_";

/// A single bearer token. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Ordered credentials fixed at startup plus a round-robin cursor.
///
/// The cursor is read at the start of a call and moved after a success. The
/// read and the later write are not linearizable; under contention two calls
/// may start on the same credential, which is acceptable for load spreading.
pub struct CredentialPool {
    credentials: Vec<Credential>,
    cursor: AtomicUsize,
}

impl CredentialPool {
    /// Create a pool. At least one credential is required.
    pub fn new(credentials: Vec<Credential>) -> Result<Self> {
        if credentials.is_empty() {
            return Err(ConciergeError::Config(
                "no provider credentials configured".to_string(),
            ));
        }
        Ok(Self {
            credentials,
            cursor: AtomicUsize::new(0),
        })
    }

    /// Load credentials from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load credentials through `lookup`: the comma-separated list first,
    /// then numbered keys from 1 until the first gap.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut credentials: Vec<Credential> = Vec::new();
        let mut push = |raw: &str| {
            let key = raw.trim();
            if !key.is_empty() && !credentials.iter().any(|c| c.secret() == key) {
                credentials.push(Credential::new(key));
            }
        };

        if let Some(list) = lookup(API_KEYS_ENV) {
            list.split(',').for_each(&mut push);
        }
        for n in 1.. {
            match lookup(&format!("{}{}", API_KEY_ENV_PREFIX, n)) {
                Some(key) => push(&key),
                None => break,
            }
        }

        let pool = Self::new(credentials)?;
        info!(credentials = pool.len(), "Provider credentials loaded");
        Ok(pool)
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    /// Index the next call starts from.
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Relaxed) % self.credentials.len()
    }

    /// Credential at `cursor + offset`, wrapping, with its index.
    pub fn select(&self, start: usize, offset: usize) -> (usize, &Credential) {
        let idx = (start + offset) % self.credentials.len();
        (idx, &self.credentials[idx])
    }

    /// Point the cursor one past the credential that just succeeded.
    pub fn advance_past(&self, idx: usize) {
        let next = (idx + 1) % self.credentials.len();
        self.cursor.store(next, Ordering::Relaxed);
    }
}

impl fmt::Debug for CredentialPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPool")
            .field("credentials", &self.credentials.len())
            .field("cursor", &self.cursor())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn pool(n: usize) -> CredentialPool {
        CredentialPool::new((0..n).map(|i| Credential::new(format!("key-{}", i))).collect()).unwrap()
    }

    #[test]
    fn test_empty_pool_is_config_error() {
        let err = CredentialPool::new(Vec::new()).unwrap_err();
        assert!(matches!(err, ConciergeError::Config(_)));
    }

    #[test]
    fn test_select_wraps() {
        let pool = pool(3);
        assert_eq!(pool.select(2, 0).0, 2);
        assert_eq!(pool.select(2, 1).0, 0);
        assert_eq!(pool.select(2, 2).0, 1);
    }

    #[test]
    fn test_advance_past_wraps() {
        let pool = pool(3);
        pool.advance_past(1);
        assert_eq!(pool.cursor(), 2);
        pool.advance_past(2);
        assert_eq!(pool.cursor(), 0);
    }

    #[test]
    fn test_debug_never_shows_secret() {
        let credential = Credential::new("sk-very-secret");
        assert!(!format!("{:?}", credential).contains("sk-very-secret"));
        assert!(!format!("{:?}", pool(2)).contains("key-0"));
    }

    #[test]
    fn test_from_lookup_merges_sources() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("CONCIERGE_API_KEYS", "a, b,,a"),
            ("CONCIERGE_API_KEY_1", "c"),
            ("CONCIERGE_API_KEY_2", "b"),
            ("CONCIERGE_API_KEY_4", "skipped"),
        ]);

        let pool = CredentialPool::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();

        let secrets: Vec<&str> = (0..pool.len()).map(|i| pool.select(0, i).1.secret()).collect();
        assert_eq!(secrets, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_from_lookup_without_keys_fails() {
        let result = CredentialPool::from_lookup(|_| None);
        assert!(matches!(result, Err(ConciergeError::Config(_))));
    }
}
