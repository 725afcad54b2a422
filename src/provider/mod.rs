//! Language-model provider access with credential failover.

mod client;
mod credentials;
mod transport;

pub use client::{classify, AttemptOutcome, ProviderClient};
pub use credentials::{Credential, CredentialPool, API_KEYS_ENV, API_KEY_ENV_PREFIX};
pub use transport::{ChatRequest, HttpTransport, Transport, TransportError, TransportResponse};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// A successful completion.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    pub usage: Option<Usage>,
}

/// Errors surfaced by [`ProviderClient::complete`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Non-rotatable status or an unusable success response; rotation stopped
    #[error("provider request failed{}: {}", describe_status(*status), message)]
    Fatal {
        status: Option<u16>,
        message: String,
    },

    /// Every attempted credential failed transiently
    #[error("all credentials exhausted after {attempts} attempts")]
    Exhausted { attempts: usize },
}

fn describe_status(status: Option<u16>) -> String {
    status
        .map(|s| format!(" with status {}", s))
        .unwrap_or_default()
}

impl ProviderError {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, ProviderError::Exhausted { .. })
    }
}
