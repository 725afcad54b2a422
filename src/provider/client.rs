//! Completion client that rotates across credentials on transient failure.

use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::credentials::CredentialPool;
use super::transport::{ChatRequest, Transport, TransportResponse};
use super::{Completion, ProviderError, Usage};
use crate::config::ProviderConfig;
use crate::context::Message;

/// Longest slice of a response body written to logs.
const LOG_BODY_CHARS: usize = 200;

/// What one attempt with one credential produced.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    /// Usable completion
    Success(Completion),
    /// Transient for this credential; try the next one. `None` for transport failures.
    Rotatable { status: Option<u16> },
    /// Stop rotating and surface the error
    Fatal(ProviderError),
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Classify an HTTP response.
///
/// Statuses in `rotatable` are transient for the credential that got them.
/// Any other non-2xx status is fatal, as is a 2xx without usable content.
pub fn classify(response: &TransportResponse, rotatable: &[u16]) -> AttemptOutcome {
    let status = response.status;

    if !(200..300).contains(&status) {
        if rotatable.contains(&status) {
            return AttemptOutcome::Rotatable {
                status: Some(status),
            };
        }
        return AttemptOutcome::Fatal(ProviderError::Fatal {
            status: Some(status),
            message: truncate(&response.body, LOG_BODY_CHARS),
        });
    }

    let parsed: ChatCompletionResponse = match serde_json::from_str(&response.body) {
        Ok(parsed) => parsed,
        Err(e) => {
            return AttemptOutcome::Fatal(ProviderError::Fatal {
                status: Some(status),
                message: format!("malformed response body: {}", e),
            })
        }
    };

    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    match content {
        Some(content) => AttemptOutcome::Success(Completion {
            content,
            usage: parsed.usage,
        }),
        None => AttemptOutcome::Fatal(ProviderError::Fatal {
            status: Some(status),
            message: "empty or missing completion content".to_string(),
        }),
    }
}

/// Sends completion requests, failing over across a [`CredentialPool`].
pub struct ProviderClient {
    transport: Arc<dyn Transport>,
    pool: CredentialPool,
    model: String,
    rotatable_statuses: Vec<u16>,
    max_attempts: usize,
}

impl ProviderClient {
    pub fn new(transport: Arc<dyn Transport>, pool: CredentialPool, config: &ProviderConfig) -> Self {
        info!(
            model = %config.model,
            credentials = pool.len(),
            max_attempts = config.max_rotation_attempts,
            rotatable = ?config.rotatable_statuses,
            "Provider client initialized"
        );

        Self {
            transport,
            pool,
            model: config.model.clone(),
            rotatable_statuses: config.rotatable_statuses.clone(),
            max_attempts: config.max_rotation_attempts,
        }
    }

    pub fn pool(&self) -> &CredentialPool {
        &self.pool
    }

    /// Request a completion for `messages`.
    ///
    /// Tries up to `min(credentials, max_attempts)` credentials starting at the
    /// shared cursor. Rotatable failures move on silently; a fatal one aborts.
    /// On success the cursor moves one past the credential that answered.
    pub async fn complete(
        &self,
        messages: &[Message],
        max_tokens: u32,
        temperature: f32,
    ) -> Result<Completion, ProviderError> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            max_completion_tokens: max_tokens,
            temperature,
            stream: false,
        };

        let attempts = self.pool.len().min(self.max_attempts);
        let start = self.pool.cursor();

        for attempt in 0..attempts {
            let (idx, credential) = self.pool.select(start, attempt);

            let outcome = match self.transport.send(credential, &request).await {
                Ok(response) => {
                    let outcome = classify(&response, &self.rotatable_statuses);
                    if let AttemptOutcome::Rotatable { status } = &outcome {
                        warn!(
                            credential = idx,
                            attempt,
                            status = ?status,
                            body = %truncate(&response.body, LOG_BODY_CHARS),
                            "Provider credential exhausted, rotating"
                        );
                    }
                    outcome
                }
                Err(e) => {
                    warn!(
                        credential = idx,
                        attempt,
                        timeout = e.timeout,
                        error = %e.message,
                        "Provider unreachable, rotating"
                    );
                    AttemptOutcome::Rotatable { status: None }
                }
            };

            match outcome {
                AttemptOutcome::Success(completion) => {
                    self.pool.advance_past(idx);
                    debug!(
                        credential = idx,
                        attempt,
                        usage = ?completion.usage,
                        "Provider request succeeded"
                    );
                    return Ok(completion);
                }
                AttemptOutcome::Rotatable { .. } => continue,
                AttemptOutcome::Fatal(err) => {
                    error!(credential = idx, attempt, error = %err, "Provider request failed");
                    return Err(err);
                }
            }
        }

        error!(attempts, "All provider credentials exhausted");
        Err(ProviderError::Exhausted { attempts })
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
