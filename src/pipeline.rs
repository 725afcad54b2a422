//! Request orchestration: guardrails, context, provider, result.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::{ChatConfig, ConciergeConfig};
use crate::context::{ContextBuilder, KnowledgeBase, Message};
use crate::error::{ConciergeError, Result};
use crate::guardrail::{
    is_injection_attempt, matched_categories, sanitize, strip_tags, RateLimitDecision,
    RateLimitReason, RateLimiter,
};
use crate::provider::{Completion, CredentialPool, ProviderClient, Transport, Usage};

/// User-facing failure categories. Each maps to one fixed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The request body could not be read
    InvalidRequest,
    EmptyInput,
    TooFast,
    RateLimited,
    OffTopic,
    Unavailable,
    Failed,
}

impl FailureKind {
    pub fn message(&self) -> &'static str {
        match self {
            FailureKind::InvalidRequest => {
                "Sorry, that request could not be read. Please try again."
            }
            FailureKind::EmptyInput => "Please enter a message.",
            FailureKind::TooFast => {
                "You're sending messages too quickly. Please wait a moment and try again."
            }
            FailureKind::RateLimited => {
                "You've reached the message limit for now. Please try again in a minute."
            }
            FailureKind::OffTopic => {
                "I can only help with questions about this portfolio, the projects and experience shown here."
            }
            FailureKind::Unavailable => {
                "The assistant is temporarily unavailable. Please try again later."
            }
            FailureKind::Failed => "Something went wrong. Please try again.",
        }
    }
}

impl From<&ConciergeError> for FailureKind {
    fn from(err: &ConciergeError) -> Self {
        match err {
            ConciergeError::EmptyInput => FailureKind::EmptyInput,
            ConciergeError::RateLimited(RateLimitReason::TooFast) => FailureKind::TooFast,
            ConciergeError::RateLimited(RateLimitReason::WindowExceeded) => FailureKind::RateLimited,
            ConciergeError::PolicyViolation => FailureKind::OffTopic,
            ConciergeError::Provider(e) if e.is_exhausted() => FailureKind::Unavailable,
            _ => FailureKind::Failed,
        }
    }
}

/// Outcome of one chat request, safe to return to a visitor.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(into = "ChatReply")]
pub enum ChatResult {
    Success {
        message: String,
        usage: Option<Usage>,
    },
    Failure {
        kind: FailureKind,
    },
}

impl ChatResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ChatResult::Success { .. })
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            ChatResult::Failure { kind } => Some(*kind),
            ChatResult::Success { .. } => None,
        }
    }

    /// Assistant text on success, the fixed failure message otherwise.
    pub fn text(&self) -> &str {
        match self {
            ChatResult::Success { message, .. } => message,
            ChatResult::Failure { kind } => kind.message(),
        }
    }
}

impl From<Completion> for ChatResult {
    fn from(completion: Completion) -> Self {
        ChatResult::Success {
            message: completion.content,
            usage: completion.usage,
        }
    }
}

/// Wire shape: `{success: true, message, usage?}` or `{success: false, error}`.
#[derive(Debug, Serialize)]
struct ChatReply {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    usage: Option<Usage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'static str>,
}

impl From<ChatResult> for ChatReply {
    fn from(result: ChatResult) -> Self {
        match result {
            ChatResult::Success { message, usage } => ChatReply {
                success: true,
                message: Some(message),
                usage,
                error: None,
            },
            ChatResult::Failure { kind } => ChatReply {
                success: false,
                message: None,
                usage: None,
                error: Some(kind.message()),
            },
        }
    }
}

/// Runs one visitor message through the whole pipeline.
pub struct ChatPipeline {
    limiter: Arc<RateLimiter>,
    builder: ContextBuilder,
    provider: ProviderClient,
    chat: ChatConfig,
}

impl ChatPipeline {
    pub fn new(
        limiter: Arc<RateLimiter>,
        builder: ContextBuilder,
        provider: ProviderClient,
        chat: ChatConfig,
    ) -> Self {
        Self {
            limiter,
            builder,
            provider,
            chat,
        }
    }

    /// Wire every component from configuration.
    pub fn from_config(
        config: &ConciergeConfig,
        instructions: &str,
        knowledge: &KnowledgeBase,
        transport: Arc<dyn Transport>,
        pool: CredentialPool,
    ) -> Self {
        let limiter = Arc::new(RateLimiter::from_config(&config.guardrail));
        let builder = ContextBuilder::new(
            instructions,
            knowledge,
            config.budget.clone(),
            config.chat.max_history_turns,
        );
        let provider = ProviderClient::new(transport, pool, &config.provider);
        info!("Chat pipeline initialized");
        Self::new(limiter, builder, provider, config.chat.clone())
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn provider(&self) -> &ProviderClient {
        &self.provider
    }

    /// Process a visitor message. Never fails; errors become [`ChatResult::Failure`].
    #[instrument(skip_all, fields(request_id = %Uuid::new_v4(), client = %client_id))]
    pub async fn process_message(
        &self,
        message: &str,
        history: &[Message],
        client_id: &str,
    ) -> ChatResult {
        match self.run(message, history, client_id).await {
            Ok(completion) => {
                debug!(chars = completion.content.len(), "Chat request answered");
                completion.into()
            }
            Err(err) => {
                let kind = FailureKind::from(&err);
                match &err {
                    ConciergeError::Provider(_) | ConciergeError::Config(_) | ConciergeError::Io(_) => {
                        warn!(error = %err, kind = ?kind, "Chat request failed")
                    }
                    _ => debug!(error = %err, kind = ?kind, "Chat request refused"),
                }
                ChatResult::Failure { kind }
            }
        }
    }

    async fn run(&self, message: &str, history: &[Message], client_id: &str) -> Result<Completion> {
        let text = sanitize(message, self.chat.max_input_length);
        if text.is_empty() {
            return Err(ConciergeError::EmptyInput);
        }

        if let RateLimitDecision::Denied(reason) = self.limiter.check(client_id) {
            return Err(ConciergeError::RateLimited(reason));
        }

        if is_injection_attempt(&text) {
            let categories: Vec<&str> = matched_categories(&text)
                .iter()
                .map(|c| c.as_str())
                .collect();
            warn!(categories = ?categories, "Message matched injection denylist");
            return Err(ConciergeError::PolicyViolation);
        }

        let history = clean_history(history);
        let messages = self.builder.build(&text, &history);
        let completion = self
            .provider
            .complete(&messages, self.chat.max_tokens, self.chat.temperature)
            .await?;
        Ok(completion)
    }
}

/// Strip markup from client-supplied history, dropping entries left empty.
fn clean_history(history: &[Message]) -> Vec<Message> {
    history
        .iter()
        .filter_map(|m| {
            let content = strip_tags(&m.content);
            (!content.is_empty()).then(|| Message::new(m.role, content))
        })
        .collect()
}
