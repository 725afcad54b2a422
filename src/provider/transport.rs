//! HTTP boundary to the chat-completions endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::trace;

use super::credentials::Credential;
use crate::context::Message;
use crate::error::{ConciergeError, Result};

/// Request body for `/chat/completions`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [Message],
    pub max_completion_tokens: u32,
    pub temperature: f32,
    pub stream: bool,
}

/// Raw HTTP outcome; classification happens in the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// The endpoint could not be reached or did not answer in time.
#[derive(Error, Debug, Clone)]
#[error("transport failure (timeout: {timeout}): {message}")]
pub struct TransportError {
    pub message: String,
    pub timeout: bool,
}

/// Sends one request with one credential.
///
/// Implemented by [`HttpTransport`] in production and by fakes in tests.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        credential: &Credential,
        request: &ChatRequest<'_>,
    ) -> std::result::Result<TransportResponse, TransportError>;
}

/// `reqwest`-backed transport with a per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConciergeError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        Self {
            timeout: e.is_timeout(),
            message: e.to_string(),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        credential: &Credential,
        request: &ChatRequest<'_>,
    ) -> std::result::Result<TransportResponse, TransportError> {
        trace!(
            endpoint = %self.endpoint,
            model = request.model,
            messages = request.messages.len(),
            "Sending completion request"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(credential.secret())
            .json(request)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(TransportResponse { status, body })
    }
}
