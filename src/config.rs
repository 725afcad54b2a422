//! Configuration management for Concierge.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::error::{ConciergeError, Result};

/// Prefix for environment overrides, e.g. `CONCIERGE__PROVIDER__MODEL`.
const ENV_PREFIX: &str = "CONCIERGE";

/// Main configuration for the Concierge service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConciergeConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Chat request shaping
    #[serde(default)]
    pub chat: ChatConfig,

    /// Abuse and rate limiting policy
    #[serde(default)]
    pub guardrail: GuardrailConfig,

    /// Prompt token budgets
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Upstream language-model provider
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Knowledge base and instructions sources
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Reverse proxies in front of the service that append to `X-Forwarded-For`.
    /// Zero ignores the header and keys clients on the peer address.
    #[serde(default = "default_trusted_proxy_hops")]
    pub trusted_proxy_hops: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            trusted_proxy_hops: default_trusted_proxy_hops(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_trusted_proxy_hops() -> usize {
    1
}

/// Parameters applied to every completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Maximum completion tokens requested from the provider
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Most recent history entries considered before budgeting
    #[serde(default = "default_max_history_turns")]
    pub max_history_turns: usize,

    /// Maximum characters kept from a visitor message
    #[serde(default = "default_max_input_length")]
    pub max_input_length: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            max_history_turns: default_max_history_turns(),
            max_input_length: default_max_input_length(),
        }
    }
}

fn default_max_tokens() -> u32 {
    512
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_history_turns() -> usize {
    10
}

fn default_max_input_length() -> usize {
    500
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailConfig {
    /// Messages a client may send per window
    #[serde(default = "default_max_messages_per_window")]
    pub max_messages_per_window: u32,

    /// Window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Minimum spacing between two messages from one client, in milliseconds
    #[serde(default = "default_min_spacing_ms")]
    pub min_spacing_ms: u64,

    /// How often expired rate limit entries are purged, in seconds
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl GuardrailConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn min_spacing(&self) -> Duration {
        Duration::from_millis(self.min_spacing_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            max_messages_per_window: default_max_messages_per_window(),
            window_secs: default_window_secs(),
            min_spacing_ms: default_min_spacing_ms(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_max_messages_per_window() -> u32 {
    10
}

fn default_window_secs() -> u64 {
    60
}

fn default_min_spacing_ms() -> u64 {
    1500
}

fn default_sweep_interval_secs() -> u64 {
    300
}

/// Token budgets for prompt assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Ceiling for the whole assembled prompt
    #[serde(default = "default_total_tokens")]
    pub total_tokens: usize,

    /// Sub-budget for the compressed knowledge base
    #[serde(default = "default_knowledge_base_tokens")]
    pub knowledge_base_tokens: usize,

    /// Tokens held back from the history budget
    #[serde(default = "default_safety_margin_tokens")]
    pub safety_margin_tokens: usize,

    /// Formatting cost charged per message
    #[serde(default = "default_message_overhead_tokens")]
    pub message_overhead_tokens: usize,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            total_tokens: default_total_tokens(),
            knowledge_base_tokens: default_knowledge_base_tokens(),
            safety_margin_tokens: default_safety_margin_tokens(),
            message_overhead_tokens: default_message_overhead_tokens(),
        }
    }
}

fn default_total_tokens() -> usize {
    8000
}

fn default_knowledge_base_tokens() -> usize {
    4000
}

fn default_safety_margin_tokens() -> usize {
    100
}

fn default_message_overhead_tokens() -> usize {
    4
}

/// Upstream provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Chat completions endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Model identifier sent with each request
    #[serde(default = "default_model")]
    pub model: String,

    /// Status codes that rotate to the next credential
    #[serde(default = "default_rotatable_statuses")]
    pub rotatable_statuses: Vec<u16>,

    /// Upper bound on credentials tried per request
    #[serde(default = "default_max_rotation_attempts")]
    pub max_rotation_attempts: usize,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl ProviderConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            rotatable_statuses: default_rotatable_statuses(),
            max_rotation_attempts: default_max_rotation_attempts(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_endpoint() -> String {
    "https://api.groq.com/openai/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}

fn default_rotatable_statuses() -> Vec<u16> {
    vec![429, 402, 503]
}

fn default_max_rotation_attempts() -> usize {
    3
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Knowledge base and instructions sources.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// Path to the knowledge base document (sections separated by `---`)
    pub path: Option<String>,

    /// Path to a file replacing the built-in system instructions
    pub instructions_path: Option<String>,
}

impl ConciergeConfig {
    /// Load configuration from an optional YAML file, overlaid with
    /// `CONCIERGE__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path).format(config::FileFormat::Yaml),
            );
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("provider.rotatable_statuses"),
        );

        let config: ConciergeConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ConciergeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ConciergeConfig = serde_yaml::from_str(yaml)
            .map_err(|e| ConciergeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot operate with.
    pub fn validate(&self) -> Result<()> {
        let budget = &self.budget;
        if budget.total_tokens == 0 || budget.knowledge_base_tokens == 0 {
            return Err(ConciergeError::Config(
                "token budgets must be greater than zero".to_string(),
            ));
        }
        if budget.knowledge_base_tokens >= budget.total_tokens {
            return Err(ConciergeError::Config(format!(
                "knowledge base budget ({}) must be below the total budget ({})",
                budget.knowledge_base_tokens, budget.total_tokens
            )));
        }
        if self.provider.max_rotation_attempts == 0 {
            return Err(ConciergeError::Config(
                "max_rotation_attempts must be at least 1".to_string(),
            ));
        }
        if self.guardrail.window_secs == 0 || self.guardrail.max_messages_per_window == 0 {
            return Err(ConciergeError::Config(
                "rate limit window and message cap must be greater than zero".to_string(),
            ));
        }
        if self.chat.max_input_length == 0 {
            return Err(ConciergeError::Config(
                "max_input_length must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
