//! LLM Provider trait: the seam between the agent and any chat-completions backend.

use std::time::Duration;

use async_trait::async_trait;
use routebot_core::config::LlmConfig;
use routebot_core::types::{LlmResponse, Message};

use crate::error::LlmError;

/// Configuration passed to each LLM call.
#[derive(Clone, Debug)]
pub struct LlmRequestConfig {
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature (0.0 – 2.0).
    pub temperature: f64,
    /// Request `response_format: json_object`.
    pub json_mode: bool,
    /// Bound on the whole HTTP exchange.
    pub timeout: Duration,
}

impl Default for LlmRequestConfig {
    fn default() -> Self {
        Self {
            max_tokens: 1000,
            temperature: 0.1,
            json_mode: false,
            timeout: Duration::from_secs(30),
        }
    }
}

impl LlmRequestConfig {
    /// Settings for structured decision calls.
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            json_mode: config.json_mode,
            timeout: config.timeout(),
        }
    }

    /// Same bounds, free-text output.
    pub fn as_text(&self) -> Self {
        Self {
            json_mode: false,
            ..self.clone()
        }
    }
}

/// Trait that all LLM providers must implement.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a chat completion request.
    ///
    /// # Arguments
    /// * `messages`: conversation in OpenAI format.
    /// * `model`: model identifier, or deployment name for Azure.
    /// * `config`: temperature, max_tokens, output mode, timeout.
    ///
    /// Failures are returned as [`LlmError`] so callers can decide whether
    /// to retry.
    async fn chat(
        &self,
        messages: &[Message],
        model: &str,
        config: &LlmRequestConfig,
    ) -> Result<LlmResponse, LlmError>;

    /// The default model for this provider instance.
    fn default_model(&self) -> &str;

    /// Display name for logging.
    fn display_name(&self) -> &str;
}
