//! Generic HTTP-based LLM provider for OpenAI-compatible APIs.
//!
//! Talks directly to any `/chat/completions` endpoint. Azure OpenAI is handled
//! by the same client: the deployment goes into the URL path, the key into an
//! `api-key` header, and the version into the `api-version` query parameter.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, error, warn};

use routebot_core::config::LlmConfig;
use routebot_core::types::{
    ChatCompletionRequest, ChatCompletionResponse, LlmResponse, Message, ResponseFormat,
};

use crate::error::LlmError;
use crate::registry::{AuthStyle, ProviderSpec};
use crate::traits::{LlmProvider, LlmRequestConfig};

// ─────────────────────────────────────────────
// HttpProvider
// ─────────────────────────────────────────────

/// An LLM provider that talks to any OpenAI-compatible HTTP API.
pub struct HttpProvider {
    /// HTTP client (shared, connection-pooled).
    client: reqwest::Client,
    /// API base URL (e.g. `"https://api.openai.com/v1"`).
    api_base: String,
    api_key: String,
    /// Azure `api-version`.
    api_version: String,
    /// Default model (or Azure deployment) for this provider instance.
    default_model: String,
    /// Extra headers to send with each request.
    extra_headers: HeaderMap,
    spec: &'static ProviderSpec,
}

impl std::fmt::Debug for HttpProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProvider")
            .field("api_base", &self.api_base)
            .field("default_model", &self.default_model)
            .field("provider", &self.spec.display_name)
            .finish()
    }
}

impl HttpProvider {
    /// Create a new HttpProvider from the LLM config and a provider spec.
    pub fn new(config: &LlmConfig, spec: &'static ProviderSpec) -> Result<Self, LlmError> {
        // config > spec default > standard OpenAI path
        let api_base = config
            .api_base
            .clone()
            .filter(|b| !b.is_empty())
            .or_else(|| spec.default_api_base.map(String::from))
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        let mut extra_headers = HeaderMap::new();
        if let Some(ref headers) = config.extra_headers {
            for (key, value) in headers {
                if let (Ok(name), Ok(val)) = (
                    HeaderName::from_bytes(key.as_bytes()),
                    HeaderValue::from_str(value),
                ) {
                    extra_headers.insert(name, val);
                } else {
                    warn!("Invalid header: {}={}", key, value);
                }
            }
        }

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| LlmError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(HttpProvider {
            client,
            api_base,
            api_key: config.api_key.clone(),
            api_version: config.api_version.clone(),
            default_model: config.model.clone(),
            extra_headers,
            spec,
        })
    }

    /// Build the full chat completions URL for `model`.
    fn completions_url(&self, model: &str) -> String {
        let base = self.api_base.trim_end_matches('/');
        if self.spec.deployment_routing {
            format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                base, model, self.api_version
            )
        } else {
            format!("{}/chat/completions", base)
        }
    }

    fn build_body(
        &self,
        messages: &[Message],
        model: &str,
        config: &LlmRequestConfig,
    ) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: (!self.spec.deployment_routing).then(|| model.to_string()),
            messages: messages.to_vec(),
            max_tokens: Some(config.max_tokens),
            temperature: Some(config.temperature),
            response_format: config.json_mode.then(ResponseFormat::json_object),
        }
    }
}

#[async_trait]
impl LlmProvider for HttpProvider {
    async fn chat(
        &self,
        messages: &[Message],
        model: &str,
        config: &LlmRequestConfig,
    ) -> Result<LlmResponse, LlmError> {
        debug!(
            provider = self.spec.display_name,
            model = %model,
            messages = messages.len(),
            json_mode = config.json_mode,
            "Calling LLM"
        );

        let url = self.completions_url(model);
        let mut request = self
            .client
            .post(&url)
            .timeout(config.timeout)
            .headers(self.extra_headers.clone())
            .json(&self.build_body(messages, model, config));

        request = match self.spec.auth {
            AuthStyle::Bearer => request.bearer_auth(&self.api_key),
            AuthStyle::ApiKeyHeader => request.header("api-key", &self.api_key),
            AuthStyle::None if !self.api_key.is_empty() => request.bearer_auth(&self.api_key),
            AuthStyle::None => request,
        };

        let response = request.send().await.map_err(|e| {
            error!(provider = self.spec.display_name, error = %e, "HTTP request failed");
            LlmError::from_reqwest(e, config.timeout)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            error!(
                provider = self.spec.display_name,
                status = %status,
                body = %body,
                "API error"
            );
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let chat_resp = response
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|e| {
                error!(
                    provider = self.spec.display_name,
                    error = %e,
                    "Failed to parse LLM response"
                );
                match LlmError::from_reqwest(e, config.timeout) {
                    LlmError::Transport(msg) => LlmError::Decode(msg),
                    other => other,
                }
            })?;

        let llm_resp: LlmResponse = chat_resp.into();
        debug!(
            provider = self.spec.display_name,
            has_content = llm_resp.content.is_some(),
            finish_reason = llm_resp.finish_reason.as_deref().unwrap_or("?"),
            "LLM response received"
        );
        Ok(llm_resp)
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn display_name(&self) -> &str {
        self.spec.display_name
    }
}

// ─────────────────────────────────────────────
// Builder (convenience)
// ─────────────────────────────────────────────

/// Build an HttpProvider from the `llm` config section.
///
/// Unknown provider names with a recognisable base URL are auto-detected;
/// anything else is treated as a generic OpenAI-compatible endpoint.
pub fn create_provider(config: &LlmConfig) -> anyhow::Result<HttpProvider> {
    let spec = crate::registry::detect(&config.provider, config.api_base.as_deref())
        .or_else(|| {
            warn!(
                provider = %config.provider,
                "Unknown provider, treating it as OpenAI-compatible"
            );
            crate::registry::find_by_name("openai")
        })
        .context("provider registry has no OpenAI entry")?;

    debug!(
        provider = spec.display_name,
        model = %config.model,
        api_base = config.api_base.as_deref().unwrap_or("default"),
        "Creating LLM provider"
    );

    HttpProvider::new(config, spec)
        .with_context(|| format!("failed to create {} provider", spec.display_name))
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
