//! Configuration schema.
//!
//! Hierarchy: `Config` → `LlmConfig`, `servers: Vec<ServerConfig>`,
//! `RemoteConfig`, `IntentConfig`, `SessionsConfig`.
//!
//! JSON on disk uses **camelCase** keys; Rust uses snake_case.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Fatal startup errors. Nothing else aborts the process.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("missing LLM credentials: {0}")]
    MissingCredentials(String),

    #[error("no remote servers configured (set `servers` or MCP_SERVER_URL)")]
    NoServers,

    #[error("server `{name}` has a malformed URL `{url}`: {reason}")]
    InvalidServerUrl {
        name: String,
        url: String,
        reason: String,
    },

    #[error("server name `{0}` is configured more than once")]
    DuplicateServer(String),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

// ─────────────────────────────────────────────
// Root Config
// ─────────────────────────────────────────────

/// Root configuration, loaded from `~/.routebot/config.json` + env vars.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub llm: LlmConfig,
    pub servers: Vec<ServerConfig>,
    pub remote: RemoteConfig,
    pub intent: IntentConfig,
    pub sessions: SessionsConfig,
}

impl Config {
    /// Check everything the process needs before it can serve a turn.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.llm.validate()?;

        if self.servers.is_empty() {
            return Err(ConfigError::NoServers);
        }
        let mut seen = std::collections::HashSet::new();
        for server in &self.servers {
            if !seen.insert(server.name.as_str()) {
                return Err(ConfigError::DuplicateServer(server.name.clone()));
            }
            server.validate()?;
        }

        if !(0.0..=1.0).contains(&self.intent.confidence_threshold) {
            return Err(ConfigError::InvalidValue {
                field: "intent.confidenceThreshold",
                reason: format!("{} is outside [0, 1]", self.intent.confidence_threshold),
            });
        }
        if self.sessions.capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "sessions.capacity",
                reason: "must be at least 1".into(),
            });
        }
        if self.remote.attempt_timeout_secs == 0 || self.remote.invoke_deadline_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "remote",
                reason: "timeouts must be positive".into(),
            });
        }
        let budget = self.remote.retry_budget();
        if self.remote.invoke_deadline() < budget {
            return Err(ConfigError::InvalidValue {
                field: "remote.invokeDeadlineSecs",
                reason: format!(
                    "{}s cannot fit {} attempts of {}s plus backoff and one reconnect ({:.1}s)",
                    self.remote.invoke_deadline_secs,
                    self.remote.retry.max_attempts(),
                    self.remote.attempt_timeout_secs,
                    budget.as_secs_f64()
                ),
            });
        }
        if self.sessions.max_turns == 0 {
            return Err(ConfigError::InvalidValue {
                field: "sessions.maxTurns",
                reason: "must be at least 1".into(),
            });
        }
        if self.llm.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "llm.timeoutSecs",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────
// LLM
// ─────────────────────────────────────────────

/// LLM endpoint, credentials, and call policy.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LlmConfig {
    /// Provider name (`openai`, `azure`, `openrouter`, `vllm`, ...).
    pub provider: String,
    #[serde(default)]
    pub api_key: String,
    /// Custom API base URL; the Azure resource endpoint for `azure`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    /// Model name, or deployment name for Azure.
    pub model: String,
    /// Azure `api-version` query parameter.
    pub api_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_headers: Option<HashMap<String, String>>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub retry: RetryPolicy,
    /// Ask for `response_format: json_object` on decision calls.
    pub json_mode: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            api_key: String::new(),
            api_base: None,
            model: "gpt-4o-mini".to_string(),
            api_version: "2024-02-15-preview".to_string(),
            extra_headers: None,
            temperature: 0.1,
            max_tokens: 1000,
            timeout_secs: 30,
            retry: RetryPolicy::default(),
            json_mode: true,
        }
    }
}

impl LlmConfig {
    /// Whether an API key is present.
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let keyless = matches!(self.provider.as_str(), "vllm" | "local");
        if !keyless && !self.is_configured() {
            return Err(ConfigError::MissingCredentials(format!(
                "no API key for provider `{}`",
                self.provider
            )));
        }
        if self.provider == "azure" && self.api_base.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::MissingCredentials(
                "azure provider requires an endpoint (llm.apiBase or AZURE_OPENAI_ENDPOINT)"
                    .into(),
            ));
        }
        if self.model.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "llm.model",
                reason: "must not be empty".into(),
            });
        }
        if let Some(base) = self.api_base.as_deref().filter(|b| !b.is_empty()) {
            url::Url::parse(base).map_err(|e| ConfigError::InvalidValue {
                field: "llm.apiBase",
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────
// Remote servers
// ─────────────────────────────────────────────

/// One remote tool server.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    /// Unique name; becomes `server_id` on its capabilities.
    pub name: String,
    /// Endpoint URL, e.g. `http://localhost:8000/mcp`.
    pub url: String,
    #[serde(default)]
    pub description: String,
}

impl ServerConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            description: String::new(),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidServerUrl {
            name: self.name.clone(),
            url: self.url.clone(),
            reason,
        };
        let parsed = url::Url::parse(&self.url).map_err(|e| invalid(e.to_string()))?;
        match parsed.scheme() {
            "http" | "https" => Ok(()),
            other => Err(invalid(format!("unsupported scheme `{other}`"))),
        }
    }
}

/// Connection and invocation policy for remote servers.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteConfig {
    /// Bound on connect + handshake.
    pub connect_timeout_secs: u64,
    /// Bound on a single wire attempt.
    pub attempt_timeout_secs: u64,
    /// Overall bound on one invocation, retries and backoff included.
    /// Must cover [`RemoteConfig::retry_budget`].
    pub invoke_deadline_secs: u64,
    pub retry: RetryPolicy,
    /// Capability snapshot age after which a turn refreshes the registry.
    pub capability_ttl_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            attempt_timeout_secs: 10,
            invoke_deadline_secs: 60,
            retry: RetryPolicy::default(),
            capability_ttl_secs: 300,
        }
    }
}

impl RemoteConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    pub fn invoke_deadline(&self) -> Duration {
        Duration::from_secs(self.invoke_deadline_secs)
    }

    pub fn capability_ttl(&self) -> Duration {
        Duration::from_secs(self.capability_ttl_secs)
    }

    /// Worst-case time for one invocation to exhaust its retries: every
    /// attempt timing out, every backoff delay, and one reconnect handshake.
    pub fn retry_budget(&self) -> Duration {
        self.attempt_timeout() * self.retry.max_attempts()
            + self.retry.total_delay()
            + self.connect_timeout()
    }
}

// ─────────────────────────────────────────────
// Intent resolution
// ─────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IntentConfig {
    /// Decisions below this confidence ask the user instead of dispatching.
    pub confidence_threshold: f64,
    /// Recent turns replayed into the prompt.
    pub history_turns: usize,
    /// Cap on capabilities listed in the prompt.
    pub max_catalog_entries: usize,
}

impl Default for IntentConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            history_turns: 6,
            max_catalog_entries: 50,
        }
    }
}

// ─────────────────────────────────────────────
// Sessions
// ─────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionsConfig {
    pub idle_timeout_secs: u64,
    /// Maximum live sessions before least-recently-active eviction.
    pub capacity: usize,
    /// Turns kept per session; older ones are dropped.
    pub max_turns: usize,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 1800,
            capacity: 1000,
            max_turns: 50,
        }
    }
}

impl SessionsConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
