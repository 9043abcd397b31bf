//! Provider registry: static specs for the supported chat-completions endpoints.
//!
//! Each `ProviderSpec` describes how to reach one backend: default base URL,
//! how the key is sent, and how the completions URL is shaped.

// ─────────────────────────────────────────────
// ProviderSpec
// ─────────────────────────────────────────────

/// How the API key is attached to a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthStyle {
    /// `Authorization: Bearer <key>`.
    Bearer,
    /// `api-key: <key>` (Azure OpenAI).
    ApiKeyHeader,
    /// No credentials (local servers).
    None,
}

/// Static description of one LLM provider.
#[derive(Clone, Debug)]
pub struct ProviderSpec {
    /// Internal name (e.g. `"openrouter"`), matched against `llm.provider`.
    pub name: &'static str,
    /// Human-readable name for logs.
    pub display_name: &'static str,
    /// Default API base URL when the config leaves it unset.
    pub default_api_base: Option<&'static str>,
    pub auth: AuthStyle,
    /// Completions live under `/openai/deployments/{model}` with an
    /// `api-version` query parameter.
    pub deployment_routing: bool,
    /// Self-hosted; an API key is optional.
    pub is_local: bool,
    /// If the API base URL contains this substring, auto-detect.
    pub detect_by_base_keyword: Option<&'static str>,
}

/// Supported providers, in detection priority order.
pub static PROVIDERS: &[ProviderSpec] = &[
    ProviderSpec {
        name: "azure",
        display_name: "Azure OpenAI",
        default_api_base: None,
        auth: AuthStyle::ApiKeyHeader,
        deployment_routing: true,
        is_local: false,
        detect_by_base_keyword: Some("openai.azure.com"),
    },
    ProviderSpec {
        name: "openrouter",
        display_name: "OpenRouter",
        default_api_base: Some("https://openrouter.ai/api/v1"),
        auth: AuthStyle::Bearer,
        deployment_routing: false,
        is_local: false,
        detect_by_base_keyword: Some("openrouter"),
    },
    ProviderSpec {
        name: "deepseek",
        display_name: "DeepSeek",
        default_api_base: Some("https://api.deepseek.com/v1"),
        auth: AuthStyle::Bearer,
        deployment_routing: false,
        is_local: false,
        detect_by_base_keyword: Some("deepseek"),
    },
    ProviderSpec {
        name: "groq",
        display_name: "Groq",
        default_api_base: Some("https://api.groq.com/openai/v1"),
        auth: AuthStyle::Bearer,
        deployment_routing: false,
        is_local: false,
        detect_by_base_keyword: Some("groq"),
    },
    ProviderSpec {
        name: "vllm",
        display_name: "vLLM",
        default_api_base: Some("http://localhost:8000/v1"),
        auth: AuthStyle::None,
        deployment_routing: false,
        is_local: true,
        detect_by_base_keyword: None,
    },
    ProviderSpec {
        name: "openai",
        display_name: "OpenAI",
        default_api_base: Some("https://api.openai.com/v1"),
        auth: AuthStyle::Bearer,
        deployment_routing: false,
        is_local: false,
        detect_by_base_keyword: None,
    },
];

// ─────────────────────────────────────────────
// Matching functions
// ─────────────────────────────────────────────

/// Find a provider spec by exact name.
pub fn find_by_name(name: &str) -> Option<&'static ProviderSpec> {
    PROVIDERS.iter().find(|spec| spec.name == name)
}

/// Resolve the entry for a configured provider.
///
/// Priority:
/// 1. Exact match on `provider_name`.
/// 2. `api_base` containing a spec's `detect_by_base_keyword`.
/// 3. `None`; the caller decides on a fallback.
pub fn detect(provider_name: &str, api_base: Option<&str>) -> Option<&'static ProviderSpec> {
    if let Some(spec) = find_by_name(&provider_name.to_lowercase()) {
        return Some(spec);
    }

    let base_lower = api_base?.to_lowercase();
    PROVIDERS.iter().find(|s| {
        s.detect_by_base_keyword
            .is_some_and(|kw| base_lower.contains(kw))
    })
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
