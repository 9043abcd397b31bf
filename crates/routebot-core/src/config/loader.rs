//! Config loader: reads `~/.routebot/config.json` and merges env vars.
//!
//! # Loading precedence
//! 1. Defaults (from `Config::default()`)
//! 2. JSON file at `~/.routebot/config.json`
//! 3. Standard provider variables (`AZURE_OPENAI_*`, `OPENAI_API_KEY`,
//!    `MCP_SERVER_URL`), filling values the file left empty
//! 4. Environment variables `ROUTEBOT_<SECTION>__<FIELD>` (override everything)

use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

use super::schema::{Config, ServerConfig};

/// Name given to the server created from `MCP_SERVER_URL`.
pub const DEFAULT_SERVER_NAME: &str = "default";

/// Default config file path.
pub fn get_config_path() -> PathBuf {
    crate::utils::get_data_path().join("config.json")
}

/// Load configuration from the default path + env vars.
///
/// Falls back to `Config::default()` if the file doesn't exist or can't be parsed.
pub fn load_config(path: Option<&Path>) -> Config {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);
    apply_env_overrides(load_config_from_path(&config_path))
}

/// Load config from a specific file path, without env overrides.
fn load_config_from_path(path: &Path) -> Config {
    if !path.exists() {
        info!("No config file found at {}, using defaults", path.display());
        return Config::default();
    }

    debug!("Loading config from {}", path.display());

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return Config::default();
        }
    };

    match serde_json::from_str(&content) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to parse config JSON: {}", e);
            Config::default()
        }
    }
}

/// Save configuration to disk (pretty-printed JSON with camelCase keys).
pub fn save_config(config: &Config, path: Option<&Path>) -> std::io::Result<()> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(config).map_err(std::io::Error::other)?;

    std::fs::write(&config_path, json)?;
    debug!("Config saved to {}", config_path.display());
    Ok(())
}

/// Apply process environment overrides on top of a loaded config.
pub fn apply_env_overrides(config: Config) -> Config {
    apply_overrides(config, |key| std::env::var(key).ok())
}

/// Apply overrides from an arbitrary variable source.
///
/// Supported `ROUTEBOT_` overrides:
/// - `ROUTEBOT_LLM__{PROVIDER,API_KEY,API_BASE,MODEL,API_VERSION}`
/// - `ROUTEBOT_LLM__{TEMPERATURE,MAX_TOKENS,TIMEOUT_SECS,MAX_RETRIES}`
/// - `ROUTEBOT_REMOTE__{CONNECT_TIMEOUT_SECS,ATTEMPT_TIMEOUT_SECS,INVOKE_DEADLINE_SECS,MAX_RETRIES,CAPABILITY_TTL_SECS}`
/// - `ROUTEBOT_INTENT__{CONFIDENCE_THRESHOLD,HISTORY_TURNS}`
/// - `ROUTEBOT_SESSIONS__{IDLE_TIMEOUT_SECS,CAPACITY}`
pub fn apply_overrides<F>(mut config: Config, env: F) -> Config
where
    F: Fn(&str) -> Option<String>,
{
    let var = |key: &str| env(key).filter(|v| !v.is_empty());

    // Azure OpenAI standard variables
    if let Some(key) = var("AZURE_OPENAI_API_KEY") {
        if !config.llm.is_configured() {
            config.llm.provider = "azure".into();
            config.llm.api_key = key;
        }
    }
    if config.llm.provider == "azure" {
        if let Some(endpoint) = var("AZURE_OPENAI_ENDPOINT") {
            config.llm.api_base.get_or_insert(endpoint);
        }
        if let Some(deployment) = var("AZURE_OPENAI_DEPLOYMENT_NAME") {
            config.llm.model = deployment;
        }
        if let Some(version) = var("AZURE_OPENAI_API_VERSION") {
            config.llm.api_version = version;
        }
    }
    if let Some(key) = var("OPENAI_API_KEY") {
        if !config.llm.is_configured() {
            config.llm.api_key = key;
        }
    }

    // Single-server shorthand
    if let Some(url) = var("MCP_SERVER_URL") {
        match config.servers.iter_mut().find(|s| s.name == DEFAULT_SERVER_NAME) {
            Some(server) => server.url = url,
            None => config.servers.push(ServerConfig::new(DEFAULT_SERVER_NAME, url)),
        }
    }

    // LLM
    if let Some(v) = var("ROUTEBOT_LLM__PROVIDER") {
        config.llm.provider = v;
    }
    if let Some(v) = var("ROUTEBOT_LLM__API_KEY") {
        config.llm.api_key = v;
    }
    if let Some(v) = var("ROUTEBOT_LLM__API_BASE") {
        config.llm.api_base = Some(v);
    }
    if let Some(v) = var("ROUTEBOT_LLM__MODEL") {
        config.llm.model = v;
    }
    if let Some(v) = var("ROUTEBOT_LLM__API_VERSION") {
        config.llm.api_version = v;
    }
    set_parsed(&var, "ROUTEBOT_LLM__TEMPERATURE", &mut config.llm.temperature);
    set_parsed(&var, "ROUTEBOT_LLM__MAX_TOKENS", &mut config.llm.max_tokens);
    set_parsed(&var, "ROUTEBOT_LLM__TIMEOUT_SECS", &mut config.llm.timeout_secs);
    set_parsed(&var, "ROUTEBOT_LLM__MAX_RETRIES", &mut config.llm.retry.max_retries);

    // Remote
    set_parsed(
        &var,
        "ROUTEBOT_REMOTE__CONNECT_TIMEOUT_SECS",
        &mut config.remote.connect_timeout_secs,
    );
    set_parsed(
        &var,
        "ROUTEBOT_REMOTE__ATTEMPT_TIMEOUT_SECS",
        &mut config.remote.attempt_timeout_secs,
    );
    set_parsed(
        &var,
        "ROUTEBOT_REMOTE__INVOKE_DEADLINE_SECS",
        &mut config.remote.invoke_deadline_secs,
    );
    set_parsed(&var, "ROUTEBOT_REMOTE__MAX_RETRIES", &mut config.remote.retry.max_retries);
    set_parsed(
        &var,
        "ROUTEBOT_REMOTE__CAPABILITY_TTL_SECS",
        &mut config.remote.capability_ttl_secs,
    );

    // Intent
    set_parsed(
        &var,
        "ROUTEBOT_INTENT__CONFIDENCE_THRESHOLD",
        &mut config.intent.confidence_threshold,
    );
    set_parsed(&var, "ROUTEBOT_INTENT__HISTORY_TURNS", &mut config.intent.history_turns);

    // Sessions
    set_parsed(
        &var,
        "ROUTEBOT_SESSIONS__IDLE_TIMEOUT_SECS",
        &mut config.sessions.idle_timeout_secs,
    );
    set_parsed(&var, "ROUTEBOT_SESSIONS__CAPACITY", &mut config.sessions.capacity);
    set_parsed(&var, "ROUTEBOT_SESSIONS__MAX_TURNS", &mut config.sessions.max_turns);

    config
}

/// Overwrite `slot` when `key` is set and parses; unparseable values are logged and ignored.
fn set_parsed<T, F>(var: &F, key: &str, slot: &mut T)
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = var(key) {
        match raw.parse() {
            Ok(v) => *slot = v,
            Err(_) => warn!("Ignoring {key}={raw}: not a valid value"),
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp_json(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_load_missing_file() {
        let config = load_config_from_path(Path::new("/nonexistent/path/config.json"));
        assert_eq!(config.sessions.capacity, 1000);
        assert!(config.servers.is_empty());
    }

    #[test]
    fn test_load_valid_json() {
        let file = write_temp_json(
            r#"{
            "llm": {"model": "gpt-4o", "maxTokens": 2048},
            "servers": [{"name": "shop", "url": "http://localhost:8000/mcp"}]
        }"#,
        );

        let config = load_config_from_path(file.path());
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.llm.max_tokens, 2048);
        assert_eq!(config.llm.temperature, 0.1);
        assert_eq!(config.servers.len(), 1);
    }

    #[test]
    fn test_load_invalid_json_returns_defaults() {
        let file = write_temp_json("not valid json {{{");
        let config = load_config_from_path(file.path());
        assert_eq!(config.llm.max_tokens, 1000);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.llm.model = "deepseek-chat".to_string();
        config.servers.push(ServerConfig::new("shop", "http://x/mcp"));

        save_config(&config, Some(&path)).unwrap();

        let reloaded = load_config_from_path(&path);
        assert_eq!(reloaded.llm.model, "deepseek-chat");
        assert_eq!(reloaded.servers[0].name, "shop");
    }

    #[test]
    fn test_azure_standard_variables() {
        let env = env_of(&[
            ("AZURE_OPENAI_API_KEY", "az-key"),
            ("AZURE_OPENAI_ENDPOINT", "https://res.openai.azure.com"),
            ("AZURE_OPENAI_DEPLOYMENT_NAME", "gpt4-prod"),
            ("AZURE_OPENAI_API_VERSION", "2024-06-01"),
        ]);
        let config = apply_overrides(Config::default(), env);
        assert_eq!(config.llm.provider, "azure");
        assert_eq!(config.llm.api_key, "az-key");
        assert_eq!(config.llm.api_base.as_deref(), Some("https://res.openai.azure.com"));
        assert_eq!(config.llm.model, "gpt4-prod");
        assert_eq!(config.llm.api_version, "2024-06-01");
    }

    #[test]
    fn test_standard_variables_do_not_replace_file_key() {
        let mut config = Config::default();
        config.llm.api_key = "from-file".into();
        let config = apply_overrides(config, env_of(&[("OPENAI_API_KEY", "from-env")]));
        assert_eq!(config.llm.api_key, "from-file");
        assert_eq!(config.llm.provider, "openai");
    }

    #[test]
    fn test_mcp_server_url_adds_or_replaces_default() {
        let config = apply_overrides(
            Config::default(),
            env_of(&[("MCP_SERVER_URL", "http://localhost:9000/mcp")]),
        );
        assert_eq!(config.servers.len(), 1);
        assert_eq!(config.servers[0].name, DEFAULT_SERVER_NAME);

        let config = apply_overrides(config, env_of(&[("MCP_SERVER_URL", "http://other/mcp")]));
        assert_eq!(config.servers.len(), 1);
        assert_eq!(config.servers[0].url, "http://other/mcp");
    }

    #[test]
    fn test_routebot_overrides_win() {
        let env = env_of(&[
            ("OPENAI_API_KEY", "std"),
            ("ROUTEBOT_LLM__API_KEY", "explicit"),
            ("ROUTEBOT_INTENT__CONFIDENCE_THRESHOLD", "0.8"),
            ("ROUTEBOT_SESSIONS__CAPACITY", "5"),
            ("ROUTEBOT_REMOTE__MAX_RETRIES", "1"),
        ]);
        let config = apply_overrides(Config::default(), env);
        assert_eq!(config.llm.api_key, "explicit");
        assert_eq!(config.intent.confidence_threshold, 0.8);
        assert_eq!(config.sessions.capacity, 5);
        assert_eq!(config.remote.retry.max_retries, 1);
    }

    #[test]
    fn test_unparseable_override_is_ignored() {
        let config = apply_overrides(
            Config::default(),
            env_of(&[("ROUTEBOT_SESSIONS__CAPACITY", "lots")]),
        );
        assert_eq!(config.sessions.capacity, 1000);
    }

    #[test]
    fn test_saved_json_uses_camel_case() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        save_config(&Config::default(), Some(&path)).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let raw: serde_json::Value = serde_json::from_str(&content).unwrap();

        assert!(raw["llm"].get("maxTokens").is_some());
        assert!(raw["llm"].get("max_tokens").is_none());
    }
}
