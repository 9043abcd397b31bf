//! Configuration system: schema, loading, validation and env var overrides.
//!
//! # Usage
//! ```no_run
//! use routebot_core::config;
//!
//! let cfg = config::load_config(None);
//! cfg.validate().expect("invalid configuration");
//! println!("Model: {}", cfg.llm.model);
//! ```

pub mod loader;
pub mod schema;

pub use loader::{apply_env_overrides, get_config_path, load_config, save_config};
pub use schema::{
    Config, ConfigError, IntentConfig, LlmConfig, RemoteConfig, ServerConfig, SessionsConfig,
};
