//! LLM provider layer for Routebot.
//!
//! # Architecture
//!
//! - [`traits::LlmProvider`]: trait that all providers implement
//! - [`error::LlmError`]: typed call failures with transient classification
//! - [`registry`]: static specs for the supported endpoints + detection logic
//! - [`http_provider::HttpProvider`]: OpenAI-compatible / Azure OpenAI HTTP client
//! - [`http_provider::create_provider`]: convenience builder from `LlmConfig`

pub mod error;
pub mod http_provider;
pub mod registry;
pub mod traits;

pub use error::LlmError;
pub use http_provider::{create_provider, HttpProvider};
pub use registry::{AuthStyle, ProviderSpec, PROVIDERS};
pub use traits::{LlmProvider, LlmRequestConfig};
