//! Wiring: builds a ready orchestrator from a validated [`Config`].

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use routebot_core::config::Config;
use routebot_core::session::SessionStore;
use routebot_mcp::{CapabilityRegistry, HttpConnector, ServerPool};
use routebot_providers::{create_provider, LlmProvider, LlmRequestConfig};

use crate::intent::IntentResolver;
use crate::orchestrator::{Orchestrator, OrchestratorSettings};

/// The assembled core plus the server pool (for status probes).
pub struct Runtime {
    pub orchestrator: Arc<Orchestrator>,
    pub pool: Arc<ServerPool>,
}

/// Assemble provider, server pool, registry, session store and orchestrator.
///
/// Performs no network I/O; servers are contacted on first use.
pub fn build(config: &Config) -> Result<Runtime> {
    let provider: Arc<dyn LlmProvider> =
        Arc::new(create_provider(&config.llm).context("failed to create LLM provider")?);

    let http = reqwest::Client::builder()
        .connect_timeout(config.remote.connect_timeout())
        .build()
        .context("failed to build HTTP client")?;
    let pool = Arc::new(ServerPool::new(
        config.servers.clone(),
        Arc::new(HttpConnector::new(http)),
        &config.remote,
    ));

    let request = LlmRequestConfig::from_config(&config.llm);
    let resolver = IntentResolver::new(
        provider.clone(),
        Some(config.llm.model.clone()),
        request.clone(),
        config.llm.retry.clone(),
        config.intent.clone(),
    );

    let orchestrator = Orchestrator::new(
        resolver,
        Arc::new(CapabilityRegistry::new()),
        pool.clone(),
        Arc::new(
            SessionStore::new(config.sessions.capacity)
                .with_max_turns(config.sessions.max_turns),
        ),
        provider.clone(),
        config.llm.model.clone(),
        request.as_text(),
        OrchestratorSettings::from_config(config),
    );

    info!(
        provider = provider.display_name(),
        model = %config.llm.model,
        servers = config.servers.len(),
        "Routebot core ready"
    );
    Ok(Runtime {
        orchestrator: Arc::new(orchestrator),
        pool,
    })
}
