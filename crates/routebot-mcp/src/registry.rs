//! Capability registry: the current catalog of remote tools and resources.
//!
//! Readers always see a complete snapshot. A refresh builds the next
//! snapshot off to the side and swaps it in whole.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use routebot_core::types::Capability;
use routebot_core::ErrorKind;

use crate::pool::OperationDispatcher;

/// Refresh could not reach any server.
#[derive(Debug, Clone, Error)]
#[error("no capability server is reachable: {reason}")]
pub struct RegistryUnavailable {
    pub reason: String,
}

impl RegistryUnavailable {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::RegistryUnavailable
    }
}

/// An immutable view of the catalog.
#[derive(Debug, Default)]
pub struct Snapshot {
    capabilities: Vec<Capability>,
    index: HashMap<String, usize>,
    refreshed_at: Option<Instant>,
}

impl Snapshot {
    fn build(capabilities: Vec<Capability>) -> Self {
        let index = capabilities
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.clone(), i))
            .collect();
        Self {
            capabilities,
            index,
            refreshed_at: Some(Instant::now()),
        }
    }

    /// Capabilities in discovery order.
    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    pub fn find(&self, name: &str) -> Option<&Capability> {
        self.index.get(name).map(|&i| &self.capabilities[i])
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    pub fn refreshed_at(&self) -> Option<Instant> {
        self.refreshed_at
    }
}

/// Thread-safe capability catalog.
#[derive(Default)]
pub struct CapabilityRegistry {
    current: RwLock<Arc<Snapshot>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current snapshot. Cheap; holds no lock after returning.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// All capabilities, in discovery order.
    pub fn list(&self) -> Vec<Capability> {
        self.snapshot().capabilities.clone()
    }

    /// Look up a capability by exact name.
    pub fn find(&self, name: &str) -> Option<Capability> {
        self.snapshot().find(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Never refreshed, or last refreshed more than `ttl` ago.
    pub fn is_stale(&self, ttl: Duration) -> bool {
        match self.snapshot().refreshed_at {
            Some(at) => at.elapsed() >= ttl,
            None => true,
        }
    }

    /// Rebuild the catalog from every configured server.
    ///
    /// Succeeds when at least one server answers. Capabilities previously
    /// known from a server that fails this time are carried over. Names are
    /// unique across servers: the first server in configuration order wins.
    /// When no server answers the current snapshot is left untouched.
    pub async fn refresh(
        &self,
        dispatcher: &dyn OperationDispatcher,
    ) -> Result<usize, RegistryUnavailable> {
        let listings = dispatcher.discover().await;
        let previous = self.snapshot();

        let mut merged: Vec<Capability> = Vec::new();
        let mut seen: HashMap<String, String> = HashMap::new();
        let mut failures = Vec::new();
        let mut any_ok = false;

        for listing in listings {
            let capabilities = match listing.result {
                Ok(caps) => {
                    any_ok = true;
                    caps
                }
                Err(e) => {
                    failures.push(format!("{}: {e}", listing.server));
                    let kept: Vec<Capability> = previous
                        .capabilities
                        .iter()
                        .filter(|c| c.server_id == listing.server)
                        .cloned()
                        .collect();
                    if !kept.is_empty() {
                        debug!(server = %listing.server, count = kept.len(), "Keeping capabilities from previous snapshot");
                    }
                    kept
                }
            };
            for cap in capabilities {
                if let Some(owner) = seen.get(&cap.name) {
                    warn!(
                        capability = %cap.name,
                        kept = %owner,
                        ignored = %cap.server_id,
                        "Capability name advertised by more than one server"
                    );
                    continue;
                }
                seen.insert(cap.name.clone(), cap.server_id.clone());
                merged.push(cap);
            }
        }

        if !any_ok {
            let reason = if failures.is_empty() {
                "no servers configured".to_string()
            } else {
                failures.join("; ")
            };
            warn!(%reason, "Registry refresh failed, keeping previous catalog");
            return Err(RegistryUnavailable { reason });
        }

        let count = merged.len();
        let next = Arc::new(Snapshot::build(merged));
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = next;
        info!(count, failed_servers = failures.len(), "Capability registry refreshed");
        Ok(count)
    }
}
