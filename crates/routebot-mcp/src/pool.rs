//! Server pool: one lazily opened connection per configured server.
//!
//! [`OperationDispatcher`] is the seam the registry and the orchestrator
//! talk through, so both can be exercised without a network.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

use routebot_core::config::{RemoteConfig, ServerConfig};
use routebot_core::types::{Capability, OperationResult};
use routebot_core::ErrorKind;

use crate::client::{Connection, RemoteClient};
use crate::error::McpError;
use crate::transport::Connector;

/// Discovery outcome for one server.
#[derive(Debug)]
pub struct ServerListing {
    pub server: String,
    pub result: Result<Vec<Capability>, McpError>,
}

/// Reachability of one server, for status displays.
#[derive(Debug, Clone)]
pub struct ServerStatus {
    pub name: String,
    pub url: String,
    pub connected: bool,
    pub error: Option<String>,
}

/// Discovers and executes remote capabilities.
#[async_trait]
pub trait OperationDispatcher: Send + Sync {
    /// Configured servers, in configuration order.
    fn servers(&self) -> Vec<ServerConfig>;

    /// List capabilities on every server. One entry per server, same order
    /// as [`servers`](Self::servers).
    async fn discover(&self) -> Vec<ServerListing>;

    /// Execute a capability on the server that advertised it.
    async fn invoke(
        &self,
        capability: &Capability,
        arguments: &Map<String, Value>,
        deadline: Duration,
    ) -> OperationResult;
}

/// Cached connection for one server. Its lock is held while connecting, so
/// only turns bound for that server wait on a slow handshake.
type Slot = Mutex<Option<Arc<Connection>>>;

/// [`OperationDispatcher`] over real remote connections.
pub struct ServerPool {
    client: RemoteClient,
    servers: Vec<ServerConfig>,
    slots: HashMap<String, Arc<Slot>>,
}

impl ServerPool {
    pub fn new(servers: Vec<ServerConfig>, connector: Arc<dyn Connector>, config: &RemoteConfig) -> Self {
        let slots = servers
            .iter()
            .map(|s| (s.name.clone(), Arc::new(Slot::default())))
            .collect();
        Self {
            client: RemoteClient::new(connector, config),
            servers,
            slots,
        }
    }

    fn slot(&self, server: &str) -> Result<&Arc<Slot>, McpError> {
        self.slots.get(server).ok_or_else(|| McpError::Connect {
            server: server.to_string(),
            reason: "server is not configured".into(),
        })
    }

    /// Cached connection to `server`, opening one if needed.
    async fn connection(&self, server: &ServerConfig) -> Result<Arc<Connection>, McpError> {
        let mut slot = self.slot(&server.name)?.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }
        let conn = self.client.connect(server).await?;
        *slot = Some(conn.clone());
        Ok(conn)
    }

    /// Drop a cached connection so the next use reconnects.
    async fn forget(&self, server: &str) {
        if let Ok(slot) = self.slot(server) {
            slot.lock().await.take();
        }
    }

    /// Connect to every server and report which ones answer.
    pub async fn probe(&self) -> Vec<ServerStatus> {
        let mut statuses = Vec::with_capacity(self.servers.len());
        for server in &self.servers {
            let outcome = self.connection(server).await;
            statuses.push(ServerStatus {
                name: server.name.clone(),
                url: server.url.clone(),
                connected: outcome.is_ok(),
                error: outcome.err().map(|e| e.to_string()),
            });
        }
        statuses
    }
}

#[async_trait]
impl OperationDispatcher for ServerPool {
    fn servers(&self) -> Vec<ServerConfig> {
        self.servers.clone()
    }

    async fn discover(&self) -> Vec<ServerListing> {
        let mut listings = Vec::with_capacity(self.servers.len());
        for server in &self.servers {
            let result = match self.connection(server).await {
                Ok(conn) => self.client.list_capabilities(&conn).await,
                Err(e) => Err(e),
            };
            match &result {
                Ok(caps) => info!(server = %server.name, count = caps.len(), "Discovered capabilities"),
                Err(e) => {
                    warn!(server = %server.name, error = %e, "Capability discovery failed");
                    self.forget(&server.name).await;
                }
            }
            listings.push(ServerListing {
                server: server.name.clone(),
                result,
            });
        }
        listings
    }

    async fn invoke(
        &self,
        capability: &Capability,
        arguments: &Map<String, Value>,
        deadline: Duration,
    ) -> OperationResult {
        let Some(server) = self.servers.iter().find(|s| s.name == capability.server_id) else {
            return OperationResult::failed(
                ErrorKind::RemoteRejected,
                format!("no server named '{}' is configured", capability.server_id),
                0,
            );
        };
        // Connecting counts against the caller's deadline.
        let started = Instant::now();
        let conn = match tokio::time::timeout(deadline, self.connection(server)).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => return OperationResult::failed(e.kind(), e.to_string(), 0),
            Err(_) => {
                return OperationResult::failed(
                    ErrorKind::Timeout,
                    format!("connecting to '{}' exceeded the {deadline:?} deadline", server.name),
                    0,
                )
            }
        };
        let deadline = deadline.saturating_sub(started.elapsed());
        let result = self.client.invoke(&conn, capability, arguments, deadline).await;
        if matches!(
            result.error_kind(),
            Some(ErrorKind::ConnectionLost | ErrorKind::Unreachable)
        ) {
            self.forget(&server.name).await;
        }
        result
    }
}
