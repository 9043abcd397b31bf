//! JSON-RPC over HTTP transport.
//!
//! Handles low-level communication with a remote tool server:
//! - POSTing JSON-RPC requests and notifications to the server URL
//! - Accepting plain JSON or single-message event-stream replies
//! - Tracking the server-assigned `Mcp-Session-Id`
//!
//! [`Transport`] and [`Connector`] are the seams the client is written
//! against, so its retry and reconnect policy can be exercised without a network.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::{debug, warn};

use routebot_core::config::ServerConfig;

use crate::error::McpError;
use crate::types::{
    InitializeResult, JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION, SESSION_HEADER,
};

// ─── Request ID Generator ────────────────────────────────────────────────────

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Generate a unique request ID.
pub fn next_request_id() -> u64 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

// ─── Traits ──────────────────────────────────────────────────────────────────

/// An open, initialized channel to one server.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and return its `result` value.
    ///
    /// A JSON-RPC error object becomes [`McpError::Rejected`].
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError>;
}

/// Opens transports, performing the protocol handshake.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, server: &ServerConfig) -> Result<Arc<dyn Transport>, McpError>;
}

// ─── HTTP Transport ──────────────────────────────────────────────────────────

/// Transport speaking JSON-RPC over HTTP POST.
pub struct HttpTransport {
    server: String,
    url: String,
    client: reqwest::Client,
    session_id: RwLock<Option<String>>,
}

impl HttpTransport {
    pub fn new(server: &ServerConfig, client: reqwest::Client) -> Self {
        Self {
            server: server.name.clone(),
            url: server.url.clone(),
            client,
            session_id: RwLock::new(None),
        }
    }

    fn session_id(&self) -> Option<String> {
        let guard = self.session_id.read().unwrap_or_else(PoisonError::into_inner);
        (*guard).clone()
    }

    fn set_session_id(&self, id: String) {
        *self.session_id.write().unwrap_or_else(PoisonError::into_inner) = Some(id);
    }

    fn transport_error(&self, reason: impl Into<String>) -> McpError {
        McpError::Transport {
            server: self.server.clone(),
            reason: reason.into(),
        }
    }

    /// Classify a failed exchange.
    ///
    /// Failing to establish a connection is transient: nothing reached the
    /// server. Once the request may have been written, the exchange is broken
    /// mid-flight and must not be blindly re-sent.
    fn exchange_error(&self, e: reqwest::Error) -> McpError {
        if e.is_connect() {
            return self.transport_error(e.to_string());
        }
        warn!(server = %self.server, error = %e, "Connection dropped mid-request");
        McpError::ConnectionLost {
            server: self.server.clone(),
        }
    }

    async fn post(&self, body: &JsonRpcRequest) -> Result<reqwest::Response, McpError> {
        let mut request = self
            .client
            .post(&self.url)
            .header(ACCEPT, "application/json, text/event-stream")
            .json(body);
        if let Some(id) = self.session_id() {
            request = request.header(SESSION_HEADER, id);
        }

        let response = request.send().await.map_err(|e| self.exchange_error(e))?;

        if let Some(id) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            if self.session_id().as_deref() != Some(id) {
                debug!(server = %self.server, session = id, "Server assigned session id");
                self.set_session_id(id.to_string());
            }
        }
        Ok(response)
    }

    /// Perform the `initialize` request and the `notifications/initialized` notification.
    pub async fn initialize(&self) -> Result<InitializeResult, McpError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "routebot",
                "version": env!("CARGO_PKG_VERSION")
            }
        });
        let result = self.request("initialize", Some(params)).await?;
        let info: InitializeResult = serde_json::from_value(result)
            .map_err(|e| McpError::Protocol(format!("bad initialize result: {e}")))?;

        let note = JsonRpcRequest::notification("notifications/initialized");
        match self.post(&note).await {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => warn!(server = %self.server, status = %resp.status(), "initialized notification refused"),
            Err(e) => warn!(server = %self.server, error = %e, "initialized notification failed"),
        }

        debug!(
            server = %self.server,
            remote = info.server_info.as_ref().and_then(|s| s.name.as_deref()).unwrap_or("?"),
            resources = info.supports_resources(),
            "Handshake complete"
        );
        Ok(info)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        let id = next_request_id();
        let req = JsonRpcRequest::new(id, method, params);
        let had_session = self.session_id().is_some();

        let response = self.post(&req).await?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = response.text().await.map_err(|e| self.exchange_error(e))?;

        if status == StatusCode::NOT_FOUND && had_session {
            return Err(McpError::ConnectionLost {
                server: self.server.clone(),
            });
        }
        if status.is_server_error()
            || status == StatusCode::REQUEST_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS
        {
            return Err(self.transport_error(format!("HTTP {status}")));
        }

        let parsed = parse_body(&content_type, &body, id);
        if !status.is_success() {
            // Some servers put a JSON-RPC error in a 4xx body.
            return match parsed {
                Ok(JsonRpcResponse { error: Some(err), .. }) => Err(McpError::Rejected {
                    code: err.code,
                    message: err.message,
                }),
                _ => Err(McpError::Protocol(format!("HTTP {status}: {body}"))),
            };
        }

        let response = parsed?;
        if let Some(err) = response.error {
            return Err(McpError::Rejected {
                code: err.code,
                message: err.message,
            });
        }
        Ok(response.result.unwrap_or(Value::Null))
    }
}

/// Decode a reply body, which may be JSON or an event stream of `data:` lines.
fn parse_body(content_type: &str, body: &str, id: u64) -> Result<JsonRpcResponse, McpError> {
    if content_type.contains("text/event-stream") {
        let messages: Vec<JsonRpcResponse> = body
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .filter_map(|data| serde_json::from_str(data.trim()).ok())
            .collect();
        let wanted = Value::from(id);
        let position = messages
            .iter()
            .position(|m| m.id.as_ref() == Some(&wanted))
            .or_else(|| messages.len().checked_sub(1));
        return position
            .and_then(|i| messages.into_iter().nth(i))
            .ok_or_else(|| McpError::Protocol("event stream carried no response".into()));
    }
    serde_json::from_str(body).map_err(|e| McpError::Protocol(format!("invalid JSON-RPC body: {e}")))
}

// ─── HTTP Connector ──────────────────────────────────────────────────────────

/// Opens [`HttpTransport`]s sharing one connection pool.
#[derive(Clone, Default)]
pub struct HttpConnector {
    client: reqwest::Client,
}

impl HttpConnector {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Connector for HttpConnector {
    async fn open(&self, server: &ServerConfig) -> Result<Arc<dyn Transport>, McpError> {
        let transport = HttpTransport::new(server, self.client.clone());
        transport.initialize().await.map_err(|e| McpError::Connect {
            server: server.name.clone(),
            reason: e.to_string(),
        })?;
        Ok(Arc::new(transport))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
