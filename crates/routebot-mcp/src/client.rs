//! Remote operation client: connections, capability discovery and invocation.
//!
//! Invocation policy:
//! - each wire attempt is bounded by the attempt timeout; a timed-out attempt
//!   counts as a transient failure
//! - transient failures are retried with the configured backoff; exhausting
//!   the budget yields `Unreachable`
//! - a remote rejection is returned immediately as `RemoteRejected`
//! - a lost connection triggers exactly one reconnect per invocation; if the
//!   call still cannot complete the result is `ConnectionLost`
//! - the caller's deadline bounds everything, backoff included, and yields
//!   `Timeout`

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use routebot_core::config::{RemoteConfig, ServerConfig};
use routebot_core::types::{Capability, CapabilityKind, OperationResult};
use routebot_core::{ErrorKind, RetryFailure, RetryPolicy};

use crate::error::McpError;
use crate::transport::{Connector, Transport};
use crate::types::{
    content_text, content_to_payload, error_codes, ResourceReadResult, ResourcesListResult,
    ToolCallResult, ToolsListResult,
};

/// Upper bound on `nextCursor` pages followed during discovery.
const MAX_LIST_PAGES: usize = 20;

// ─── Connection ──────────────────────────────────────────────────────────────

/// Handle to one server. The underlying transport is swapped on reconnect.
pub struct Connection {
    server: ServerConfig,
    transport: RwLock<Arc<dyn Transport>>,
}

impl Connection {
    pub fn server(&self) -> &ServerConfig {
        &self.server
    }

    async fn transport(&self) -> Arc<dyn Transport> {
        self.transport.read().await.clone()
    }
}

// ─── RemoteClient ────────────────────────────────────────────────────────────

/// Executes operations against remote servers with timeout, retry and
/// reconnect discipline.
pub struct RemoteClient {
    connector: Arc<dyn Connector>,
    retry: RetryPolicy,
    connect_timeout: Duration,
    attempt_timeout: Duration,
}

impl RemoteClient {
    pub fn new(connector: Arc<dyn Connector>, config: &RemoteConfig) -> Self {
        Self {
            connector,
            retry: config.retry.clone(),
            connect_timeout: config.connect_timeout(),
            attempt_timeout: config.attempt_timeout(),
        }
    }

    /// Open a connection and complete the handshake.
    ///
    /// Any failure, including the connect timeout, is [`McpError::Connect`].
    pub async fn connect(&self, server: &ServerConfig) -> Result<Arc<Connection>, McpError> {
        let transport = self.open(server).await?;
        info!(server = %server.name, url = %server.url, "Connected to remote server");
        Ok(Arc::new(Connection {
            server: server.clone(),
            transport: RwLock::new(transport),
        }))
    }

    async fn open(&self, server: &ServerConfig) -> Result<Arc<dyn Transport>, McpError> {
        match tokio::time::timeout(self.connect_timeout, self.connector.open(server)).await {
            Ok(Ok(transport)) => Ok(transport),
            Ok(Err(e @ McpError::Connect { .. })) => Err(e),
            Ok(Err(e)) => Err(McpError::Connect {
                server: server.name.clone(),
                reason: e.to_string(),
            }),
            Err(_) => Err(McpError::Connect {
                server: server.name.clone(),
                reason: format!("handshake timed out after {:?}", self.connect_timeout),
            }),
        }
    }

    /// Replace the connection's transport with a fresh one.
    async fn reconnect(&self, conn: &Connection) -> Result<(), McpError> {
        warn!(server = %conn.server.name, "Connection lost, reconnecting");
        let transport = self.open(&conn.server).await?;
        *conn.transport.write().await = transport;
        info!(server = %conn.server.name, "Reconnected");
        Ok(())
    }

    /// One request bounded by the attempt timeout.
    async fn attempt(
        &self,
        transport: &dyn Transport,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, McpError> {
        tokio::time::timeout(self.attempt_timeout, transport.request(method, params))
            .await
            .unwrap_or_else(|_| {
                Err(McpError::Timeout {
                    operation: method.to_string(),
                    timeout_ms: self.attempt_timeout.as_millis() as u64,
                })
            })
    }

    /// Request with retry, reconnecting once if the connection is lost.
    async fn request_with_policy(
        &self,
        conn: &Connection,
        method: &str,
        params: Option<Value>,
        attempts: &AtomicU32,
    ) -> Result<Value, RetryFailure<McpError>> {
        let reconnected = AtomicBool::new(false);
        self.retry
            .run(
                method,
                |attempt| {
                    attempts.store(attempt, Ordering::SeqCst);
                    let params = params.clone();
                    let reconnected = &reconnected;
                    async move {
                        let transport = conn.transport().await;
                        match self.attempt(transport.as_ref(), method, params.clone()).await {
                            Err(McpError::ConnectionLost { .. })
                                if !reconnected.swap(true, Ordering::SeqCst) =>
                            {
                                if let Err(e) = self.reconnect(conn).await {
                                    warn!(server = %conn.server.name, error = %e, "Reconnect failed");
                                    return Err(McpError::ConnectionLost {
                                        server: conn.server.name.clone(),
                                    });
                                }
                                let transport = conn.transport().await;
                                self.attempt(transport.as_ref(), method, params).await
                            }
                            other => other,
                        }
                    }
                },
                McpError::is_transient,
            )
            .await
    }

    /// List tools and resources offered by a connected server.
    pub async fn list_capabilities(&self, conn: &Connection) -> Result<Vec<Capability>, McpError> {
        let server_id = conn.server.name.as_str();
        let attempts = AtomicU32::new(0);
        let mut capabilities = Vec::new();

        let mut cursor: Option<String> = None;
        for _ in 0..MAX_LIST_PAGES {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let raw = self
                .request_with_policy(conn, "tools/list", params, &attempts)
                .await
                .map_err(|f| f.error)?;
            let page: ToolsListResult = serde_json::from_value(raw)
                .map_err(|e| McpError::Protocol(format!("bad tools/list result: {e}")))?;
            capabilities.extend(page.tools.into_iter().map(|t| {
                Capability::tool(
                    server_id,
                    t.name,
                    t.description.unwrap_or_default(),
                    normalize_schema(t.input_schema),
                )
            }));
            cursor = page.next_cursor;
            if cursor.is_none() {
                break;
            }
        }

        let mut cursor: Option<String> = None;
        for _ in 0..MAX_LIST_PAGES {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let raw = match self
                .request_with_policy(conn, "resources/list", params, &attempts)
                .await
            {
                Ok(raw) => raw,
                Err(RetryFailure {
                    error: McpError::Rejected { code, .. },
                    ..
                }) if code == error_codes::METHOD_NOT_FOUND => break,
                Err(f) => return Err(f.error),
            };
            let page: ResourcesListResult = serde_json::from_value(raw)
                .map_err(|e| McpError::Protocol(format!("bad resources/list result: {e}")))?;
            capabilities.extend(page.resources.into_iter().map(|r| {
                let description = r.description.unwrap_or_else(|| r.name.clone());
                Capability::resource(server_id, r.name, description, r.uri)
            }));
            cursor = page.next_cursor;
            if cursor.is_none() {
                break;
            }
        }

        debug!(server = %server_id, count = capabilities.len(), "Listed capabilities");
        Ok(capabilities)
    }

    /// Execute a capability.
    ///
    /// `deadline` bounds the whole invocation. Never panics or propagates:
    /// every outcome is an [`OperationResult`].
    pub async fn invoke(
        &self,
        conn: &Connection,
        capability: &Capability,
        arguments: &Map<String, Value>,
        deadline: Duration,
    ) -> OperationResult {
        let (method, params) = match capability.kind {
            CapabilityKind::Tool => (
                "tools/call",
                json!({ "name": capability.name, "arguments": arguments }),
            ),
            CapabilityKind::Resource => match &capability.uri {
                Some(uri) => ("resources/read", json!({ "uri": uri })),
                None => {
                    return OperationResult::failed(
                        ErrorKind::Unknown,
                        format!("resource '{}' has no URI", capability.name),
                        0,
                    )
                }
            },
        };

        debug!(
            server = %conn.server.name,
            capability = %capability.name,
            method,
            "Invoking remote operation"
        );

        let attempts = AtomicU32::new(0);
        let outcome = tokio::time::timeout(
            deadline,
            self.request_with_policy(conn, method, Some(params), &attempts),
        )
        .await;
        let attempts = attempts.load(Ordering::SeqCst);

        let raw = match outcome {
            Err(_) => {
                warn!(capability = %capability.name, ?deadline, attempts, "Invocation deadline exceeded");
                return OperationResult::failed(
                    ErrorKind::Timeout,
                    format!("'{}' exceeded its {:?} deadline", capability.name, deadline),
                    attempts,
                );
            }
            Ok(Err(RetryFailure {
                error,
                attempts,
                exhausted: true,
            })) => {
                return OperationResult::failed(
                    ErrorKind::Unreachable,
                    format!("gave up after {attempts} attempts: {error}"),
                    attempts,
                );
            }
            Ok(Err(RetryFailure { error, attempts, .. })) => {
                warn!(capability = %capability.name, error = %error, "Invocation failed");
                return OperationResult::failed(error.kind(), error.to_string(), attempts);
            }
            Ok(Ok(raw)) => raw,
        };

        match capability.kind {
            CapabilityKind::Tool => tool_result(raw, attempts),
            CapabilityKind::Resource => resource_result(raw, attempts),
        }
    }
}

fn tool_result(raw: Value, attempts: u32) -> OperationResult {
    let result: ToolCallResult = match serde_json::from_value(raw.clone()) {
        Ok(r) => r,
        // Not shaped like a tool result; hand the raw value through.
        Err(_) => return OperationResult::ok(raw, attempts),
    };
    if result.is_error {
        let message = content_text(&result.content);
        return OperationResult::failed(
            ErrorKind::RemoteRejected,
            if message.is_empty() { "tool reported an error".into() } else { message },
            attempts,
        );
    }
    let payload = result
        .structured_content
        .unwrap_or_else(|| content_to_payload(&result.content));
    OperationResult::ok(payload, attempts)
}

fn resource_result(raw: Value, attempts: u32) -> OperationResult {
    match serde_json::from_value::<ResourceReadResult>(raw.clone()) {
        Ok(read) => OperationResult::ok(content_to_payload(&read.contents), attempts),
        Err(_) => OperationResult::ok(raw, attempts),
    }
}

/// Ensure a tool schema is an object schema.
fn normalize_schema(schema: Value) -> Value {
    match schema {
        Value::Object(_) => schema,
        _ => json!({ "type": "object", "properties": {} }),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// What a scripted transport does on each request.
    #[derive(Clone)]
    enum Step {
        Reply(Value),
        Fail(McpError),
        Hang,
    }

    /// Transport replaying a shared script and counting calls.
    struct ScriptedTransport {
        script: Arc<Mutex<VecDeque<Step>>>,
        fallback: Step,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn request(&self, _method: &str, _params: Option<Value>) -> Result<Value, McpError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let step = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone());
            match step {
                Step::Reply(v) => Ok(v),
                Step::Fail(e) => Err(e),
                Step::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(Value::Null)
                }
            }
        }
    }

    struct ScriptedConnector {
        script: Arc<Mutex<VecDeque<Step>>>,
        fallback: Step,
        calls: Arc<AtomicU32>,
        opens: AtomicU32,
        fail_after: Option<u32>,
    }

    impl ScriptedConnector {
        fn new(script: Vec<Step>, fallback: Step) -> Self {
            Self {
                script: Arc::new(Mutex::new(script.into())),
                fallback,
                calls: Arc::new(AtomicU32::new(0)),
                opens: AtomicU32::new(0),
                fail_after: None,
            }
        }
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        async fn open(&self, server: &ServerConfig) -> Result<Arc<dyn Transport>, McpError> {
            let n = self.opens.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_after.is_some_and(|limit| n > limit) {
                return Err(McpError::Connect {
                    server: server.name.clone(),
                    reason: "refused".into(),
                });
            }
            Ok(Arc::new(ScriptedTransport {
                script: self.script.clone(),
                fallback: self.fallback.clone(),
                calls: self.calls.clone(),
            }))
        }
    }

    fn remote_config(max_retries: u32) -> RemoteConfig {
        RemoteConfig {
            connect_timeout_secs: 1,
            attempt_timeout_secs: 1,
            invoke_deadline_secs: 30,
            retry: RetryPolicy {
                max_retries,
                base_delay_ms: 10,
                max_delay_ms: 100,
            },
            capability_ttl_secs: 60,
        }
    }

    fn server() -> ServerConfig {
        ServerConfig::new("shop", "http://localhost:8000/mcp")
    }

    fn search_tool() -> Capability {
        Capability::tool(
            "shop",
            "search_products",
            "Search products",
            json!({"type": "object", "properties": {"category": {"type": "string"}}}),
        )
    }

    fn args() -> Map<String, Value> {
        let mut m = Map::new();
        m.insert("category".into(), json!("electronics"));
        m
    }

    fn transport_err() -> McpError {
        McpError::Transport {
            server: "shop".into(),
            reason: "connection reset".into(),
        }
    }

    fn lost() -> McpError {
        McpError::ConnectionLost {
            server: "shop".into(),
        }
    }

    async fn setup(connector: ScriptedConnector, max_retries: u32) -> (Arc<ScriptedConnector>, RemoteClient, Arc<Connection>) {
        let connector = Arc::new(connector);
        let client = RemoteClient::new(connector.clone(), &remote_config(max_retries));
        let conn = client.connect(&server()).await.unwrap();
        (connector, client, conn)
    }

    #[tokio::test(start_paused = true)]
    async fn test_invoke_success_decodes_text_payload() {
        let reply = json!({"content": [{"type": "text", "text": "[{\"name\":\"TV\"},{\"name\":\"Phone\"},{\"name\":\"Laptop\"}]"}]});
        let (connector, client, conn) =
            setup(ScriptedConnector::new(vec![Step::Reply(reply)], Step::Fail(transport_err())), 3).await;

        let result = client
            .invoke(&conn, &search_tool(), &args(), Duration::from_secs(30))
            .await;
        assert!(result.is_ok());
        assert_eq!(result.payload.unwrap().as_array().unwrap().len(), 3);
        assert_eq!(result.attempts, 1);
        assert_eq!(connector.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_timing_out_exhausts_retries_as_unreachable() {
        let (connector, client, conn) = setup(ScriptedConnector::new(vec![], Step::Hang), 3).await;

        let result = client
            .invoke(&conn, &search_tool(), &args(), Duration::from_secs(600))
            .await;
        assert_eq!(result.error_kind(), Some(ErrorKind::Unreachable));
        assert_eq!(connector.calls.load(Ordering::SeqCst), 4);
        assert_eq!(result.attempts, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_config_exhausts_retries_before_deadline() {
        let config = RemoteConfig::default();
        let connector = Arc::new(ScriptedConnector::new(vec![], Step::Hang));
        let client = RemoteClient::new(connector.clone(), &config);
        let conn = client.connect(&server()).await.unwrap();

        let result = client
            .invoke(&conn, &search_tool(), &args(), config.invoke_deadline())
            .await;
        assert_eq!(result.error_kind(), Some(ErrorKind::Unreachable));
        assert_eq!(result.attempts, config.retry.max_attempts());
        assert_eq!(connector.calls.load(Ordering::SeqCst), config.retry.max_attempts());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_then_success() {
        let script = vec![
            Step::Fail(transport_err()),
            Step::Fail(transport_err()),
            Step::Reply(json!({"content": [{"type": "text", "text": "ok"}]})),
        ];
        let (connector, client, conn) = setup(ScriptedConnector::new(script, Step::Hang), 3).await;

        let result = client
            .invoke(&conn, &search_tool(), &args(), Duration::from_secs(30))
            .await;
        assert!(result.is_ok());
        assert_eq!(result.payload, Some(json!("ok")));
        assert_eq!(result.attempts, 3);
        assert_eq!(connector.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_is_not_retried() {
        let script = vec![Step::Fail(McpError::Rejected {
            code: -32602,
            message: "category must be one of ...".into(),
        })];
        let (connector, client, conn) =
            setup(ScriptedConnector::new(script, Step::Fail(transport_err())), 3).await;

        let result = client
            .invoke(&conn, &search_tool(), &args(), Duration::from_secs(30))
            .await;
        assert_eq!(result.error_kind(), Some(ErrorKind::RemoteRejected));
        assert_eq!(connector.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tool_is_error_flag_is_rejection() {
        let reply = json!({"isError": true, "content": [{"type": "text", "text": "out of stock"}]});
        let (_, client, conn) =
            setup(ScriptedConnector::new(vec![Step::Reply(reply)], Step::Hang), 3).await;

        let result = client
            .invoke(&conn, &search_tool(), &args(), Duration::from_secs(30))
            .await;
        assert_eq!(result.error_kind(), Some(ErrorKind::RemoteRejected));
        assert_eq!(result.error.unwrap().message, "out of stock");
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_lost_reconnects_once_then_fails() {
        let (connector, client, conn) = setup(ScriptedConnector::new(vec![], Step::Fail(lost())), 3).await;

        let result = client
            .invoke(&conn, &search_tool(), &args(), Duration::from_secs(30))
            .await;
        assert_eq!(result.error_kind(), Some(ErrorKind::ConnectionLost));
        // Initial connect + exactly one reconnect.
        assert_eq!(connector.opens.load(Ordering::SeqCst), 2);
        assert_eq!(connector.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_lost_recovers_after_reconnect() {
        let script = vec![
            Step::Fail(lost()),
            Step::Reply(json!({"content": [{"type": "text", "text": "{\"count\": 2}"}]})),
        ];
        let (connector, client, conn) = setup(ScriptedConnector::new(script, Step::Hang), 3).await;

        let result = client
            .invoke(&conn, &search_tool(), &args(), Duration::from_secs(30))
            .await;
        assert!(result.is_ok());
        assert_eq!(result.payload, Some(json!({"count": 2})));
        assert_eq!(connector.opens.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_reconnect_is_connection_lost() {
        let mut connector = ScriptedConnector::new(vec![], Step::Fail(lost()));
        connector.fail_after = Some(1);
        let (_, client, conn) = setup(connector, 3).await;

        let result = client
            .invoke(&conn, &search_tool(), &args(), Duration::from_secs(30))
            .await;
        assert_eq!(result.error_kind(), Some(ErrorKind::ConnectionLost));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_yields_timeout() {
        let (_, client, conn) = setup(ScriptedConnector::new(vec![], Step::Hang), 10).await;

        let result = client
            .invoke(&conn, &search_tool(), &args(), Duration::from_millis(1500))
            .await;
        assert_eq!(result.error_kind(), Some(ErrorKind::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failure_is_connection_error() {
        let mut connector = ScriptedConnector::new(vec![], Step::Hang);
        connector.fail_after = Some(0);
        let client = RemoteClient::new(Arc::new(connector), &remote_config(0));
        let err = client.connect(&server()).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::ConnectionError);
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_capabilities_tools_and_resources() {
        let script = vec![
            Step::Reply(json!({
                "tools": [{"name": "search_products", "description": "Search", "inputSchema": {"type": "object", "required": ["category"]}}],
                "nextCursor": "p2"
            })),
            Step::Reply(json!({"tools": [{"name": "get_categories"}]})),
            Step::Reply(json!({"resources": [{"uri": "shop://catalog", "name": "catalog"}]})),
        ];
        let (_, client, conn) = setup(ScriptedConnector::new(script, Step::Hang), 0).await;

        let caps = client.list_capabilities(&conn).await.unwrap();
        assert_eq!(caps.len(), 3);
        assert_eq!(caps[0].required_parameters(), vec!["category"]);
        assert_eq!(caps[1].parameter_schema["type"], "object");
        assert_eq!(caps[2].kind, CapabilityKind::Resource);
        assert_eq!(caps[2].uri.as_deref(), Some("shop://catalog"));
        assert!(caps.iter().all(|c| c.server_id == "shop"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_capabilities_without_resources_support() {
        let script = vec![
            Step::Reply(json!({"tools": [{"name": "get_categories"}]})),
            Step::Fail(McpError::Rejected {
                code: error_codes::METHOD_NOT_FOUND,
                message: "Method not found".into(),
            }),
        ];
        let (_, client, conn) = setup(ScriptedConnector::new(script, Step::Hang), 0).await;

        let caps = client.list_capabilities(&conn).await.unwrap();
        assert_eq!(caps.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invoke_resource_reads_uri() {
        let reply = json!({"contents": [{"uri": "shop://catalog", "text": "{\"items\": 12}"}]});
        let (_, client, conn) =
            setup(ScriptedConnector::new(vec![Step::Reply(reply)], Step::Hang), 0).await;

        let cap = Capability::resource("shop", "catalog", "All products", "shop://catalog");
        let result = client
            .invoke(&conn, &cap, &Map::new(), Duration::from_secs(5))
            .await;
        assert_eq!(result.payload, Some(json!({"items": 12})));
    }
}
