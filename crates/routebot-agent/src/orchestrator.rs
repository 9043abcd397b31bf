//! Dispatch orchestrator: drives one user turn from request to reply.
//!
//! ```text
//! Received → Resolving → Clarifying ──────────────┐
//!                      └→ Dispatching → Responding → Done
//! (any state) → Failed
//! ```
//!
//! Every path produces a reply. Failures surface as a fixed user-facing
//! text plus a machine-readable error kind; internal detail only reaches
//! the logs. The session history is written once, when the turn completes.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use routebot_core::config::Config;
use routebot_core::session::SessionStore;
use routebot_core::types::{Capability, IntentDecision, OperationResult, Turn};
use routebot_core::ErrorKind;
use routebot_mcp::{CapabilityRegistry, OperationDispatcher};
use routebot_providers::{LlmProvider, LlmRequestConfig};

use crate::intent::IntentResolver;
use crate::prompt;

// ─────────────────────────────────────────────
// Inbound / outbound types
// ─────────────────────────────────────────────

/// One user request.
#[derive(Clone, Debug, Default)]
pub struct TurnRequest {
    pub session_id: Option<String>,
    pub user_text: String,
    pub user_id: Option<String>,
}

impl TurnRequest {
    pub fn new(user_text: impl Into<String>) -> Self {
        Self {
            user_text: user_text.into(),
            ..Default::default()
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// What was decided, for callers that want to show their work.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Diagnostic {
    pub server_used: Option<String>,
    pub capability_used: Option<String>,
    pub confidence: f64,
    pub rationale: String,
}

/// The reply to one turn.
#[derive(Clone, Debug, Serialize)]
pub struct TurnResponse {
    pub response_text: String,
    pub session_id: String,
    pub success: bool,
    /// Error kind name (e.g. `"ConnectionLost"`) when `success` is false.
    pub error: Option<String>,
    pub diagnostic: Option<Diagnostic>,
}

/// Turn lifecycle states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnState {
    Received,
    Resolving,
    Clarifying,
    Dispatching,
    Responding,
    Done,
    Failed,
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TurnState::Received => "received",
            TurnState::Resolving => "resolving",
            TurnState::Clarifying => "clarifying",
            TurnState::Dispatching => "dispatching",
            TurnState::Responding => "responding",
            TurnState::Done => "done",
            TurnState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// User-facing text for a failed turn. Never includes internal detail.
pub fn failure_text(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::ConnectionError => {
            "Sorry, I couldn't connect to the service that handles this request. Please try again in a moment."
        }
        ErrorKind::Timeout => "Sorry, that request took too long to complete. Please try again.",
        ErrorKind::Unreachable => {
            "Sorry, the service isn't responding right now. Please try again later."
        }
        ErrorKind::RemoteRejected => {
            "Sorry, the service couldn't complete that request. Try rephrasing it or adjusting the details."
        }
        ErrorKind::ConnectionLost => {
            "Sorry, the connection to the service was lost while handling your request. Please try again."
        }
        ErrorKind::IntentParseFailure => {
            "Sorry, I had trouble working out how to handle that. Could you rephrase your request?"
        }
        ErrorKind::RegistryUnavailable => {
            "Sorry, no services are available to handle requests right now. Please try again later."
        }
        ErrorKind::Unknown => "Sorry, something went wrong while handling your request.",
    }
}

// ─────────────────────────────────────────────
// Orchestrator
// ─────────────────────────────────────────────

/// Timing knobs for the orchestrator.
#[derive(Clone, Debug)]
pub struct OrchestratorSettings {
    pub invoke_deadline: Duration,
    pub capability_ttl: Duration,
    pub idle_timeout: Duration,
    pub history_turns: usize,
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            invoke_deadline: config.remote.invoke_deadline(),
            capability_ttl: config.remote.capability_ttl(),
            idle_timeout: config.sessions.idle_timeout(),
            history_turns: config.intent.history_turns,
        }
    }
}

/// Handles user turns. Shareable across tasks; every method takes `&self`.
pub struct Orchestrator {
    resolver: IntentResolver,
    registry: Arc<CapabilityRegistry>,
    dispatcher: Arc<dyn OperationDispatcher>,
    sessions: Arc<SessionStore>,
    provider: Arc<dyn LlmProvider>,
    model: String,
    text_request: LlmRequestConfig,
    settings: OrchestratorSettings,
}

/// Everything one turn accumulates before it is recorded.
struct TurnOutcome {
    text: String,
    error: Option<ErrorKind>,
    decision: Option<IntentDecision>,
    result: Option<OperationResult>,
}

impl TurnOutcome {
    fn failed(kind: ErrorKind) -> Self {
        Self {
            text: failure_text(kind).to_string(),
            error: Some(kind),
            decision: None,
            result: None,
        }
    }
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        resolver: IntentResolver,
        registry: Arc<CapabilityRegistry>,
        dispatcher: Arc<dyn OperationDispatcher>,
        sessions: Arc<SessionStore>,
        provider: Arc<dyn LlmProvider>,
        model: String,
        text_request: LlmRequestConfig,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            resolver,
            registry,
            dispatcher,
            sessions,
            provider,
            model,
            text_request,
            settings,
        }
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Handle one user turn. Never fails: every outcome is a [`TurnResponse`].
    pub async fn handle_turn(&self, request: TurnRequest) -> TurnResponse {
        self.sessions.evict_idle(Utc::now(), self.settings.idle_timeout);
        let session_id = self
            .sessions
            .get_or_create(request.session_id.as_deref(), request.user_id.as_deref());
        self.transition(&session_id, TurnState::Received);

        let outcome = self.run_turn(&session_id, &request.user_text).await;

        let success = outcome.error.is_none();
        self.transition(
            &session_id,
            if success { TurnState::Done } else { TurnState::Failed },
        );
        let diagnostic = outcome.decision.as_ref().map(diagnostic_for);

        let mut turn = Turn::new(request.user_text, outcome.text.clone());
        turn.decision = outcome.decision;
        turn.result = outcome.result;
        self.sessions.append_turn(&session_id, turn);

        TurnResponse {
            response_text: outcome.text,
            session_id,
            success,
            error: outcome.error.map(|k| k.to_string()),
            diagnostic,
        }
    }

    async fn run_turn(&self, session_id: &str, user_text: &str) -> TurnOutcome {
        let capabilities = match self.capabilities().await {
            Ok(caps) => caps,
            Err(kind) => return TurnOutcome::failed(kind),
        };

        self.transition(session_id, TurnState::Resolving);
        let history = self
            .sessions
            .history(session_id, self.settings.history_turns);
        let decision = match self.resolver.resolve(user_text, &capabilities, &history).await {
            Ok(d) => d,
            Err(e) => {
                error!(session_id, error = %e, "Intent resolution failed");
                return TurnOutcome::failed(e.kind());
            }
        };

        let Some(capability) = decision
            .chosen_capability
            .clone()
            .filter(|_| decision.is_dispatchable())
        else {
            self.transition(session_id, TurnState::Clarifying);
            let text = self.clarify(user_text, &capabilities, &decision).await;
            return TurnOutcome {
                text,
                error: None,
                decision: Some(decision),
                result: None,
            };
        };

        self.transition(session_id, TurnState::Dispatching);
        info!(
            session_id,
            capability = %capability.name,
            server = %capability.server_id,
            "Dispatching"
        );
        let result = self
            .dispatcher
            .invoke(&capability, &decision.arguments, self.settings.invoke_deadline)
            .await;

        self.transition(session_id, TurnState::Responding);
        let (text, error) = match (&result.payload, &result.error) {
            (Some(payload), None) if result.is_ok() => {
                (self.summarize(user_text, &capability, payload).await, None)
            }
            _ => {
                let kind = result.error_kind().unwrap_or(ErrorKind::Unknown);
                warn!(
                    session_id,
                    capability = %capability.name,
                    kind = %kind,
                    detail = result.error.as_ref().map(|e| e.message.as_str()).unwrap_or(""),
                    attempts = result.attempts,
                    "Dispatch failed"
                );
                (failure_text(kind).to_string(), Some(kind))
            }
        };
        TurnOutcome {
            text,
            error,
            decision: Some(decision),
            result: Some(result),
        }
    }

    /// Current catalog, refreshing it when empty or stale.
    async fn capabilities(&self) -> Result<Vec<Capability>, ErrorKind> {
        if self.registry.is_empty() || self.registry.is_stale(self.settings.capability_ttl) {
            if let Err(e) = self.registry.refresh(self.dispatcher.as_ref()).await {
                warn!(error = %e, "Capability refresh failed");
            }
        }
        let capabilities = self.registry.list();
        if capabilities.is_empty() {
            return Err(ErrorKind::RegistryUnavailable);
        }
        Ok(capabilities)
    }

    async fn clarify(
        &self,
        user_text: &str,
        capabilities: &[Capability],
        decision: &IntentDecision,
    ) -> String {
        let question = decision.clarification_question.as_deref();
        let messages = prompt::guidance_messages(user_text, capabilities, question);
        match self
            .provider
            .chat(&messages, &self.model, &self.text_request)
            .await
        {
            Ok(resp) if !resp.text().is_empty() => resp.text().to_string(),
            Ok(_) => prompt::fallback_guidance(capabilities, question),
            Err(e) => {
                debug!(error = %e, "Guidance call failed, using fixed text");
                prompt::fallback_guidance(capabilities, question)
            }
        }
    }

    async fn summarize(
        &self,
        user_text: &str,
        capability: &Capability,
        payload: &serde_json::Value,
    ) -> String {
        let messages = prompt::interpretation_messages(user_text, capability, payload);
        match self
            .provider
            .chat(&messages, &self.model, &self.text_request)
            .await
        {
            Ok(resp) if !resp.text().is_empty() => resp.text().to_string(),
            Ok(_) => prompt::fallback_summary(capability, payload),
            Err(e) => {
                debug!(error = %e, "Summary call failed, using fixed summary");
                prompt::fallback_summary(capability, payload)
            }
        }
    }

    fn transition(&self, session_id: &str, state: TurnState) {
        debug!(session_id, state = %state, "Turn state");
    }
}

fn diagnostic_for(decision: &IntentDecision) -> Diagnostic {
    Diagnostic {
        server_used: decision
            .chosen_capability
            .as_ref()
            .map(|c| c.server_id.clone()),
        capability_used: decision
            .chosen_capability
            .as_ref()
            .map(|c| c.name.clone())
            .or_else(|| decision.requested_capability.clone()),
        confidence: decision.confidence,
        rationale: decision.rationale.clone(),
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use routebot_core::config::{IntentConfig, ServerConfig};
    use routebot_core::types::{LlmResponse, Message};
    use routebot_core::RetryPolicy;
    use routebot_mcp::{McpError, ServerListing};
    use routebot_providers::LlmError;
    use serde_json::{json, Map, Value};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Answers routing calls from a script; free-text calls get `reply`.
    struct MockProvider {
        decisions: Mutex<VecDeque<String>>,
        reply: Option<String>,
    }

    impl MockProvider {
        fn new(decisions: &[&str], reply: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                decisions: Mutex::new(decisions.iter().map(|s| s.to_string()).collect()),
                reply: reply.map(str::to_string),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for MockProvider {
        async fn chat(
            &self,
            messages: &[Message],
            _model: &str,
            _config: &LlmRequestConfig,
        ) -> Result<LlmResponse, LlmError> {
            let routing = messages
                .first()
                .and_then(Message::content)
                .is_some_and(|s| s.contains("request router"));
            let text = if routing {
                self.decisions.lock().unwrap().pop_front()
            } else {
                self.reply.clone()
            };
            match text {
                Some(t) => Ok(LlmResponse {
                    content: Some(t),
                    ..Default::default()
                }),
                None => Err(LlmError::Transport("unavailable".into())),
            }
        }

        fn default_model(&self) -> &str {
            "mock-model"
        }

        fn display_name(&self) -> &str {
            "MockProvider"
        }
    }

    /// Dispatcher with a fixed catalog and a fixed invocation outcome.
    struct MockDispatcher {
        catalog: Option<Vec<Capability>>,
        outcome: OperationResult,
        invocations: AtomicU32,
        discoveries: AtomicU32,
        /// When set, invocations never complete.
        hang: AtomicBool,
    }

    impl MockDispatcher {
        fn new(outcome: OperationResult) -> Arc<Self> {
            Arc::new(Self {
                catalog: Some(vec![search_products()]),
                outcome,
                invocations: AtomicU32::new(0),
                discoveries: AtomicU32::new(0),
                hang: AtomicBool::new(false),
            })
        }

        fn offline() -> Arc<Self> {
            Arc::new(Self {
                catalog: None,
                outcome: OperationResult::ok(Value::Null, 1),
                invocations: AtomicU32::new(0),
                discoveries: AtomicU32::new(0),
                hang: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl OperationDispatcher for MockDispatcher {
        fn servers(&self) -> Vec<ServerConfig> {
            vec![ServerConfig::new("shop", "http://localhost:8000/mcp")]
        }

        async fn discover(&self) -> Vec<ServerListing> {
            self.discoveries.fetch_add(1, Ordering::SeqCst);
            vec![ServerListing {
                server: "shop".into(),
                result: self.catalog.clone().ok_or(McpError::Connect {
                    server: "shop".into(),
                    reason: "refused".into(),
                }),
            }]
        }

        async fn invoke(&self, _: &Capability, _: &Map<String, Value>, _: Duration) -> OperationResult {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            if self.hang.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            self.outcome.clone()
        }
    }

    fn search_products() -> Capability {
        Capability::tool(
            "shop",
            "search_products",
            "Search products by category",
            json!({
                "type": "object",
                "properties": {"category": {"type": "string"}},
                "required": ["category"]
            }),
        )
    }

    fn orchestrator(provider: Arc<MockProvider>, dispatcher: Arc<MockDispatcher>) -> Orchestrator {
        let resolver = IntentResolver::new(
            provider.clone(),
            None,
            LlmRequestConfig::default(),
            RetryPolicy::none(),
            IntentConfig::default(),
        );
        Orchestrator::new(
            resolver,
            Arc::new(CapabilityRegistry::new()),
            dispatcher,
            Arc::new(SessionStore::new(10)),
            provider,
            "mock-model".into(),
            LlmRequestConfig::default().as_text(),
            OrchestratorSettings {
                invoke_deadline: Duration::from_secs(5),
                capability_ttl: Duration::from_secs(300),
                idle_timeout: Duration::from_secs(1800),
                history_turns: 6,
            },
        )
    }

    const SEARCH: &str = r#"{"capability": "search_products", "server": "shop", "arguments": {"category": "electronics"}, "confidence": 0.9, "rationale": "catalog search"}"#;

    fn three_products() -> OperationResult {
        OperationResult::ok(
            json!([{"name": "TV"}, {"name": "Phone"}, {"name": "Laptop"}]),
            1,
        )
    }

    #[tokio::test]
    async fn test_successful_dispatch_summarizes() {
        let provider = MockProvider::new(
            &[SEARCH],
            Some("You asked for electronics. I found 3 products: a TV, a phone and a laptop."),
        );
        let dispatcher = MockDispatcher::new(three_products());
        let orch = orchestrator(provider, dispatcher.clone());

        let resp = orch
            .handle_turn(TurnRequest::new("Show me all products in electronics"))
            .await;
        assert!(resp.success);
        assert!(resp.error.is_none());
        assert!(resp.response_text.contains("3 products"));
        let diag = resp.diagnostic.unwrap();
        assert_eq!(diag.capability_used.as_deref(), Some("search_products"));
        assert_eq!(diag.server_used.as_deref(), Some("shop"));
        assert_eq!(diag.confidence, 0.9);
        assert_eq!(dispatcher.invocations.load(Ordering::SeqCst), 1);

        let session = orch.sessions().get(&resp.session_id).unwrap();
        assert_eq!(session.turns.len(), 1);
        assert!(session.turns[0].result.as_ref().unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_turn_leaves_history_untouched() {
        let provider = MockProvider::new(&[SEARCH, SEARCH], Some("Found 3 products."));
        let dispatcher = MockDispatcher::new(three_products());
        let orch = orchestrator(provider, dispatcher.clone());

        let first = orch
            .handle_turn(TurnRequest::new("electronics").with_session("s"))
            .await;
        assert!(first.success);

        dispatcher.hang.store(true, Ordering::SeqCst);
        let abandoned = tokio::time::timeout(
            Duration::from_secs(1),
            orch.handle_turn(TurnRequest::new("more electronics").with_session("s")),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(dispatcher.invocations.load(Ordering::SeqCst), 2);

        let history = orch.sessions().history("s", 10);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].user_text, "electronics");
    }

    #[tokio::test]
    async fn test_summary_falls_back_when_llm_fails() {
        let provider = MockProvider::new(&[SEARCH], None);
        let orch = orchestrator(provider, MockDispatcher::new(three_products()));
        let resp = orch.handle_turn(TurnRequest::new("electronics")).await;
        assert!(resp.success);
        assert_eq!(
            resp.response_text,
            "I ran search_products and found 3 results: TV, Phone, Laptop."
        );
    }

    #[tokio::test]
    async fn test_gibberish_clarifies_without_dispatch() {
        let provider = MockProvider::new(
            &[r#"{"capability": null, "requires_clarification": true, "confidence": 0.1}"#],
            Some("Could you tell me what product you're looking for?"),
        );
        let dispatcher = MockDispatcher::new(three_products());
        let orch = orchestrator(provider, dispatcher.clone());

        let resp = orch.handle_turn(TurnRequest::new("asdkjasd")).await;
        assert!(resp.success);
        assert!(resp.error.is_none());
        assert_eq!(resp.response_text, "Could you tell me what product you're looking for?");
        assert_eq!(dispatcher.invocations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_capability_never_dispatches() {
        for name in ["drop_tables", "search_product", "SEARCH_PRODUCTS"] {
            let decision = format!(r#"{{"capability": "{name}", "confidence": 0.95}}"#);
            let provider = MockProvider::new(&[decision.as_str()], None);
            let dispatcher = MockDispatcher::new(three_products());
            let orch = orchestrator(provider, dispatcher.clone());

            let resp = orch.handle_turn(TurnRequest::new("do it")).await;
            assert!(resp.success);
            assert_eq!(dispatcher.invocations.load(Ordering::SeqCst), 0, "{name}");
            assert_eq!(resp.diagnostic.unwrap().capability_used.as_deref(), Some(name));
            // Fallback guidance lists what is available.
            assert!(resp.response_text.contains("search_products"));
        }
    }

    #[tokio::test]
    async fn test_connection_lost_reports_kind_without_detail() {
        let provider = MockProvider::new(&[SEARCH], None);
        let outcome = OperationResult::failed(
            ErrorKind::ConnectionLost,
            "connection to server 'shop' was lost",
            2,
        );
        let orch = orchestrator(provider, MockDispatcher::new(outcome));

        let resp = orch.handle_turn(TurnRequest::new("electronics")).await;
        assert!(!resp.success);
        assert_eq!(resp.error.as_deref(), Some("ConnectionLost"));
        assert_eq!(resp.response_text, failure_text(ErrorKind::ConnectionLost));
        assert!(!resp.response_text.contains("shop"));
    }

    #[tokio::test]
    async fn test_two_turns_dispatch_twice() {
        let provider = MockProvider::new(&[SEARCH, SEARCH], Some("Here you go."));
        let dispatcher = MockDispatcher::new(three_products());
        let orch = orchestrator(provider, dispatcher.clone());

        let first = orch.handle_turn(TurnRequest::new("electronics")).await;
        let second = orch
            .handle_turn(TurnRequest::new("electronics").with_session(first.session_id.clone()))
            .await;
        assert_eq!(first.session_id, second.session_id);
        assert_eq!(dispatcher.invocations.load(Ordering::SeqCst), 2);
        // Catalog fetched once, reused while fresh.
        assert_eq!(dispatcher.discoveries.load(Ordering::SeqCst), 1);
        assert_eq!(orch.sessions().history(&first.session_id, 10).len(), 2);
    }

    #[tokio::test]
    async fn test_registry_unavailable() {
        let provider = MockProvider::new(&[SEARCH], None);
        let orch = orchestrator(provider, MockDispatcher::offline());
        let resp = orch.handle_turn(TurnRequest::new("electronics")).await;
        assert!(!resp.success);
        assert_eq!(resp.error.as_deref(), Some("RegistryUnavailable"));
        assert!(resp.diagnostic.is_none());
        // The failed turn is still recorded.
        assert_eq!(orch.sessions().history(&resp.session_id, 10).len(), 1);
    }

    #[tokio::test]
    async fn test_parse_failure_is_reported() {
        let provider = MockProvider::new(&["no json here", "still none"], None);
        let dispatcher = MockDispatcher::new(three_products());
        let orch = orchestrator(provider, dispatcher.clone());
        let resp = orch.handle_turn(TurnRequest::new("electronics")).await;
        assert!(!resp.success);
        assert_eq!(resp.error.as_deref(), Some("IntentParseFailure"));
        assert_eq!(dispatcher.invocations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_concurrent_turns_share_state() {
        let decisions: Vec<&str> = vec![SEARCH; 8];
        let provider = MockProvider::new(&decisions, Some("ok"));
        let dispatcher = MockDispatcher::new(three_products());
        let orch = Arc::new(orchestrator(provider, dispatcher.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let orch = orch.clone();
                tokio::spawn(async move {
                    orch.handle_turn(TurnRequest::new("electronics").with_session("shared"))
                        .await
                })
            })
            .collect();
        for h in handles {
            assert!(h.await.unwrap().success);
        }
        assert_eq!(dispatcher.invocations.load(Ordering::SeqCst), 8);
        assert_eq!(orch.sessions().history("shared", 100).len(), 8);
    }

    #[test]
    fn test_failure_texts_are_distinct() {
        let kinds = [
            ErrorKind::ConnectionError,
            ErrorKind::Timeout,
            ErrorKind::Unreachable,
            ErrorKind::RemoteRejected,
            ErrorKind::ConnectionLost,
            ErrorKind::IntentParseFailure,
            ErrorKind::RegistryUnavailable,
            ErrorKind::Unknown,
        ];
        let texts: std::collections::HashSet<_> = kinds.iter().map(|k| failure_text(*k)).collect();
        assert_eq!(texts.len(), kinds.len());
    }
}
