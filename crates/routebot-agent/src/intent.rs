//! Intent resolver: asks the LLM which capability a request needs and
//! checks the answer against the live catalog.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use routebot_core::config::IntentConfig;
use routebot_core::types::{Capability, ClarificationReason, IntentDecision, Message, Turn};
use routebot_core::{ErrorKind, RetryPolicy};
use routebot_mcp::{normalize_arguments, validate_arguments};
use routebot_providers::{LlmError, LlmProvider, LlmRequestConfig};

use crate::parsing::{parse_decision, ParseError, ParsedDecision};
use crate::prompt;

/// Why no decision could be produced.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("LLM call failed after {attempts} attempt(s): {source}")]
    Llm {
        attempts: u32,
        exhausted: bool,
        #[source]
        source: LlmError,
    },

    #[error("model output unusable after a corrective retry: {0}")]
    Parse(#[from] ParseError),
}

impl ResolveError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ResolveError::Llm { source, .. } if source.is_timeout() => ErrorKind::Timeout,
            ResolveError::Llm { exhausted: true, .. } => ErrorKind::Unreachable,
            ResolveError::Llm { .. } => ErrorKind::Unknown,
            ResolveError::Parse(_) => ErrorKind::IntentParseFailure,
        }
    }
}

/// Produces an [`IntentDecision`] for each user request.
pub struct IntentResolver {
    provider: Arc<dyn LlmProvider>,
    model: String,
    request: LlmRequestConfig,
    retry: RetryPolicy,
    settings: IntentConfig,
}

impl IntentResolver {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        model: Option<String>,
        request: LlmRequestConfig,
        retry: RetryPolicy,
        settings: IntentConfig,
    ) -> Self {
        let model = model.unwrap_or_else(|| provider.default_model().to_string());
        Self {
            provider,
            model,
            request,
            retry,
            settings,
        }
    }

    pub fn settings(&self) -> &IntentConfig {
        &self.settings
    }

    /// Resolve `user_text` against `capabilities`.
    ///
    /// Transient LLM failures are retried per the retry policy. Output that
    /// does not parse gets exactly one corrective follow-up.
    pub async fn resolve(
        &self,
        user_text: &str,
        capabilities: &[Capability],
        history: &[Turn],
    ) -> Result<IntentDecision, ResolveError> {
        let mut messages = prompt::resolution_messages(
            user_text,
            capabilities,
            history,
            self.settings.max_catalog_entries,
        );

        let first = self.complete(&messages).await?;
        let parsed = match parse_decision(&first) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "Unparseable decision, sending corrective prompt");
                messages.push(Message::assistant(first));
                messages.push(Message::user(prompt::corrective_prompt(&e.to_string())));
                let second = self.complete(&messages).await?;
                parse_decision(&second).inspect_err(|e| {
                    warn!(error = %e, "Decision still unparseable after corrective prompt");
                })?
            }
        };

        let decision = self.validate(parsed, capabilities);
        info!(
            capability = decision.chosen_capability.as_ref().map(|c| c.name.as_str()),
            confidence = decision.confidence,
            clarify = decision.requires_clarification,
            "Intent resolved"
        );
        Ok(decision)
    }

    /// One LLM exchange under the retry policy.
    async fn complete(&self, messages: &[Message]) -> Result<String, ResolveError> {
        self.retry
            .run(
                "llm",
                |attempt| {
                    debug!(attempt, model = %self.model, "Calling LLM");
                    self.provider.chat(messages, &self.model, &self.request)
                },
                LlmError::is_transient,
            )
            .await
            .map(|response| response.text().to_string())
            .map_err(|f| ResolveError::Llm {
                attempts: f.attempts,
                exhausted: f.exhausted,
                source: f.error,
            })
    }

    /// Map a parsed decision onto the catalog.
    ///
    /// Checks run in order: unknown capability, model-requested
    /// clarification, low confidence, then argument validation. The first
    /// that fails downgrades the decision.
    pub fn validate(&self, parsed: ParsedDecision, capabilities: &[Capability]) -> IntentDecision {
        let ParsedDecision {
            capability,
            server: _,
            mut arguments,
            confidence,
            rationale,
            requires_clarification,
            clarification_question,
        } = parsed;

        let Some(name) = capability else {
            let reason = if requires_clarification {
                ClarificationReason::ModelRequested
            } else {
                ClarificationReason::NoCapability
            };
            let mut decision = IntentDecision::clarify(reason, rationale);
            decision.confidence = confidence;
            decision.clarification_question = clarification_question;
            return decision;
        };

        let found = capabilities.iter().find(|c| c.name == name).cloned();
        if let Some(cap) = &found {
            normalize_arguments(&cap.parameter_schema, &mut arguments);
        }
        let mut decision = IntentDecision {
            chosen_capability: found,
            requested_capability: Some(name.clone()),
            arguments,
            confidence,
            rationale,
            requires_clarification: false,
            clarification: None,
            clarification_question,
        };

        let Some(cap) = decision.chosen_capability.clone() else {
            warn!(capability = %name, "Model chose a capability that is not in the registry");
            decision.downgrade(ClarificationReason::UnknownCapability(name));
            return decision;
        };
        if requires_clarification {
            decision.downgrade(ClarificationReason::ModelRequested);
        } else if confidence < self.settings.confidence_threshold {
            debug!(
                confidence,
                threshold = self.settings.confidence_threshold,
                "Confidence below threshold"
            );
            decision.downgrade(ClarificationReason::LowConfidence);
        } else if let Err(e) = validate_arguments(&cap, &decision.arguments) {
            warn!(capability = %cap.name, error = %e, "Arguments failed validation");
            decision.downgrade(ClarificationReason::InvalidArguments(e.to_string()));
        }
        decision
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use routebot_core::types::LlmResponse;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Replays scripted outcomes and counts calls.
    struct MockProvider {
        script: Mutex<VecDeque<Result<String, LlmError>>>,
        calls: AtomicU32,
        last_messages: Mutex<Vec<Message>>,
    }

    impl MockProvider {
        fn new(script: Vec<Result<&str, LlmError>>) -> Self {
            Self {
                script: Mutex::new(script.into_iter().map(|r| r.map(str::to_string)).collect()),
                calls: AtomicU32::new(0),
                last_messages: Mutex::new(Vec::new()),
            }
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
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_messages.lock().unwrap() = messages.to_vec();
            let next = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(LlmError::Decode("script exhausted".into())));
            next.map(|text| LlmResponse {
                content: Some(text),
                ..Default::default()
            })
        }

        fn default_model(&self) -> &str {
            "mock-model"
        }

        fn display_name(&self) -> &str {
            "MockProvider"
        }
    }

    fn catalog() -> Vec<Capability> {
        vec![Capability::tool(
            "shop",
            "search_products",
            "Search products",
            json!({
                "type": "object",
                "properties": {"category": {"type": "string"}, "limit": {"type": "integer"}},
                "required": ["category"]
            }),
        )]
    }

    fn resolver(provider: Arc<MockProvider>) -> IntentResolver {
        IntentResolver::new(
            provider,
            None,
            LlmRequestConfig::default(),
            RetryPolicy {
                max_retries: 2,
                base_delay_ms: 10,
                max_delay_ms: 50,
            },
            IntentConfig::default(),
        )
    }

    const GOOD: &str = r#"{"capability": "search_products", "arguments": {"category": "electronics"}, "confidence": 0.9, "rationale": "search"}"#;

    #[tokio::test]
    async fn test_confident_valid_decision_is_dispatchable() {
        let provider = Arc::new(MockProvider::new(vec![Ok(GOOD)]));
        let decision = resolver(provider.clone())
            .resolve("Show me all products in electronics", &catalog(), &[])
            .await
            .unwrap();
        assert!(decision.is_dispatchable());
        assert_eq!(decision.chosen_capability.unwrap().name, "search_products");
        assert_eq!(decision.arguments["category"], json!("electronics"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_capability_downgrades_with_rationale() {
        let provider = Arc::new(MockProvider::new(vec![Ok(
            r#"{"capability": "delete_everything", "confidence": 0.99, "rationale": "user asked"}"#,
        )]));
        let decision = resolver(provider).resolve("wipe it", &catalog(), &[]).await.unwrap();
        assert!(decision.requires_clarification);
        assert!(decision.chosen_capability.is_none());
        assert_eq!(decision.rationale, "user asked");
        assert_eq!(
            decision.clarification,
            Some(ClarificationReason::UnknownCapability("delete_everything".into()))
        );
        assert_eq!(decision.requested_capability.as_deref(), Some("delete_everything"));
    }

    #[tokio::test]
    async fn test_low_confidence_forces_clarification() {
        for confidence in [0.0, 0.2, 0.49] {
            let text = format!(
                r#"{{"capability": "search_products", "arguments": {{"category": "books"}}, "confidence": {confidence}}}"#
            );
            let provider = Arc::new(MockProvider::new(vec![Ok(text.as_str())]));
            let decision = resolver(provider).resolve("books?", &catalog(), &[]).await.unwrap();
            assert!(decision.requires_clarification, "confidence {confidence}");
            assert_eq!(decision.clarification, Some(ClarificationReason::LowConfidence));
        }
    }

    #[tokio::test]
    async fn test_model_requested_clarification() {
        let provider = Arc::new(MockProvider::new(vec![Ok(
            r#"{"capability": null, "requires_clarification": true, "confidence": 0.1, "clarification_question": "What are you looking for?"}"#,
        )]));
        let decision = resolver(provider).resolve("asdkjasd", &catalog(), &[]).await.unwrap();
        assert!(decision.requires_clarification);
        assert_eq!(decision.clarification, Some(ClarificationReason::ModelRequested));
        assert_eq!(
            decision.clarification_question.as_deref(),
            Some("What are you looking for?")
        );
    }

    #[tokio::test]
    async fn test_invalid_arguments_downgrade() {
        let provider = Arc::new(MockProvider::new(vec![Ok(
            r#"{"capability": "search_products", "arguments": {"limit": "5"}, "confidence": 0.9}"#,
        )]));
        let decision = resolver(provider).resolve("some products", &catalog(), &[]).await.unwrap();
        assert!(!decision.is_dispatchable());
        assert!(matches!(
            decision.clarification,
            Some(ClarificationReason::InvalidArguments(ref msg)) if msg.contains("category")
        ));
        // Coercion still applied.
        assert_eq!(decision.arguments["limit"], json!(5));
    }

    #[tokio::test]
    async fn test_corrective_retry_recovers() {
        let provider = Arc::new(MockProvider::new(vec![Ok("I would search products."), Ok(GOOD)]));
        let decision = resolver(provider.clone())
            .resolve("electronics please", &catalog(), &[])
            .await
            .unwrap();
        assert!(decision.is_dispatchable());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        let sent = provider.last_messages.lock().unwrap().clone();
        assert!(sent.last().unwrap().content().unwrap().contains("could not be used"));
        assert_eq!(sent[sent.len() - 2].content(), Some("I would search products."));
    }

    #[tokio::test]
    async fn test_parse_failure_after_corrective_retry() {
        let provider = Arc::new(MockProvider::new(vec![Ok("nope"), Ok("still nope")]));
        let err = resolver(provider.clone())
            .resolve("electronics", &catalog(), &[])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IntentParseFailure);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_llm_errors_are_retried() {
        let provider = Arc::new(MockProvider::new(vec![
            Err(LlmError::Status { status: 503, body: "busy".into() }),
            Err(LlmError::Transport("reset".into())),
            Ok(GOOD),
        ]));
        let decision = resolver(provider.clone())
            .resolve("electronics", &catalog(), &[])
            .await
            .unwrap();
        assert!(decision.is_dispatchable());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_llm_retry_budget() {
        let provider = Arc::new(MockProvider::new(vec![
            Err(LlmError::Transport("down".into())),
            Err(LlmError::Transport("down".into())),
            Err(LlmError::Transport("down".into())),
        ]));
        let err = resolver(provider.clone())
            .resolve("electronics", &catalog(), &[])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unreachable);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_llm_error_not_retried() {
        let provider = Arc::new(MockProvider::new(vec![Err(LlmError::Status {
            status: 401,
            body: "bad key".into(),
        })]));
        let err = resolver(provider.clone())
            .resolve("electronics", &catalog(), &[])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unknown);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }
}
