//! Core types for Routebot.
//!
//! Two families live here: the OpenAI chat-completions wire format used to talk
//! to the LLM service, and the routing data model (capabilities, intent
//! decisions, operation results, turns and sessions) that flows through a turn.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ErrorKind;

// ─────────────────────────────────────────────
// Messages (OpenAI chat completions format)
// ─────────────────────────────────────────────

/// A chat message in the OpenAI format.
///
/// Each variant maps to a `role` field value.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "role")]
pub enum Message {
    #[serde(rename = "system")]
    System { content: String },

    #[serde(rename = "user")]
    User { content: String },

    #[serde(rename = "assistant")]
    Assistant {
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },
}

impl Message {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Message::System {
            content: content.into(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Message::User {
            content: content.into(),
        }
    }

    /// Create an assistant message with text content.
    pub fn assistant(content: impl Into<String>) -> Self {
        Message::Assistant {
            content: Some(content.into()),
        }
    }

    /// Text content of the message, if any.
    pub fn content(&self) -> Option<&str> {
        match self {
            Message::System { content } | Message::User { content } => Some(content),
            Message::Assistant { content } => content.as_deref(),
        }
    }
}

// ─────────────────────────────────────────────
// LLM Response
// ─────────────────────────────────────────────

/// Response from an LLM provider after a chat completion call.
#[derive(Clone, Debug, Default)]
pub struct LlmResponse {
    /// Text content from the assistant.
    pub content: Option<String>,
    /// Why the model stopped generating.
    pub finish_reason: Option<String>,
    /// Token usage statistics.
    pub usage: Option<UsageInfo>,
}

impl LlmResponse {
    /// Content as a trimmed string slice, empty when absent.
    pub fn text(&self) -> &str {
        self.content.as_deref().map(str::trim).unwrap_or("")
    }
}

/// Token usage statistics from the LLM.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UsageInfo {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Raw chat completion response from an OpenAI-compatible API.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: Option<String>,
    pub choices: Vec<ChatChoice>,
    pub usage: Option<UsageInfo>,
}

/// A single choice in a chat completion response.
#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: AssistantMessage,
    pub finish_reason: Option<String>,
}

/// The assistant message within a chat completion choice.
#[derive(Debug, Deserialize)]
pub struct AssistantMessage {
    pub content: Option<String>,
}

impl From<ChatCompletionResponse> for LlmResponse {
    fn from(resp: ChatCompletionResponse) -> Self {
        match resp.choices.into_iter().next() {
            Some(c) => LlmResponse {
                content: c.message.content,
                finish_reason: c.finish_reason,
                usage: resp.usage,
            },
            None => LlmResponse {
                usage: resp.usage,
                ..Default::default()
            },
        }
    }
}

/// Request body for an OpenAI-compatible chat completion API.
#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    /// Omitted for Azure, where the deployment in the URL selects the model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

/// `response_format` request field (`{"type": "json_object"}`).
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub format_type: String,
}

impl ResponseFormat {
    pub fn json_object() -> Self {
        ResponseFormat {
            format_type: "json_object".to_string(),
        }
    }
}

// ─────────────────────────────────────────────
// Capabilities
// ─────────────────────────────────────────────

/// Whether a capability is invoked (tool) or read (resource).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityKind {
    Tool,
    Resource,
}

impl std::fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CapabilityKind::Tool => f.write_str("tool"),
            CapabilityKind::Resource => f.write_str("resource"),
        }
    }
}

/// A named operation advertised by a remote server.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Capability {
    /// Unique within its server.
    pub name: String,
    pub kind: CapabilityKind,
    #[serde(default)]
    pub description: String,
    /// JSON Schema of accepted arguments (`{"type":"object",...}`).
    #[serde(default)]
    pub parameter_schema: Value,
    /// Name of the configured server that advertises this capability.
    pub server_id: String,
    /// Resource URI; `None` for tools.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

impl Capability {
    /// Create a tool capability.
    pub fn tool(
        server_id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        parameter_schema: Value,
    ) -> Self {
        Capability {
            name: name.into(),
            kind: CapabilityKind::Tool,
            description: description.into(),
            parameter_schema,
            server_id: server_id.into(),
            uri: None,
        }
    }

    /// Create a resource capability. Resources take no arguments.
    pub fn resource(
        server_id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        uri: impl Into<String>,
    ) -> Self {
        Capability {
            name: name.into(),
            kind: CapabilityKind::Resource,
            description: description.into(),
            parameter_schema: serde_json::json!({"type": "object", "properties": {}}),
            server_id: server_id.into(),
            uri: Some(uri.into()),
        }
    }

    /// Names listed under the schema's `required` array.
    pub fn required_parameters(&self) -> Vec<&str> {
        self.parameter_schema
            .get("required")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

// ─────────────────────────────────────────────
// Intent decisions
// ─────────────────────────────────────────────

/// Why a decision asks the user for more detail instead of dispatching.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail")]
pub enum ClarificationReason {
    /// The model itself said the request was ambiguous.
    ModelRequested,
    /// No capability was chosen.
    NoCapability,
    /// Confidence fell below the configured threshold.
    LowConfidence,
    /// The model named a capability the registry does not hold.
    UnknownCapability(String),
    /// Arguments did not satisfy the capability's schema.
    InvalidArguments(String),
}

/// The structured outcome of asking the LLM which capability matches a request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntentDecision {
    /// Validated registry entry; never set for a name the registry lacks.
    pub chosen_capability: Option<Capability>,
    /// Capability name as the model wrote it, kept for diagnostics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_capability: Option<String>,
    #[serde(default)]
    pub arguments: Map<String, Value>,
    /// Always within `[0, 1]`.
    pub confidence: f64,
    #[serde(default)]
    pub rationale: String,
    pub requires_clarification: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clarification: Option<ClarificationReason>,
    /// Follow-up question proposed by the model, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clarification_question: Option<String>,
}

impl IntentDecision {
    /// A decision that dispatches nothing and asks the user for detail.
    pub fn clarify(reason: ClarificationReason, rationale: impl Into<String>) -> Self {
        IntentDecision {
            chosen_capability: None,
            requested_capability: None,
            arguments: Map::new(),
            confidence: 0.0,
            rationale: rationale.into(),
            requires_clarification: true,
            clarification: Some(reason),
            clarification_question: None,
        }
    }

    /// Downgrade to a clarification, keeping the rationale and the requested name.
    pub fn downgrade(&mut self, reason: ClarificationReason) {
        if let Some(cap) = self.chosen_capability.take() {
            self.requested_capability.get_or_insert(cap.name);
        }
        self.requires_clarification = true;
        self.clarification = Some(reason);
    }

    /// Whether the decision may be dispatched.
    pub fn is_dispatchable(&self) -> bool {
        !self.requires_clarification && self.chosen_capability.is_some()
    }
}

// ─────────────────────────────────────────────
// Operation results
// ─────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Ok,
    Failed,
}

/// Typed failure carried by a failed [`OperationResult`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperationError {
    pub kind: ErrorKind,
    /// Internal detail; logged, never shown to the user.
    pub message: String,
}

/// Outcome of one remote invocation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    pub status: OperationStatus,
    pub payload: Option<Value>,
    pub error: Option<OperationError>,
    /// Wire attempts made, including retries.
    #[serde(default)]
    pub attempts: u32,
}

impl OperationResult {
    pub fn ok(payload: Value, attempts: u32) -> Self {
        OperationResult {
            status: OperationStatus::Ok,
            payload: Some(payload),
            error: None,
            attempts,
        }
    }

    pub fn failed(kind: ErrorKind, message: impl Into<String>, attempts: u32) -> Self {
        OperationResult {
            status: OperationStatus::Failed,
            payload: None,
            error: Some(OperationError {
                kind,
                message: message.into(),
            }),
            attempts,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == OperationStatus::Ok
    }

    /// Error kind of a failed result.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

// ─────────────────────────────────────────────
// Session types
// ─────────────────────────────────────────────

/// One completed request/response cycle.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Turn {
    pub user_text: String,
    pub decision: Option<IntentDecision>,
    pub result: Option<OperationResult>,
    pub response_text: String,
    pub at: chrono::DateTime<chrono::Utc>,
}

impl Turn {
    pub fn new(user_text: impl Into<String>, response_text: impl Into<String>) -> Self {
        Turn {
            user_text: user_text.into(),
            decision: None,
            result: None,
            response_text: response_text.into(),
            at: chrono::Utc::now(),
        }
    }

    /// Replay as a user/assistant message pair for prompt history.
    pub fn to_messages(&self) -> [Message; 2] {
        [
            Message::user(self.user_text.clone()),
            Message::assistant(self.response_text.clone()),
        ]
    }
}

/// A bounded-lifetime conversation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub turns: Vec<Turn>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub last_active_at: chrono::DateTime<chrono::Utc>,
}

impl Session {
    /// Create a new empty session.
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = chrono::Utc::now();
        Session {
            session_id: session_id.into(),
            user_id: None,
            turns: Vec::new(),
            created_at: now,
            last_active_at: now,
        }
    }

    /// The most recent `n` turns, oldest first.
    pub fn recent_turns(&self, n: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
