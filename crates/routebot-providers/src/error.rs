//! Errors from a single LLM call.

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("LLM call timed out after {0:?}")]
    Timeout(Duration),

    #[error("LLM transport error: {0}")]
    Transport(String),

    #[error("LLM API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode LLM response: {0}")]
    Decode(String),
}

impl LlmError {
    /// Whether another attempt could plausibly succeed.
    ///
    /// Timeouts, transport failures and HTTP 408/429/5xx are transient; other
    /// statuses and undecodable bodies are not.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::Timeout(_) | LlmError::Transport(_) => true,
            LlmError::Status { status, .. } => {
                matches!(*status, 408 | 429) || (500..600).contains(status)
            }
            LlmError::Decode(_) => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, LlmError::Timeout(_))
    }

    /// Classify a `reqwest` failure for a call bounded by `timeout`.
    pub fn from_reqwest(e: reqwest::Error, timeout: Duration) -> Self {
        if e.is_timeout() {
            LlmError::Timeout(timeout)
        } else if e.is_decode() {
            LlmError::Decode(e.to_string())
        } else {
            LlmError::Transport(e.to_string())
        }
    }
}
