//! Remote client error types.

use routebot_core::ErrorKind;
use thiserror::Error;

/// Errors that can occur while talking to a remote tool server.
#[derive(Debug, Clone, Error)]
pub enum McpError {
    /// Connect or `initialize` handshake failed.
    #[error("failed to connect to server '{server}': {reason}")]
    Connect { server: String, reason: String },

    /// A call exceeded its time bound.
    #[error("'{operation}' timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Network-level failure (refused, reset, 5xx gateway).
    #[error("transport error for server '{server}': {reason}")]
    Transport { server: String, reason: String },

    /// The server forgot our session or the connection broke mid-session.
    #[error("connection to server '{server}' was lost")]
    ConnectionLost { server: String },

    /// The server executed the call and reported a failure.
    #[error("server rejected the call [{code}]: {message}")]
    Rejected { code: i32, message: String },

    /// Malformed or unexpected message.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Capability not found in the registry or on the server.
    #[error("unknown capability: '{name}'")]
    UnknownCapability { name: String },

    /// Arguments failed schema validation.
    #[error("invalid arguments for '{capability}': {reason}")]
    InvalidArguments { capability: String, reason: String },
}

impl McpError {
    /// Whether a fresh attempt on the same connection could succeed.
    ///
    /// Lost connections are handled by a reconnect, not a plain retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, McpError::Timeout { .. } | McpError::Transport { .. })
    }

    /// The turn-level category for this failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            McpError::Connect { .. } => ErrorKind::ConnectionError,
            McpError::Timeout { .. } => ErrorKind::Timeout,
            McpError::Transport { .. } => ErrorKind::Unreachable,
            McpError::ConnectionLost { .. } => ErrorKind::ConnectionLost,
            McpError::Rejected { .. } | McpError::InvalidArguments { .. } => {
                ErrorKind::RemoteRejected
            }
            McpError::UnknownCapability { .. } => ErrorKind::RemoteRejected,
            McpError::Protocol(_) => ErrorKind::Unknown,
        }
    }
}
