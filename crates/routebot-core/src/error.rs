//! Error taxonomy shared by every layer of a turn.
//!
//! Components never raise these past the orchestrator: they travel inside
//! `OperationResult`s and turn responses as plain data, and the calling layer
//! branches on [`ErrorKind::as_str`] without parsing prose.

use serde::{Deserialize, Serialize};

/// Machine-readable failure category for a turn or a remote invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Remote server unreachable at connect/handshake time.
    ConnectionError,
    /// A call exceeded its deadline.
    Timeout,
    /// Transient network failure that persisted through every retry.
    Unreachable,
    /// The remote executed the operation but reported a failure.
    RemoteRejected,
    /// The connection broke mid-session and one reconnect did not help.
    ConnectionLost,
    /// The LLM output could not be turned into a decision.
    IntentParseFailure,
    /// The capability list is stale and could not be fetched.
    RegistryUnavailable,
    /// Unexpected internal fault.
    Unknown,
}

impl ErrorKind {
    /// Stable identifier used in the `error` field of turn responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ConnectionError => "ConnectionError",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Unreachable => "Unreachable",
            ErrorKind::RemoteRejected => "RemoteRejected",
            ErrorKind::ConnectionLost => "ConnectionLost",
            ErrorKind::IntentParseFailure => "IntentParseFailure",
            ErrorKind::RegistryUnavailable => "RegistryUnavailable",
            ErrorKind::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
