//! Routebot remote capability layer.
//!
//! Talks to tool servers over JSON-RPC 2.0 on HTTP, keeps the capability
//! catalog, and validates arguments before anything leaves the process.

pub mod client;
pub mod error;
pub mod pool;
pub mod registry;
pub mod transport;
pub mod types;
pub mod validation;

pub use client::{Connection, RemoteClient};
pub use error::McpError;
pub use pool::{OperationDispatcher, ServerListing, ServerPool, ServerStatus};
pub use registry::{CapabilityRegistry, RegistryUnavailable, Snapshot};
pub use transport::{Connector, HttpConnector, HttpTransport, Transport};
pub use validation::{normalize_arguments, validate_arguments};
