//! Routebot core: shared types, error taxonomy, retry policy, configuration,
//! and the in-memory session store.
//!
//! Every other crate in the workspace depends on this one.

pub mod config;
pub mod error;
pub mod retry;
pub mod session;
pub mod types;
pub mod utils;

pub use error::ErrorKind;
pub use retry::{RetryFailure, RetryPolicy};
