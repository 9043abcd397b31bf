//! Per-conversation memory.
//!
//! Sessions live only in memory: capacity-bounded with least-recently-active
//! eviction, plus an idle-timeout sweep.

pub mod manager;

pub use manager::SessionStore;
