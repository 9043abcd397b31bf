//! Routebot agent: intent resolution and dispatch orchestration.
//!
//! A turn flows `handle_turn` → [`IntentResolver`] (LLM decision, parsed and
//! checked against the capability registry) → remote dispatch → reply.

pub mod bootstrap;
pub mod intent;
pub mod orchestrator;
pub mod parsing;
pub mod prompt;

pub use bootstrap::{build, Runtime};
pub use intent::{IntentResolver, ResolveError};
pub use orchestrator::{
    failure_text, Diagnostic, Orchestrator, OrchestratorSettings, TurnRequest, TurnResponse,
    TurnState,
};
pub use parsing::{parse_decision, ParseError, ParsedDecision};
