//! Core abstractions for the orchestrator execution model.
//!
//! - [`Phase`] - Trait that all pipeline phases implement
//! - [`PhaseContext`] - Handoff record threaded through one pipeline run
//! - [`ExecutionEngine`] - Runs one phase and brackets it with notifications

mod execution;
mod phase;

pub use execution::ExecutionEngine;
pub use phase::{ContextUpdate, Phase, PhaseContext, PhaseResult, PhaseSuccess};
