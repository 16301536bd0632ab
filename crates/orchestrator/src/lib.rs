pub mod approval;
pub mod core;
pub mod error;
pub mod executor;
pub mod phases;
pub mod pipeline;
pub mod prompts;
pub mod resources;
pub mod services;
pub mod session_runner;
pub mod watcher;

#[cfg(test)]
mod test_support;

pub use approval::{ApprovalDecision, ApprovalGate};
pub use self::core::{ContextUpdate, ExecutionEngine, Phase, PhaseContext, PhaseResult, PhaseSuccess};
pub use error::{OrchestratorError, Result};
pub use executor::{CancelOutcome, OrchestrationResult, Orchestrator};
pub use pipeline::{standard_pipelines, Pipeline, PipelineInfo};
pub use services::{ExecutorConfig, ExecutorContext};
pub use watcher::{CompletionWatcher, DEFAULT_SESSION_TIMEOUT};
