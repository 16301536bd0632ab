//! Phase trait and the data passed between phases.

use async_trait::async_trait;
use phaseflow_core::{PullRequestRef, Task};
use serde::Serialize;
use std::path::PathBuf;

use crate::error::Result;
use crate::services::ExecutorContext;

/// Accumulating handoff record for one pipeline run.
///
/// Owned by exactly one in-flight run; phases read it and return a
/// [`ContextUpdate`] instead of mutating it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PhaseContext {
    pub working_dir: PathBuf,
    pub branch_name: String,
    pub base_branch: String,
    pub analysis: Option<String>,
    pub stories_completed: Option<u32>,
    pub stories_total: Option<u32>,
    pub judge_iterations: Option<u32>,
    pub pull_request: Option<PullRequestRef>,
    pub merged: Option<bool>,
}

impl PhaseContext {
    pub fn new(
        working_dir: impl Into<PathBuf>,
        branch_name: impl Into<String>,
        base_branch: impl Into<String>,
    ) -> Self {
        Self {
            working_dir: working_dir.into(),
            branch_name: branch_name.into(),
            base_branch: base_branch.into(),
            ..Default::default()
        }
    }

    /// Initial context for a task, falling back to the task's default branch
    pub fn for_task(task: &Task, working_dir: impl Into<PathBuf>, base_branch: &str) -> Self {
        let branch = task
            .branch_name
            .clone()
            .unwrap_or_else(|| task.default_branch_name());
        let mut context = Self::new(working_dir, branch, base_branch);
        context.pull_request = task.pull_request.clone();
        context
    }

    pub fn with_analysis(mut self, analysis: impl Into<String>) -> Self {
        self.analysis = Some(analysis.into());
        self
    }

    /// Merge a phase's output into the context. Unset fields are left alone.
    pub fn apply(&mut self, update: ContextUpdate) {
        if let Some(analysis) = update.analysis {
            self.analysis = Some(analysis);
        }
        if let Some(completed) = update.stories_completed {
            self.stories_completed = Some(completed);
        }
        if let Some(total) = update.stories_total {
            self.stories_total = Some(total);
        }
        if let Some(iterations) = update.judge_iterations {
            self.judge_iterations = Some(iterations);
        }
        if let Some(pr) = update.pull_request {
            self.pull_request = Some(pr);
        }
        if let Some(merged) = update.merged {
            self.merged = Some(merged);
        }
    }
}

/// Context fields a phase wants to hand to the phases after it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextUpdate {
    pub analysis: Option<String>,
    pub stories_completed: Option<u32>,
    pub stories_total: Option<u32>,
    pub judge_iterations: Option<u32>,
    pub pull_request: Option<PullRequestRef>,
    pub merged: Option<bool>,
}

impl ContextUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// What a phase returns when it executed correctly.
#[derive(Debug, Clone, Default)]
pub struct PhaseSuccess {
    pub output: serde_json::Value,
    pub updates: ContextUpdate,
    /// Set only by phases that end in a merge decision
    pub merged: Option<bool>,
}

impl PhaseSuccess {
    pub fn new(output: serde_json::Value) -> Self {
        Self {
            output,
            ..Default::default()
        }
    }

    pub fn with_updates(mut self, updates: ContextUpdate) -> Self {
        self.updates = updates;
        self
    }

    pub fn with_merged(mut self, merged: bool) -> Self {
        self.merged = Some(merged);
        self
    }
}

/// Outcome of one phase. Immutable once produced.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseResult {
    pub phase: String,
    pub success: bool,
    pub output: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merged: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub updates: ContextUpdate,
}

impl PhaseResult {
    pub fn succeeded(phase: impl Into<String>, success: PhaseSuccess) -> Self {
        Self {
            phase: phase.into(),
            success: true,
            output: success.output,
            merged: success.merged,
            error: None,
            updates: success.updates,
        }
    }

    pub fn failed(phase: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            phase: phase.into(),
            success: false,
            output: serde_json::Value::Null,
            merged: None,
            error: Some(error.into()),
            updates: ContextUpdate::default(),
        }
    }
}

/// One ordered step of a pipeline.
///
/// Implementations are stateless between invocations; everything a phase
/// needs comes from the task, the context, or the executor collaborators.
/// Returning `Err` is how a phase reports failure: the engine converts it
/// into a failed [`PhaseResult`].
#[async_trait]
pub trait Phase: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(
        &self,
        ctx: &ExecutorContext,
        task: &Task,
        context: &PhaseContext,
    ) -> Result<PhaseSuccess>;
}
