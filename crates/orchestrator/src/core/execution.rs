//! Runs one phase and brackets it with `phase:start` / `phase:complete`.

use events::Event;
use phaseflow_core::Task;
use tracing::{info, warn};

use crate::resources::PhaseGuard;
use crate::services::ExecutorContext;

use super::phase::{Phase, PhaseContext, PhaseResult};

pub struct ExecutionEngine<'a> {
    ctx: &'a ExecutorContext,
}

impl<'a> ExecutionEngine<'a> {
    pub fn new(ctx: &'a ExecutorContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &ExecutorContext {
        self.ctx
    }

    /// Execute a phase and return its result.
    ///
    /// Errors raised inside the phase never escape: they become a failed
    /// [`PhaseResult`] and are reported through `phase:complete` first.
    pub async fn execute(
        &self,
        phase: &dyn Phase,
        pipeline: &str,
        task: &Task,
        context: &PhaseContext,
    ) -> PhaseResult {
        let name = phase.name();
        info!(task_id = %task.id, phase = name, pipeline, "Executing phase");

        self.ctx.emit_event(
            task.id,
            Event::PhaseStart {
                phase: name.to_string(),
                pipeline: pipeline.to_string(),
                working_dir: context.working_dir.display().to_string(),
                branch_name: context.branch_name.clone(),
            },
        );
        let guard = PhaseGuard::new(self.ctx.bridge.clone(), task.id, name);

        let result = match phase.execute(self.ctx, task, context).await {
            Ok(success) => {
                info!(task_id = %task.id, phase = name, merged = ?success.merged, "Phase completed");
                PhaseResult::succeeded(name, success)
            }
            Err(e) => {
                warn!(
                    task_id = %task.id,
                    phase = name,
                    external = e.is_external(),
                    error = %e,
                    "Phase failed"
                );
                PhaseResult::failed(name, e.to_string())
            }
        };

        guard.complete(&result);
        result
    }
}
