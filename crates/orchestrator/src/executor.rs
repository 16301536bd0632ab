use events::Event;
use phaseflow_core::Task;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::approval::ApprovalDecision;
use crate::core::{ExecutionEngine, PhaseContext, PhaseResult};
use crate::error::{OrchestratorError, Result};
use crate::pipeline::{Pipeline, PipelineInfo};
use crate::services::ExecutorContext;

/// Aggregate of one pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct OrchestrationResult {
    pub pipeline: String,
    pub task_id: Uuid,
    pub results: Vec<PhaseResult>,
    pub success: bool,
    /// Error of the first failing phase
    pub error: Option<String>,
    pub context: PhaseContext,
}

impl OrchestrationResult {
    pub fn failed_phase(&self) -> Option<&PhaseResult> {
        self.results.iter().find(|r| !r.success)
    }
}

/// What [`Orchestrator::cancel`] found to cancel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CancelOutcome {
    pub running: bool,
    pub approval_cancelled: bool,
    pub session_aborted: bool,
}

/// Pipeline registry and runner.
///
/// Registration takes `&mut self` and happens before the orchestrator is
/// shared; runs take `&self` and may proceed concurrently for different tasks.
pub struct Orchestrator {
    ctx: Arc<ExecutorContext>,
    pipelines: BTreeMap<String, Pipeline>,
    active: Mutex<HashSet<Uuid>>,
}

impl Orchestrator {
    pub fn new(ctx: Arc<ExecutorContext>) -> Self {
        Self {
            ctx,
            pipelines: BTreeMap::new(),
            active: Mutex::new(HashSet::new()),
        }
    }

    pub fn context(&self) -> &Arc<ExecutorContext> {
        &self.ctx
    }

    pub fn register_pipeline(&mut self, pipeline: Pipeline) -> Result<()> {
        if self.pipelines.contains_key(pipeline.name()) {
            return Err(OrchestratorError::DuplicatePipelineName(
                pipeline.name().to_string(),
            ));
        }
        info!(pipeline = pipeline.name(), phases = ?pipeline.phase_names(), "Pipeline registered");
        self.pipelines.insert(pipeline.name().to_string(), pipeline);
        Ok(())
    }

    pub fn pipeline(&self, name: &str) -> Option<&Pipeline> {
        self.pipelines.get(name)
    }

    pub fn pipelines(&self) -> Vec<PipelineInfo> {
        self.pipelines.values().map(Pipeline::info).collect()
    }

    pub fn is_running(&self, task_id: Uuid) -> bool {
        self.lock_active().contains(&task_id)
    }

    /// Initial context for `task` from the executor configuration
    pub fn initial_context(&self, task: &Task) -> PhaseContext {
        PhaseContext::for_task(task, &self.ctx.config.repo_path, &self.ctx.config.base_branch)
    }

    /// Run `pipeline_name` for `task`, phases strictly in order, stopping at
    /// the first failure.
    ///
    /// The phases run in the task's own workspace on its own branch, prepared
    /// under `initial.working_dir` before the first phase. The workspace is
    /// removed once the run has merged.
    pub async fn run(
        &self,
        pipeline_name: &str,
        task: &Task,
        initial: PhaseContext,
    ) -> Result<OrchestrationResult> {
        let pipeline = self
            .pipelines
            .get(pipeline_name)
            .ok_or_else(|| OrchestratorError::PipelineNotFound(pipeline_name.to_string()))?;

        let slot = self.claim_run(task.id)?;

        info!(task_id = %task.id, pipeline = pipeline_name, "Pipeline started");
        self.ctx.emit_event(
            task.id,
            Event::PipelineStart {
                pipeline: pipeline_name.to_string(),
                phases: pipeline.phase_names(),
            },
        );

        let engine = ExecutionEngine::new(&self.ctx);
        let repo = initial.working_dir.clone();
        let mut context = initial;
        let mut results = Vec::with_capacity(pipeline.phases().len());
        let mut error = self
            .enter_workspace(task, &mut context)
            .await
            .err()
            .map(|e| e.to_string());

        if error.is_none() {
            for phase in pipeline.phases() {
                if slot.token.is_cancelled() {
                    error = Some(OrchestratorError::Cancelled(task.id).to_string());
                    break;
                }

                let result = engine
                    .execute(phase.as_ref(), pipeline_name, task, &context)
                    .await;

                if !result.success {
                    error = result.error.clone();
                    results.push(result);
                    break;
                }

                context.apply(result.updates.clone());
                results.push(result);
            }
        }

        // A cancel that lands during the last phase still fails the run
        if error.is_none() && slot.token.is_cancelled() {
            error = Some(OrchestratorError::Cancelled(task.id).to_string());
        }

        let success = error.is_none();
        if success {
            info!(task_id = %task.id, pipeline = pipeline_name, "Pipeline completed");
            if context.merged == Some(true) {
                self.leave_workspace(task, &repo, &context).await;
            }
        } else {
            warn!(task_id = %task.id, pipeline = pipeline_name, error = ?error, "Pipeline failed");
        }

        self.ctx.emit_event(
            task.id,
            Event::PipelineComplete {
                pipeline: pipeline_name.to_string(),
                success,
                error: error.clone(),
            },
        );

        Ok(OrchestrationResult {
            pipeline: pipeline_name.to_string(),
            task_id: task.id,
            results,
            success,
            error,
            context,
        })
    }

    pub fn resolve_approval(&self, task_id: Uuid, approved: bool) -> Result<()> {
        self.ctx
            .approvals
            .resolve(task_id, ApprovalDecision::from_approved(approved))
    }

    /// Cancel a task's run and abort its live agent session.
    ///
    /// Trips the run's cancellation token, which stops the run before its next
    /// phase and the merge phase before approval or merge. A pending approval
    /// ends at once.
    pub async fn cancel(&self, task_id: Uuid) -> Result<CancelOutcome> {
        let approval_cancelled = self.ctx.approvals.cancel(task_id);

        let running = {
            let active = self.lock_active();
            active.contains(&task_id) && self.ctx.cancellations.cancel(task_id)
        };

        let session_aborted = match self.ctx.sessions.get(task_id) {
            Some(live) => {
                self.ctx
                    .agent
                    .abort(&live.session_id, &live.working_dir)
                    .await?;
                true
            }
            None => false,
        };

        info!(task_id = %task_id, running, approval_cancelled, session_aborted, "Cancel requested");

        Ok(CancelOutcome {
            running,
            approval_cancelled,
            session_aborted,
        })
    }

    async fn enter_workspace(&self, task: &Task, context: &mut PhaseContext) -> Result<()> {
        let workspace = self
            .ctx
            .vcs
            .prepare_workspace(&context.working_dir, &context.branch_name, &context.base_branch)
            .await?;
        info!(
            task_id = %task.id,
            workspace = %workspace.display(),
            branch = %context.branch_name,
            "Workspace ready"
        );
        context.working_dir = workspace;
        Ok(())
    }

    async fn leave_workspace(&self, task: &Task, repo: &Path, context: &PhaseContext) {
        if context.working_dir == repo {
            return;
        }
        if let Err(e) = self
            .ctx
            .vcs
            .cleanup_workspace(repo, &context.working_dir, &context.branch_name)
            .await
        {
            warn!(task_id = %task.id, error = %e, "Failed to clean up workspace");
        }
    }

    fn claim_run(&self, task_id: Uuid) -> Result<RunSlot<'_>> {
        let mut active = self.lock_active();
        if !active.insert(task_id) {
            return Err(OrchestratorError::RunInProgress(task_id));
        }
        let token = self.ctx.cancellations.register(task_id);
        Ok(RunSlot {
            orchestrator: self,
            task_id,
            token,
        })
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, HashSet<Uuid>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases the task's run slot and cancellation token when the run ends or is dropped
struct RunSlot<'a> {
    orchestrator: &'a Orchestrator,
    task_id: Uuid,
    token: CancellationToken,
}

impl Drop for RunSlot<'_> {
    fn drop(&mut self) {
        let mut active = self.orchestrator.lock_active();
        active.remove(&self.task_id);
        self.orchestrator.ctx.cancellations.remove(self.task_id);
    }
}
