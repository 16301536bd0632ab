use async_trait::async_trait;
use phaseflow_core::Task;
use serde_json::json;
use tracing::info;

use crate::core::{ContextUpdate, Phase, PhaseContext, PhaseSuccess};
use crate::error::{OrchestratorError, Result};
use crate::prompts::PhasePrompts;
use crate::services::ExecutorContext;
use crate::session_runner::{SessionConfig, SessionRunner};

pub struct AnalysisPhase;

#[async_trait]
impl Phase for AnalysisPhase {
    fn name(&self) -> &'static str {
        "analysis"
    }

    async fn execute(
        &self,
        ctx: &ExecutorContext,
        task: &Task,
        context: &PhaseContext,
    ) -> Result<PhaseSuccess> {
        let output = SessionRunner::run(
            ctx,
            task,
            SessionConfig {
                phase: self.name(),
                title: format!("Analysis: {}", task.summary_title()),
                prompt: PhasePrompts::analysis(task, context),
                working_dir: context.working_dir.clone(),
            },
        )
        .await?;

        if output.transcript.is_empty() {
            return Err(OrchestratorError::ExecutionFailed(
                "analysis session produced no output".to_string(),
            ));
        }

        info!(task_id = %task.id, analysis_length = output.transcript.len(), "Analysis completed");

        Ok(PhaseSuccess::new(json!({
            "session_id": output.session_id,
            "analysis": output.transcript,
        }))
        .with_updates(ContextUpdate {
            analysis: Some(output.transcript),
            ..Default::default()
        }))
    }
}
