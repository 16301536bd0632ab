use async_trait::async_trait;
use phaseflow_core::Task;
use serde_json::json;
use tracing::{info, warn};

use crate::core::{ContextUpdate, Phase, PhaseContext, PhaseSuccess};
use crate::error::{OrchestratorError, Result};
use crate::prompts::PhasePrompts;
use crate::services::{ExecutorContext, MessageParser, ReviewVerdict};
use crate::session_runner::{SessionConfig, SessionRunner};

/// Judge/fix loop.
///
/// A judge session reviews the branch. On `CHANGES_REQUESTED` a fix session
/// receives the feedback and the judge runs again, for at most
/// `max_judge_iterations` fix rounds.
pub struct JudgePhase;

impl JudgePhase {
    async fn judge(
        &self,
        ctx: &ExecutorContext,
        task: &Task,
        context: &PhaseContext,
        round: u32,
    ) -> Result<ReviewVerdict> {
        let output = SessionRunner::run(
            ctx,
            task,
            SessionConfig {
                phase: self.name(),
                title: format!("Judge #{}: {}", round + 1, task.summary_title()),
                prompt: PhasePrompts::judge(task, context),
                working_dir: context.working_dir.clone(),
            },
        )
        .await?;

        Ok(MessageParser::parse_review_response(&output.transcript))
    }

    async fn fix(
        &self,
        ctx: &ExecutorContext,
        task: &Task,
        context: &PhaseContext,
        feedback: &str,
        round: u32,
    ) -> Result<()> {
        SessionRunner::run(
            ctx,
            task,
            SessionConfig {
                phase: self.name(),
                title: format!("Fix #{}: {}", round, task.summary_title()),
                prompt: PhasePrompts::fix_issues(task, feedback),
                working_dir: context.working_dir.clone(),
            },
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Phase for JudgePhase {
    fn name(&self) -> &'static str {
        "judge"
    }

    async fn execute(
        &self,
        ctx: &ExecutorContext,
        task: &Task,
        context: &PhaseContext,
    ) -> Result<PhaseSuccess> {
        let max_fixes = ctx.config.max_judge_iterations;
        let mut fixes = 0;

        loop {
            let feedback = match self.judge(ctx, task, context, fixes).await? {
                ReviewVerdict::Approved => break,
                ReviewVerdict::ChangesRequested(feedback) => feedback,
            };

            if fixes >= max_fixes {
                warn!(task_id = %task.id, fixes, "Judge still requests changes, giving up");
                return Err(OrchestratorError::ExecutionFailed(format!(
                    "changes still requested after {} fix round(s): {}",
                    fixes, feedback
                )));
            }

            fixes += 1;
            info!(task_id = %task.id, round = fixes, "Judge requested changes, running fix");
            self.fix(ctx, task, context, &feedback, fixes).await?;
        }

        info!(task_id = %task.id, fixes, "Judge approved");

        Ok(PhaseSuccess::new(json!({ "approved": true, "fix_rounds": fixes })).with_updates(
            ContextUpdate {
                judge_iterations: Some(fixes),
                ..Default::default()
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ExecutorConfig;
    use crate::test_support::TestHarness;

    fn setup() -> (Task, PhaseContext) {
        let task = Task::new("Add login", "");
        let context = PhaseContext::for_task(&task, "/repo", "main");
        (task, context)
    }

    #[tokio::test]
    async fn test_approved_first_time() {
        let harness = TestHarness::new();
        harness.agent.reply("All good. APPROVED");
        let (task, context) = setup();

        let success = JudgePhase
            .execute(&harness.context(), &task, &context)
            .await
            .unwrap();

        assert_eq!(success.updates.judge_iterations, Some(0));
        assert_eq!(harness.agent.created().len(), 1);
    }

    #[tokio::test]
    async fn test_fix_round_then_approved() {
        let harness = TestHarness::new();
        harness.agent.reply("CHANGES_REQUESTED\n- missing tests");
        harness.agent.reply("Added tests.");
        harness.agent.reply("APPROVED");
        let (task, context) = setup();

        let success = JudgePhase
            .execute(&harness.context(), &task, &context)
            .await
            .unwrap();

        assert_eq!(success.updates.judge_iterations, Some(1));
        let inputs = harness.agent.inputs();
        assert_eq!(inputs.len(), 3);
        assert!(inputs[1].1.contains("- missing tests"));
    }

    #[tokio::test]
    async fn test_gives_up_after_max_rounds() {
        let harness =
            TestHarness::with_config(ExecutorConfig::new("/repo").with_max_judge_iterations(1));
        harness.agent.reply("CHANGES_REQUESTED\n- wrong");
        harness.agent.reply("fixed");
        harness.agent.reply("CHANGES_REQUESTED\n- still wrong");
        let (task, context) = setup();

        let err = JudgePhase
            .execute(&harness.context(), &task, &context)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("still wrong"));
        assert_eq!(harness.agent.inputs().len(), 3);
    }
}
