use async_trait::async_trait;
use phaseflow_core::Task;
use serde_json::json;
use tracing::{info, warn};

use crate::core::{ContextUpdate, Phase, PhaseContext, PhaseSuccess};
use crate::error::Result;
use crate::prompts::PhasePrompts;
use crate::services::{ExecutorContext, MessageParser};
use crate::session_runner::{SessionConfig, SessionRunner};

pub struct DevelopmentPhase;

#[async_trait]
impl Phase for DevelopmentPhase {
    fn name(&self) -> &'static str {
        "development"
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
                title: format!("Development: {}", task.summary_title()),
                prompt: PhasePrompts::development(task, context),
                working_dir: context.working_dir.clone(),
            },
        )
        .await?;

        let stories = MessageParser::parse_stories(&output.transcript);
        match stories {
            Some((completed, total)) => {
                info!(task_id = %task.id, completed, total, "Development completed");
            }
            None => warn!(task_id = %task.id, "Development report has no STORIES line"),
        }

        Ok(PhaseSuccess::new(json!({
            "session_id": output.session_id,
            "stories_completed": stories.map(|(completed, _)| completed),
            "stories_total": stories.map(|(_, total)| total),
        }))
        .with_updates(ContextUpdate {
            stories_completed: stories.map(|(completed, _)| completed),
            stories_total: stories.map(|(_, total)| total),
            ..Default::default()
        }))
    }
}
