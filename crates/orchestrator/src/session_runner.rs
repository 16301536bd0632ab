//! Runs one agent session to completion on behalf of a phase.
//!
//! Subscribes to the event stream before sending input so no event of the
//! new session can be missed, forwards the session's informational events to
//! observers as `session:activity`, and returns the assistant transcript once
//! the session goes idle.

use events::Event;
use opencode::{SessionEvent, SessionEventKind};
use phaseflow_core::Task;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::resources::SessionGuard;
use crate::services::{ExecutorContext, MessageParser};

/// Configuration for running a session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Phase the session runs for; used in activity notifications
    pub phase: &'static str,
    pub title: String,
    pub prompt: String,
    pub working_dir: PathBuf,
}

/// A session that reached idle
#[derive(Debug, Clone)]
pub struct SessionOutput {
    pub session_id: String,
    pub transcript: String,
    pub events: Vec<SessionEvent>,
}

pub struct SessionRunner;

impl SessionRunner {
    pub async fn run(ctx: &ExecutorContext, task: &Task, config: SessionConfig) -> Result<SessionOutput> {
        let session = ctx
            .agent
            .create_session(&config.working_dir, &config.title)
            .await?;
        let session_id = session.id;

        info!(
            task_id = %task.id,
            phase = config.phase,
            session_id = %session_id,
            "Agent session created"
        );

        let mut guard = SessionGuard::new(
            ctx.agent.clone(),
            ctx.sessions.clone(),
            task.id,
            session_id.clone(),
            config.working_dir.clone(),
        );

        let mut subscription = ctx.agent.subscribe(&config.working_dir).await?;
        ctx.agent
            .send_input(&session_id, &config.working_dir, &config.prompt)
            .await?;
        debug!(session_id = %session_id, prompt_length = config.prompt.len(), "Prompt sent");

        let bridge = ctx.bridge.clone();
        let task_id = task.id;
        let phase = config.phase;
        let watched = session_id.clone();
        let outcome = ctx
            .watcher()
            .wait_for_terminal(&mut subscription, &session_id, move |event| {
                if event.belongs_to(&watched) && event.kind() == SessionEventKind::Activity {
                    bridge.to_task(
                        task_id,
                        Event::SessionActivity {
                            phase: phase.to_string(),
                            session_id: watched.clone(),
                            event_type: event.event_type.clone(),
                            properties: event.properties.clone(),
                        },
                    );
                }
            })
            .await;

        match outcome {
            Ok(events) => {
                guard.mark_completed();
                let transcript = MessageParser::transcript(&events, &session_id);
                info!(
                    task_id = %task.id,
                    session_id = %session_id,
                    event_count = events.len(),
                    transcript_length = transcript.len(),
                    "Agent session completed"
                );
                Ok(SessionOutput {
                    session_id,
                    transcript,
                    events,
                })
            }
            Err(failure) => {
                warn!(
                    task_id = %task.id,
                    session_id = %session_id,
                    error = %failure.error,
                    event_count = failure.events.len(),
                    "Agent session failed"
                );
                if let Err(e) = guard.abort().await {
                    warn!(session_id = %session_id, error = %e, "Failed to abort session");
                }
                Err(failure.error)
            }
        }
    }
}
