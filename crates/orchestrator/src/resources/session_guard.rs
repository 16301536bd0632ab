//! RAII guard for agent session lifecycle management.

use opencode::AgentSessions;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::Result;

/// The agent session currently driven by a task's run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveSession {
    pub session_id: String,
    pub working_dir: PathBuf,
}

/// Live agent sessions keyed by task, used to abort a task's session from outside its run.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<Uuid, LiveSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, task_id: Uuid) -> Option<LiveSession> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&task_id)
            .cloned()
    }

    fn insert(&self, task_id: Uuid, session: LiveSession) {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(task_id, session);
    }

    fn remove(&self, task_id: Uuid, session_id: &str) {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        if sessions
            .get(&task_id)
            .is_some_and(|live| live.session_id == session_id)
        {
            sessions.remove(&task_id);
        }
    }
}

/// Guard for one agent session.
///
/// Registers the session for its task while alive. When dropped without
/// reaching a terminal event it aborts the external session so the agent
/// does not keep working for a run nobody is waiting on.
///
/// ```ignore
/// let mut guard = SessionGuard::new(agent, registry, task_id, session_id, dir);
/// // ... wait for the session ...
/// guard.mark_completed(); // idle reached, nothing to abort
/// ```
pub struct SessionGuard {
    agent: Arc<dyn AgentSessions>,
    registry: Arc<SessionRegistry>,
    task_id: Uuid,
    session: LiveSession,
    completed: bool,
}

impl SessionGuard {
    pub fn new(
        agent: Arc<dyn AgentSessions>,
        registry: Arc<SessionRegistry>,
        task_id: Uuid,
        session_id: impl Into<String>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        let session = LiveSession {
            session_id: session_id.into(),
            working_dir: working_dir.into(),
        };
        registry.insert(task_id, session.clone());

        debug!(
            session_id = %session.session_id,
            task_id = %task_id,
            "Session guard created"
        );

        Self {
            agent,
            registry,
            task_id,
            session,
            completed: false,
        }
    }

    /// The session reached idle; dropping the guard no longer aborts it.
    pub fn mark_completed(&mut self) {
        debug!(session_id = %self.session.session_id, "Session marked as completed");
        self.completed = true;
    }

    /// Abort the session now instead of on drop.
    pub async fn abort(mut self) -> Result<()> {
        self.completed = true;
        self.agent
            .abort(&self.session.session_id, &self.session.working_dir)
            .await?;
        Ok(())
    }

}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.remove(self.task_id, &self.session.session_id);

        if self.completed {
            return;
        }

        warn!(
            session_id = %self.session.session_id,
            task_id = %self.task_id,
            "Session guard dropped without completion - aborting session"
        );

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let agent = Arc::clone(&self.agent);
        let session = self.session.clone();
        handle.spawn(async move {
            if let Err(e) = agent.abort(&session.session_id, &session.working_dir).await {
                warn!(session_id = %session.session_id, error = %e, "Failed to abort session");
            }
        });
    }
}
