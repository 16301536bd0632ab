use db::PullRequestStore;
use events::{Event, NotificationBridge};
use opencode::AgentSessions;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use vcs::VersionControl;

use crate::approval::ApprovalGate;
use crate::error::{OrchestratorError, Result};
use crate::resources::{CancellationRegistry, SessionRegistry};
use crate::watcher::{CompletionWatcher, DEFAULT_SESSION_TIMEOUT};

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub session_timeout: Duration,
    pub base_branch: String,
    /// Fix rounds the judge phase may run before giving up
    pub max_judge_iterations: u32,
    pub draft_pull_requests: bool,
    pub repo_path: PathBuf,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            base_branch: "main".to_string(),
            max_judge_iterations: 2,
            draft_pull_requests: false,
            repo_path: PathBuf::from("."),
        }
    }
}

impl ExecutorConfig {
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
            ..Default::default()
        }
    }

    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    pub fn with_base_branch(mut self, branch: impl Into<String>) -> Self {
        self.base_branch = branch.into();
        self
    }

    pub fn with_max_judge_iterations(mut self, max: u32) -> Self {
        self.max_judge_iterations = max;
        self
    }

    pub fn with_draft_pull_requests(mut self, draft: bool) -> Self {
        self.draft_pull_requests = draft;
        self
    }
}

/// Collaborators and shared state every phase runs against.
pub struct ExecutorContext {
    pub config: ExecutorConfig,
    pub agent: Arc<dyn AgentSessions>,
    pub vcs: Arc<dyn VersionControl>,
    pub store: Arc<dyn PullRequestStore>,
    pub bridge: NotificationBridge,
    pub approvals: Arc<ApprovalGate>,
    pub sessions: Arc<SessionRegistry>,
    pub cancellations: Arc<CancellationRegistry>,
}

impl ExecutorContext {
    /// Build the context and wire the approval gate to the bridge's
    /// observer-join hook, so rejoining observers get the pending approval.
    pub fn new(
        config: ExecutorConfig,
        agent: Arc<dyn AgentSessions>,
        vcs: Arc<dyn VersionControl>,
        store: Arc<dyn PullRequestStore>,
        bridge: NotificationBridge,
    ) -> Self {
        let approvals = Arc::new(ApprovalGate::new(bridge.clone()));
        bridge.on_observer_join(&approvals);

        Self {
            config,
            agent,
            vcs,
            store,
            bridge,
            approvals,
            sessions: Arc::new(SessionRegistry::new()),
            cancellations: Arc::new(CancellationRegistry::new()),
        }
    }

    pub fn emit_event(&self, task_id: Uuid, event: Event) {
        self.bridge.to_task(task_id, event);
    }

    /// Fails with [`OrchestratorError::Cancelled`] once the task's run was cancelled
    pub fn ensure_not_cancelled(&self, task_id: Uuid) -> Result<()> {
        if self.cancellations.is_cancelled(task_id) {
            return Err(OrchestratorError::Cancelled(task_id));
        }
        Ok(())
    }

    pub fn watcher(&self) -> CompletionWatcher {
        CompletionWatcher::new(self.config.session_timeout)
    }
}
