//! In-memory collaborators for orchestrator tests.

use async_trait::async_trait;
use db::{DbError, PullRequestStore};
use events::NotificationBridge;
use opencode::{AgentSessions, EventSubscription, OpenCodeError, Session, SessionEvent};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;
use vcs::{
    CheckSummary, CreatePrRequest, MergeOptions, PrState, PrStatus, PullRequestInfo,
    VcsError, VersionControl,
};

use crate::services::{ExecutorConfig, ExecutorContext};

/// What the fake agent does with the next input it receives
#[derive(Debug, Clone)]
pub enum Script {
    /// Stream `text` as the assistant's reply, then go idle
    Reply(String),
    /// Report a session error
    Fail(String),
    /// Never answer
    Silent,
}

type Subscriber = mpsc::Sender<Result<SessionEvent, OpenCodeError>>;

#[derive(Default)]
pub struct FakeAgent {
    scripts: Mutex<VecDeque<Script>>,
    subscribers: Mutex<Vec<Subscriber>>,
    created: Mutex<Vec<String>>,
    inputs: Mutex<Vec<(String, String)>>,
    aborted: Mutex<Vec<String>>,
}

impl FakeAgent {
    pub fn script(&self, script: Script) {
        self.scripts.lock().unwrap().push_back(script);
    }

    pub fn reply(&self, text: &str) {
        self.script(Script::Reply(text.to_string()));
    }

    /// Titles of the sessions created so far
    pub fn created(&self) -> Vec<String> {
        self.created.lock().unwrap().clone()
    }

    pub fn inputs(&self) -> Vec<(String, String)> {
        self.inputs.lock().unwrap().clone()
    }

    pub fn aborted(&self) -> Vec<String> {
        self.aborted.lock().unwrap().clone()
    }

    fn broadcast(&self, event: SessionEvent) {
        let subscribers = self.subscribers.lock().unwrap();
        for subscriber in subscribers.iter() {
            let _ = subscriber.try_send(Ok(event.clone()));
        }
    }
}

#[async_trait]
impl AgentSessions for FakeAgent {
    async fn create_session(&self, directory: &Path, title: &str) -> opencode::Result<Session> {
        let mut created = self.created.lock().unwrap();
        created.push(title.to_string());
        Ok(Session {
            id: format!("ses_{}", created.len()),
            title: Some(title.to_string()),
            parent_id: None,
            directory: Some(directory.display().to_string()),
        })
    }

    async fn subscribe(&self, _directory: &Path) -> opencode::Result<EventSubscription> {
        let (tx, subscription) = EventSubscription::channel(64);
        self.subscribers.lock().unwrap().push(tx);
        Ok(subscription)
    }

    async fn send_input(
        &self,
        session_id: &str,
        _directory: &Path,
        text: &str,
    ) -> opencode::Result<()> {
        self.inputs
            .lock()
            .unwrap()
            .push((session_id.to_string(), text.to_string()));

        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Script::Reply(String::new()));

        // Another session sharing the connection finishes first
        self.broadcast(SessionEvent::new(
            "session.idle",
            Some("ses_unrelated"),
            json!({"sessionID": "ses_unrelated"}),
        ));

        match script {
            Script::Reply(reply) => {
                self.broadcast(SessionEvent::new(
                    "message.part.updated",
                    Some(session_id),
                    json!({"part": {
                        "id": format!("prt_{}", session_id),
                        "messageID": format!("msg_{}", session_id),
                        "sessionID": session_id,
                        "type": "text",
                        "text": reply,
                    }}),
                ));
                self.broadcast(SessionEvent::new(
                    "session.idle",
                    Some(session_id),
                    json!({"sessionID": session_id}),
                ));
            }
            Script::Fail(message) => {
                self.broadcast(SessionEvent::new(
                    "session.error",
                    Some(session_id),
                    json!({"sessionID": session_id, "error": {"name": "APIError", "data": {"message": message}}}),
                ));
            }
            Script::Silent => {}
        }
        Ok(())
    }

    async fn abort(&self, session_id: &str, _directory: &Path) -> opencode::Result<()> {
        self.aborted.lock().unwrap().push(session_id.to_string());
        Ok(())
    }
}

/// Parks `create_pull_request` until `release` is notified
#[derive(Clone, Default)]
pub struct PullRequestHold {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

pub struct FakeVcs {
    pub dirty: Mutex<bool>,
    pub create_error: Mutex<Option<String>>,
    pub workspace_error: Mutex<Option<String>>,
    pub status: Mutex<PrStatus>,
    /// Overrides `status` for single PR numbers
    pub statuses: Mutex<HashMap<u64, PrStatus>>,
    pub hold: Mutex<Option<PullRequestHold>>,
    pub workspaces: Mutex<Vec<(PathBuf, String, String)>>,
    pub cleanups: Mutex<Vec<(PathBuf, String)>>,
    pub commits: Mutex<Vec<String>>,
    pub pushes: Mutex<Vec<(PathBuf, String)>>,
    pub pr_requests: Mutex<Vec<CreatePrRequest>>,
    pub merges: Mutex<Vec<(u64, MergeOptions)>>,
}

impl Default for FakeVcs {
    fn default() -> Self {
        Self {
            dirty: Mutex::new(false),
            create_error: Mutex::new(None),
            workspace_error: Mutex::new(None),
            status: Mutex::new(PrStatus {
                state: PrState::Open,
                mergeable: true,
                checks: CheckSummary {
                    passed: 3,
                    failed: 0,
                    pending: 0,
                },
            }),
            statuses: Mutex::new(HashMap::new()),
            hold: Mutex::new(None),
            workspaces: Mutex::new(Vec::new()),
            cleanups: Mutex::new(Vec::new()),
            commits: Mutex::new(Vec::new()),
            pushes: Mutex::new(Vec::new()),
            pr_requests: Mutex::new(Vec::new()),
            merges: Mutex::new(Vec::new()),
        }
    }
}

impl FakeVcs {
    pub fn set_status(&self, status: PrStatus) {
        *self.status.lock().unwrap() = status;
    }

    pub fn set_status_for(&self, number: u64, status: PrStatus) {
        self.statuses.lock().unwrap().insert(number, status);
    }

    pub fn hold_pull_request(&self) -> PullRequestHold {
        let hold = PullRequestHold::default();
        *self.hold.lock().unwrap() = Some(hold.clone());
        hold
    }

    pub fn merges(&self) -> Vec<(u64, MergeOptions)> {
        self.merges.lock().unwrap().clone()
    }

    /// Where the fake places a branch's workspace under `repo`
    pub fn workspace_path(repo: &Path, branch: &str) -> PathBuf {
        repo.join(".phaseflow").join("worktrees").join(branch)
    }
}

#[async_trait]
impl VersionControl for FakeVcs {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn prepare_workspace(
        &self,
        repo: &Path,
        branch: &str,
        base_branch: &str,
    ) -> vcs::Result<PathBuf> {
        if let Some(message) = self.workspace_error.lock().unwrap().clone() {
            return Err(VcsError::command_failed("git worktree add", message));
        }
        self.workspaces.lock().unwrap().push((
            repo.to_path_buf(),
            branch.to_string(),
            base_branch.to_string(),
        ));
        Ok(Self::workspace_path(repo, branch))
    }

    async fn cleanup_workspace(&self, _repo: &Path, workspace: &Path, branch: &str) -> vcs::Result<()> {
        self.cleanups
            .lock()
            .unwrap()
            .push((workspace.to_path_buf(), branch.to_string()));
        Ok(())
    }

    async fn has_changes(&self, _dir: &Path) -> vcs::Result<bool> {
        Ok(*self.dirty.lock().unwrap())
    }

    async fn push_branch(&self, dir: &Path, branch: &str) -> vcs::Result<()> {
        self.pushes
            .lock()
            .unwrap()
            .push((dir.to_path_buf(), branch.to_string()));
        Ok(())
    }

    async fn commit_and_push(&self, dir: &Path, branch: &str, message: &str) -> vcs::Result<()> {
        self.commits.lock().unwrap().push(message.to_string());
        *self.dirty.lock().unwrap() = false;
        self.push_branch(dir, branch).await
    }

    async fn create_pull_request(
        &self,
        _dir: &Path,
        request: CreatePrRequest,
    ) -> vcs::Result<PullRequestInfo> {
        let hold = self.hold.lock().unwrap().clone();
        if let Some(hold) = hold {
            hold.entered.notify_one();
            hold.release.notified().await;
        }

        if let Some(message) = self.create_error.lock().unwrap().clone() {
            return Err(VcsError::command_failed("gh pr create", message));
        }
        let title = request.title.clone();
        self.pr_requests.lock().unwrap().push(request);
        Ok(PullRequestInfo {
            number: 42,
            url: "https://example/pr/42".to_string(),
            title,
        })
    }

    async fn get_pull_request_status(&self, _dir: &Path, number: u64) -> vcs::Result<PrStatus> {
        if let Some(status) = self.statuses.lock().unwrap().get(&number) {
            return Ok(status.clone());
        }
        Ok(self.status.lock().unwrap().clone())
    }

    async fn merge_pull_request(
        &self,
        _dir: &Path,
        number: u64,
        options: MergeOptions,
    ) -> vcs::Result<()> {
        self.merges.lock().unwrap().push((number, options));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeStore {
    pub records: Mutex<Vec<(Uuid, u64, String)>>,
}

#[async_trait]
impl PullRequestStore for FakeStore {
    async fn set_pull_request(&self, task_id: Uuid, number: u64, url: &str) -> Result<(), DbError> {
        self.records
            .lock()
            .unwrap()
            .push((task_id, number, url.to_string()));
        Ok(())
    }
}

pub struct TestHarness {
    pub agent: Arc<FakeAgent>,
    pub vcs: Arc<FakeVcs>,
    pub store: Arc<FakeStore>,
    pub bridge: NotificationBridge,
    ctx: Arc<ExecutorContext>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(ExecutorConfig::new("/repo"))
    }

    pub fn with_config(config: ExecutorConfig) -> Self {
        let agent = Arc::new(FakeAgent::default());
        let vcs = Arc::new(FakeVcs::default());
        let store = Arc::new(FakeStore::default());
        let bridge = NotificationBridge::new();
        let ctx = Arc::new(ExecutorContext::new(
            config,
            agent.clone(),
            vcs.clone(),
            store.clone(),
            bridge.clone(),
        ));
        Self {
            agent,
            vcs,
            store,
            bridge,
            ctx,
        }
    }

    pub fn context(&self) -> Arc<ExecutorContext> {
        self.ctx.clone()
    }

    pub fn working_dir(&self) -> PathBuf {
        self.ctx.config.repo_path.clone()
    }
}
