use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePrRequest {
    pub title: String,
    pub body: String,
    pub base_branch: String,
    /// Defaults to the branch checked out in the working directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_branch: Option<String>,
    #[serde(default)]
    pub draft: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestInfo {
    pub number: u64,
    pub url: String,
    pub title: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrState {
    Open,
    Closed,
    Merged,
}

impl PrState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrState::Open => "open",
            PrState::Closed => "closed",
            PrState::Merged => "merged",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckSummary {
    pub passed: u32,
    pub failed: u32,
    pub pending: u32,
}

/// Live status of a pull request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrStatus {
    pub state: PrState,
    pub mergeable: bool,
    pub checks: CheckSummary,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMethod {
    Merge,
    #[default]
    Squash,
    Rebase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOptions {
    pub method: MergeMethod,
    pub delete_after_merge: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            method: MergeMethod::Squash,
            delete_after_merge: true,
        }
    }
}

/// Version-control operations needed to ship a task's work
#[async_trait]
pub trait VersionControl: Send + Sync {
    fn name(&self) -> &'static str;

    /// Create an isolated checkout of `branch` for one task and return its path.
    ///
    /// A workspace that already exists for the branch is reused. A branch that
    /// does not exist yet starts from `base_branch`.
    async fn prepare_workspace(&self, repo: &Path, branch: &str, base_branch: &str) -> Result<PathBuf>;

    /// Remove a workspace made by `prepare_workspace` together with its local branch
    async fn cleanup_workspace(&self, repo: &Path, workspace: &Path, branch: &str) -> Result<()>;

    /// Whether the working directory has uncommitted changes
    async fn has_changes(&self, dir: &Path) -> Result<bool>;

    /// Push `branch` to the remote and track it
    async fn push_branch(&self, dir: &Path, branch: &str) -> Result<()>;

    /// Stage everything, commit, then push `branch`
    async fn commit_and_push(&self, dir: &Path, branch: &str, message: &str) -> Result<()>;

    async fn create_pull_request(
        &self,
        dir: &Path,
        request: CreatePrRequest,
    ) -> Result<PullRequestInfo>;

    async fn get_pull_request_status(&self, dir: &Path, number: u64) -> Result<PrStatus>;

    async fn merge_pull_request(
        &self,
        dir: &Path,
        number: u64,
        options: MergeOptions,
    ) -> Result<()>;
}
