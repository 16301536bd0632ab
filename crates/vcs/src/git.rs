use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{Result, VcsError};
use crate::traits::{
    CheckSummary, CreatePrRequest, MergeMethod, MergeOptions, PrState, PrStatus,
    PullRequestInfo, VersionControl,
};

/// Task workspaces live under the repository, one per branch
pub const WORKSPACE_DIR: &str = ".phaseflow/worktrees";

/// Git for local work, the GitHub CLI for pull requests.
///
/// Uses the user's local `git` credentials and `gh` authentication.
pub struct GitVcs {
    remote: String,
}

impl GitVcs {
    pub fn new() -> Self {
        Self {
            remote: "origin".to_string(),
        }
    }

    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    /// Check if gh CLI is available and authenticated
    pub async fn is_available() -> bool {
        Command::new("gh")
            .args(["auth", "status"])
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Path of the worktree `prepare_workspace` creates for `branch`
    pub fn workspace_path(repo: &Path, branch: &str) -> PathBuf {
        repo.join(WORKSPACE_DIR).join(branch)
    }

    async fn branch_exists(&self, repo: &Path, branch: &str) -> bool {
        let reference = format!("refs/heads/{}", branch);
        self.run_git(&["rev-parse", "--verify", "--quiet", reference.as_str()], repo)
            .await
            .is_ok()
    }

    async fn head_branch(&self, dir: &Path, number: u64) -> Result<String> {
        let number_arg = number.to_string();
        let stdout = self
            .run_gh(
                &[
                    "pr",
                    "view",
                    number_arg.as_str(),
                    "--json",
                    "headRefName",
                    "--jq",
                    ".headRefName",
                ],
                dir,
            )
            .await?;
        Ok(stdout.trim().to_string())
    }

    async fn run(program: &str, args: &[&str], cwd: &Path) -> Result<String> {
        debug!(program, ?args, cwd = %cwd.display(), "Running command");

        let output = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    VcsError::CommandNotFound(program.to_string())
                } else {
                    VcsError::Io(e)
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VcsError::command_failed(
                format!("{} {}", program, args.join(" ")),
                stderr.trim(),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn run_git(&self, args: &[&str], cwd: &Path) -> Result<String> {
        Self::run("git", args, cwd).await
    }

    async fn run_gh(&self, args: &[&str], cwd: &Path) -> Result<String> {
        Self::run("gh", args, cwd).await
    }
}

impl Default for GitVcs {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VersionControl for GitVcs {
    fn name(&self) -> &'static str {
        "git"
    }

    async fn prepare_workspace(&self, repo: &Path, branch: &str, base_branch: &str) -> Result<PathBuf> {
        let path = Self::workspace_path(repo, branch);
        if path.join(".git").exists() {
            debug!(workspace = %path.display(), branch, "Reusing workspace");
            return Ok(path);
        }

        // git runs inside `repo`, so it gets the path relative to it
        let relative = Path::new(WORKSPACE_DIR).join(branch);
        let relative_arg = relative
            .to_str()
            .ok_or_else(|| VcsError::InvalidPath(relative.display().to_string()))?;

        if self.branch_exists(repo, branch).await {
            self.run_git(&["worktree", "add", relative_arg, branch], repo)
                .await?;
        } else {
            self.run_git(
                &["worktree", "add", "-b", branch, relative_arg, base_branch],
                repo,
            )
            .await?;
        }

        info!(workspace = %path.display(), branch, base = base_branch, "Workspace created");
        Ok(path)
    }

    async fn cleanup_workspace(&self, repo: &Path, workspace: &Path, branch: &str) -> Result<()> {
        let workspace_arg = workspace
            .to_str()
            .ok_or_else(|| VcsError::InvalidPath(workspace.display().to_string()))?;

        if let Err(e) = self
            .run_git(&["worktree", "remove", "--force", workspace_arg], repo)
            .await
        {
            warn!(workspace = workspace_arg, error = %e, "Failed to remove worktree");
        }
        if let Err(e) = self.run_git(&["branch", "-D", branch], repo).await {
            warn!(branch, error = %e, "Failed to delete local branch");
        }

        if tokio::fs::try_exists(workspace).await.unwrap_or(false) {
            tokio::fs::remove_dir_all(workspace).await?;
        }
        Ok(())
    }

    async fn has_changes(&self, dir: &Path) -> Result<bool> {
        let status = self.run_git(&["status", "--porcelain"], dir).await?;
        Ok(!status.trim().is_empty())
    }

    async fn push_branch(&self, dir: &Path, branch: &str) -> Result<()> {
        info!(remote = %self.remote, branch, dir = %dir.display(), "Pushing branch");
        let refspec = format!("HEAD:refs/heads/{}", branch);
        self.run_git(&["push", "-u", self.remote.as_str(), refspec.as_str()], dir)
            .await?;
        Ok(())
    }

    async fn commit_and_push(&self, dir: &Path, branch: &str, message: &str) -> Result<()> {
        self.run_git(&["add", "-A"], dir).await?;
        self.run_git(&["commit", "-m", message], dir).await?;
        self.push_branch(dir, branch).await
    }

    async fn create_pull_request(
        &self,
        dir: &Path,
        request: CreatePrRequest,
    ) -> Result<PullRequestInfo> {
        info!(
            title = %request.title,
            base = %request.base_branch,
            head = ?request.head_branch,
            draft = request.draft,
            "Creating PR via gh CLI"
        );

        let mut args = vec![
            "pr",
            "create",
            "--title",
            request.title.as_str(),
            "--body",
            request.body.as_str(),
            "--base",
            request.base_branch.as_str(),
        ];
        if let Some(head) = request.head_branch.as_deref() {
            args.extend(["--head", head]);
        }
        if request.draft {
            args.push("--draft");
        }

        let stdout = self.run_gh(&args, dir).await?;
        let url = last_url(&stdout)
            .ok_or_else(|| VcsError::Parse(format!("No PR URL in gh output: {}", stdout.trim())))?;
        let number = parse_pr_number(url)?;

        debug!(number, url, "Created PR");

        Ok(PullRequestInfo {
            number,
            url: url.to_string(),
            title: request.title,
        })
    }

    async fn get_pull_request_status(&self, dir: &Path, number: u64) -> Result<PrStatus> {
        let number_arg = number.to_string();
        let stdout = self
            .run_gh(
                &[
                    "pr",
                    "view",
                    number_arg.as_str(),
                    "--json",
                    "state,mergeable,statusCheckRollup",
                ],
                dir,
            )
            .await
            .map_err(|e| match e {
                VcsError::CommandFailed { stderr, .. } if stderr.contains("Could not resolve") => {
                    VcsError::PullRequestNotFound(number)
                }
                other => other,
            })?;

        parse_pr_view(&stdout)
    }

    async fn merge_pull_request(
        &self,
        dir: &Path,
        number: u64,
        options: MergeOptions,
    ) -> Result<()> {
        let number_arg = number.to_string();
        let method = match options.method {
            MergeMethod::Merge => "--merge",
            MergeMethod::Squash => "--squash",
            MergeMethod::Rebase => "--rebase",
        };

        let head = if options.delete_after_merge {
            Some(self.head_branch(dir, number).await?)
        } else {
            None
        };

        info!(number, method, delete_branch = options.delete_after_merge, "Merging PR via gh CLI");
        self.run_gh(&["pr", "merge", number_arg.as_str(), method], dir)
            .await?;

        // `--delete-branch` would check out the base branch, which fails in a worktree
        if let Some(head) = head.filter(|head| !head.is_empty()) {
            self.run_git(&["push", self.remote.as_str(), "--delete", head.as_str()], dir)
                .await?;
        }
        Ok(())
    }
}

fn last_url(output: &str) -> Option<&str> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("http"))
        .last()
}

/// Extract the PR number from a URL such as https://github.com/owner/repo/pull/123
fn parse_pr_number(url: &str) -> Result<u64> {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| VcsError::Parse(format!("Invalid PR URL: {}", url)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PrView {
    state: String,
    #[serde(default)]
    mergeable: String,
    #[serde(default)]
    status_check_rollup: Vec<CheckEntry>,
}

/// Either a check run (`status` + `conclusion`) or a commit status (`state`)
#[derive(Deserialize, Default)]
#[serde(default)]
struct CheckEntry {
    status: Option<String>,
    conclusion: Option<String>,
    state: Option<String>,
}

enum CheckOutcome {
    Passed,
    Failed,
    Pending,
}

impl CheckEntry {
    fn outcome(&self) -> CheckOutcome {
        if let Some(state) = self.state.as_deref() {
            return match state {
                "SUCCESS" => CheckOutcome::Passed,
                "FAILURE" | "ERROR" => CheckOutcome::Failed,
                _ => CheckOutcome::Pending,
            };
        }

        if self.status.as_deref().is_some_and(|s| s != "COMPLETED") {
            return CheckOutcome::Pending;
        }

        match self.conclusion.as_deref() {
            Some("SUCCESS" | "NEUTRAL" | "SKIPPED") => CheckOutcome::Passed,
            Some("") | None => CheckOutcome::Pending,
            Some(_) => CheckOutcome::Failed,
        }
    }
}

fn parse_pr_view(json: &str) -> Result<PrStatus> {
    let view: PrView = serde_json::from_str(json)
        .map_err(|e| VcsError::Parse(format!("Failed to parse gh pr view output: {}", e)))?;

    let state = match view.state.as_str() {
        "OPEN" => PrState::Open,
        "CLOSED" => PrState::Closed,
        "MERGED" => PrState::Merged,
        other => return Err(VcsError::Parse(format!("Unknown PR state: {}", other))),
    };

    // UNKNOWN means GitHub has not computed mergeability yet
    if view.mergeable == "UNKNOWN" {
        warn!("PR mergeability not yet computed, treating as mergeable");
    }
    let mergeable = view.mergeable != "CONFLICTING";

    let mut checks = CheckSummary::default();
    for entry in &view.status_check_rollup {
        match entry.outcome() {
            CheckOutcome::Passed => checks.passed += 1,
            CheckOutcome::Failed => checks.failed += 1,
            CheckOutcome::Pending => checks.pending += 1,
        }
    }

    Ok(PrStatus {
        state,
        mergeable,
        checks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pr_number() {
        assert_eq!(
            parse_pr_number("https://github.com/owner/repo/pull/123").unwrap(),
            123
        );
        assert_eq!(parse_pr_number("https://example/pr/42/").unwrap(), 42);
        assert!(parse_pr_number("https://github.com/owner/repo").is_err());
    }

    #[test]
    fn test_last_url_skips_progress_output() {
        let output = "Creating pull request for task-1 into main\n\nhttps://github.com/o/r/pull/7\n";
        assert_eq!(last_url(output), Some("https://github.com/o/r/pull/7"));
        assert_eq!(last_url("nothing here"), None);
    }

    #[test]
    fn test_parse_open_mergeable_pr() {
        let json = r#"{
            "state": "OPEN",
            "mergeable": "MERGEABLE",
            "statusCheckRollup": [
                {"__typename": "CheckRun", "status": "COMPLETED", "conclusion": "SUCCESS"},
                {"__typename": "CheckRun", "status": "COMPLETED", "conclusion": "FAILURE"},
                {"__typename": "CheckRun", "status": "IN_PROGRESS", "conclusion": ""},
                {"__typename": "StatusContext", "state": "SUCCESS"},
                {"__typename": "StatusContext", "state": "PENDING"}
            ]
        }"#;

        let status = parse_pr_view(json).unwrap();
        assert_eq!(status.state, PrState::Open);
        assert!(status.mergeable);
        assert_eq!(
            status.checks,
            CheckSummary {
                passed: 2,
                failed: 1,
                pending: 2
            }
        );
    }

    #[test]
    fn test_parse_conflicting_pr() {
        let json = r#"{"state": "OPEN", "mergeable": "CONFLICTING", "statusCheckRollup": []}"#;
        let status = parse_pr_view(json).unwrap();
        assert!(!status.mergeable);
        assert_eq!(status.checks, CheckSummary::default());
    }

    #[test]
    fn test_parse_merged_pr() {
        let json = r#"{"state": "MERGED", "mergeable": "UNKNOWN"}"#;
        let status = parse_pr_view(json).unwrap();
        assert_eq!(status.state, PrState::Merged);
    }

    #[test]
    fn test_parse_invalid_state() {
        let json = r#"{"state": "DRAFTY", "mergeable": "MERGEABLE"}"#;
        assert!(matches!(parse_pr_view(json), Err(VcsError::Parse(_))));
    }

    #[tokio::test]
    async fn test_has_changes_in_fresh_repo() {
        if Command::new("git").arg("--version").output().await.is_err() {
            return;
        }

        let dir = tempfile::tempdir().unwrap();
        let vcs = GitVcs::new();
        vcs.run_git(&["init", "-q"], dir.path()).await.unwrap();

        assert!(!vcs.has_changes(dir.path()).await.unwrap());

        std::fs::write(dir.path().join("README.md"), "hello").unwrap();
        assert!(vcs.has_changes(dir.path()).await.unwrap());
    }

    async fn repo_with_commit() -> Option<tempfile::TempDir> {
        if Command::new("git").arg("--version").output().await.is_err() {
            return None;
        }

        let dir = tempfile::tempdir().unwrap();
        let vcs = GitVcs::new();
        vcs.run_git(&["init", "-q"], dir.path()).await.unwrap();
        vcs.run_git(&["symbolic-ref", "HEAD", "refs/heads/main"], dir.path())
            .await
            .unwrap();
        std::fs::write(dir.path().join("README.md"), "hello").unwrap();
        vcs.run_git(&["add", "-A"], dir.path()).await.unwrap();
        vcs.run_git(
            &[
                "-c",
                "user.name=phaseflow",
                "-c",
                "user.email=phaseflow@example.com",
                "-c",
                "commit.gpgsign=false",
                "commit",
                "-q",
                "-m",
                "init",
            ],
            dir.path(),
        )
        .await
        .unwrap();
        Some(dir)
    }

    #[tokio::test]
    async fn test_workspace_lifecycle() {
        let Some(repo) = repo_with_commit().await else {
            return;
        };
        let vcs = GitVcs::new();

        let workspace = vcs
            .prepare_workspace(repo.path(), "task-1", "main")
            .await
            .unwrap();
        assert_eq!(workspace, GitVcs::workspace_path(repo.path(), "task-1"));
        assert!(workspace.join("README.md").exists());
        assert!(vcs.branch_exists(repo.path(), "task-1").await);

        let branch = vcs
            .run_git(&["rev-parse", "--abbrev-ref", "HEAD"], &workspace)
            .await
            .unwrap();
        assert_eq!(branch.trim(), "task-1");

        // Second run for the same task keeps the work in place
        std::fs::write(workspace.join("notes.txt"), "wip").unwrap();
        let again = vcs
            .prepare_workspace(repo.path(), "task-1", "main")
            .await
            .unwrap();
        assert_eq!(again, workspace);
        assert!(vcs.has_changes(&again).await.unwrap());

        vcs.cleanup_workspace(repo.path(), &workspace, "task-1")
            .await
            .unwrap();
        assert!(!workspace.exists());
        assert!(!vcs.branch_exists(repo.path(), "task-1").await);
    }

    #[tokio::test]
    async fn test_workspace_checks_out_existing_branch() {
        let Some(repo) = repo_with_commit().await else {
            return;
        };
        let vcs = GitVcs::new();
        vcs.run_git(&["branch", "task-2"], repo.path()).await.unwrap();

        let workspace = vcs
            .prepare_workspace(repo.path(), "task-2", "main")
            .await
            .unwrap();
        let branch = vcs
            .run_git(&["rev-parse", "--abbrev-ref", "HEAD"], &workspace)
            .await
            .unwrap();
        assert_eq!(branch.trim(), "task-2");
    }

    #[tokio::test]
    async fn test_prepare_workspace_unknown_base_fails() {
        let Some(repo) = repo_with_commit().await else {
            return;
        };

        let err = GitVcs::new()
            .prepare_workspace(repo.path(), "task-3", "does-not-exist")
            .await
            .unwrap_err();
        assert!(matches!(err, VcsError::CommandFailed { .. }));
    }

    #[test]
    fn test_with_remote() {
        let vcs = GitVcs::new().with_remote("upstream");
        assert_eq!(vcs.remote, "upstream");
        assert_eq!(vcs.name(), "git");
    }
}
