use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

/// Maximum title length used when summarizing a task into a PR title.
const SUMMARY_TITLE_MAX: usize = 72;

/// Pull request recorded against a task once the merge phase opened it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestRef {
    pub number: u64,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    /// Skip the human approval gate before merging.
    #[serde(default)]
    pub auto_merge: bool,
    pub branch_name: Option<String>,
    pub pull_request: Option<PullRequestRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: description.into(),
            auto_merge: false,
            branch_name: None,
            pull_request: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn with_auto_merge(mut self, auto_merge: bool) -> Self {
        self.auto_merge = auto_merge;
        self
    }

    pub fn with_branch(mut self, branch_name: impl Into<String>) -> Self {
        self.branch_name = Some(branch_name.into());
        self
    }

    /// Branch used when the task does not name one explicitly.
    pub fn default_branch_name(&self) -> String {
        format!("task-{}", self.id)
    }

    /// Single-line title suitable for a pull request or commit subject.
    pub fn summary_title(&self) -> String {
        let title = self.title.lines().next().unwrap_or_default().trim();
        if title.chars().count() <= SUMMARY_TITLE_MAX {
            return title.to_string();
        }
        let truncated: String = title.chars().take(SUMMARY_TITLE_MAX - 3).collect();
        format!("{}...", truncated.trim_end())
    }

    /// Markdown body describing the task, used for pull request descriptions.
    pub fn summary_body(&self) -> String {
        let description = self.description.trim();
        if description.is_empty() {
            format!("## {}\n\nTask `{}`", self.title.trim(), self.id)
        } else {
            format!(
                "## {}\n\n{}\n\nTask `{}`",
                self.title.trim(),
                description,
                self.id
            )
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub auto_merge: bool,
    #[serde(default)]
    pub branch_name: Option<String>,
}

impl CreateTaskRequest {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.title.trim().is_empty() {
            return Err(CoreError::EmptyTitle);
        }
        if let Some(branch) = &self.branch_name {
            if branch.trim().is_empty() || branch.contains(char::is_whitespace) {
                return Err(CoreError::InvalidBranchName(branch.clone()));
            }
        }
        Ok(())
    }

    pub fn into_task(self) -> Task {
        let mut task = Task::new(self.title, self.description).with_auto_merge(self.auto_merge);
        task.branch_name = self.branch_name;
        task
    }
}
