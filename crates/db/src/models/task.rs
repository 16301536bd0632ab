use chrono::{DateTime, TimeZone, Utc};
use phaseflow_core::{PullRequestRef, Task};
use uuid::Uuid;

use crate::error::DbError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TaskRow {
    pub id: String,
    pub title: String,
    pub description: String,
    pub auto_merge: bool,
    pub branch_name: Option<String>,
    pub pr_number: Option<i64>,
    pub pr_url: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TaskRow {
    pub fn into_domain(self) -> Result<Task, DbError> {
        let id = Uuid::parse_str(&self.id).map_err(|e| invalid(e.to_string()))?;

        let pull_request = match (self.pr_number, self.pr_url) {
            (Some(number), Some(url)) => Some(PullRequestRef {
                number: u64::try_from(number).map_err(|e| invalid(e.to_string()))?,
                url,
            }),
            _ => None,
        };

        Ok(Task {
            id,
            title: self.title,
            description: self.description,
            auto_merge: self.auto_merge,
            branch_name: self.branch_name,
            pull_request,
            created_at: timestamp_to_datetime(self.created_at)?,
            updated_at: timestamp_to_datetime(self.updated_at)?,
        })
    }
}

impl From<&Task> for TaskRow {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.to_string(),
            title: task.title.clone(),
            description: task.description.clone(),
            auto_merge: task.auto_merge,
            branch_name: task.branch_name.clone(),
            pr_number: task.pull_request.as_ref().map(|pr| pr.number as i64),
            pr_url: task.pull_request.as_ref().map(|pr| pr.url.clone()),
            created_at: task.created_at.timestamp(),
            updated_at: task.updated_at.timestamp(),
        }
    }
}

fn invalid(reason: String) -> DbError {
    DbError::InvalidRow {
        table: "tasks",
        reason,
    }
}

fn timestamp_to_datetime(ts: i64) -> Result<DateTime<Utc>, DbError> {
    Utc.timestamp_opt(ts, 0)
        .single()
        .ok_or_else(|| invalid(format!("timestamp out of range: {}", ts)))
}
