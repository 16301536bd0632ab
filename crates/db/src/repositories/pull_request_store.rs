use async_trait::async_trait;
use uuid::Uuid;

use crate::error::DbError;

/// Records the pull request opened for a task
#[async_trait]
pub trait PullRequestStore: Send + Sync {
    async fn set_pull_request(&self, task_id: Uuid, number: u64, url: &str)
        -> Result<(), DbError>;
}
