use async_trait::async_trait;
use chrono::Utc;
use phaseflow_core::Task;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use super::PullRequestStore;
use crate::error::DbError;
use crate::models::TaskRow;

const TASK_COLUMNS: &str =
    "id, title, description, auto_merge, branch_name, pr_number, pr_url, created_at, updated_at";

#[derive(Clone)]
pub struct TaskRepository {
    pool: SqlitePool,
}

impl TaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, task: &Task) -> Result<Task, DbError> {
        let row = TaskRow::from(task);

        sqlx::query(&format!(
            "INSERT INTO tasks ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            TASK_COLUMNS
        ))
        .bind(&row.id)
        .bind(&row.title)
        .bind(&row.description)
        .bind(row.auto_merge)
        .bind(&row.branch_name)
        .bind(row.pr_number)
        .bind(&row.pr_url)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;

        debug!(task_id = %task.id, "Task created");
        Ok(task.clone())
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Task>, DbError> {
        let row: Option<TaskRow> = sqlx::query_as(&format!(
            "SELECT {} FROM tasks WHERE id = ?",
            TASK_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TaskRow::into_domain).transpose()
    }

    pub async fn find_all(&self) -> Result<Vec<Task>, DbError> {
        let rows: Vec<TaskRow> = sqlx::query_as(&format!(
            "SELECT {} FROM tasks ORDER BY created_at DESC",
            TASK_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TaskRow::into_domain).collect()
    }
}

#[async_trait]
impl PullRequestStore for TaskRepository {
    async fn set_pull_request(
        &self,
        task_id: Uuid,
        number: u64,
        url: &str,
    ) -> Result<(), DbError> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET pr_number = ?, pr_url = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(number as i64)
        .bind(url)
        .bind(Utc::now().timestamp())
        .bind(task_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::TaskNotFound(task_id));
        }

        debug!(task_id = %task_id, pr_number = number, "Pull request recorded");
        Ok(())
    }
}
