use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// An update addressed a task id with no row
    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    /// A stored row could not be mapped back to the domain type
    #[error("Invalid row in {table}: {reason}")]
    InvalidRow { table: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, DbError>;
