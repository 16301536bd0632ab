use thiserror::Error;

/// Rejections of a task definition before it is stored
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CoreError {
    #[error("Task title must not be empty")]
    EmptyTitle,

    #[error("Invalid branch name: {0:?}")]
    InvalidBranchName(String),
}
