//! SQLite persistence for tasks and the pull requests opened for them.

mod error;
pub mod models;
mod pool;
pub mod repositories;

pub use error::{DbError, Result};
pub use pool::{create_pool, open_database, run_migrations};
pub use repositories::{PullRequestStore, TaskRepository};
