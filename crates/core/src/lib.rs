pub mod domain;
pub mod error;

pub use domain::task::{CreateTaskRequest, PullRequestRef, Task};
pub use error::CoreError;
