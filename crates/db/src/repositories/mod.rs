mod pull_request_store;
mod task_repository;

pub use pull_request_store::*;
pub use task_repository::*;
