use thiserror::Error;

#[derive(Debug, Error)]
pub enum VcsError {
    /// A git or gh invocation exited non-zero
    #[error("{command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("{0} is not installed or not on PATH")]
    CommandNotFound(String),

    #[error("Pull request not found: #{0}")]
    PullRequestNotFound(u64),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// gh produced output this crate does not understand
    #[error("Unexpected gh output: {0}")]
    Parse(String),
}

impl VcsError {
    pub fn command_failed(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: command.into(),
            stderr: stderr.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, VcsError>;
