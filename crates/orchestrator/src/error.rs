use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Pipeline not found: {0}")]
    PipelineNotFound(String),

    #[error("Pipeline already registered: {0}")]
    DuplicatePipelineName(String),

    #[error("Session timeout after {duration_ms}ms")]
    SessionTimeout { duration_ms: u64 },

    /// Error reported by the agent itself; the message is kept as sent
    #[error("{message}")]
    SessionError { message: String },

    #[error("Session event stream closed before the session finished")]
    StreamClosed,

    #[error("Agent error: {0}")]
    Agent(#[from] opencode::OpenCodeError),

    #[error("Version control error: {0}")]
    Vcs(#[from] vcs::VcsError),

    #[error("Database error: {0}")]
    Database(#[from] db::DbError),

    #[error("A pipeline is already running for task {0}")]
    RunInProgress(Uuid),

    #[error("An approval is already pending for task {0}")]
    ApprovalAlreadyPending(Uuid),

    #[error("No approval pending for task {0}")]
    NoPendingApproval(Uuid),

    #[error("Approval cancelled for task {0}")]
    ApprovalCancelled(Uuid),

    #[error("Run cancelled for task {0}")]
    Cancelled(Uuid),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

impl OrchestratorError {
    pub fn session_error(message: impl Into<String>) -> Self {
        Self::SessionError {
            message: message.into(),
        }
    }

    /// Failures raised by a collaborator call rather than by the engine
    pub fn is_external(&self) -> bool {
        matches!(self, Self::Agent(_) | Self::Vcs(_) | Self::Database(_))
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
