use thiserror::Error;

#[derive(Debug, Error)]
pub enum OpenCodeError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("JSON serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The agent answered 404 for a session-scoped path
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Agent returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Could not open event stream: {0}")]
    Connection(String),

    #[error("Event stream error: {0}")]
    EventStream(String),
}

impl OpenCodeError {
    /// Errors where the agent server itself was unreachable
    pub fn is_unreachable(&self) -> bool {
        match self {
            Self::Request(e) => e.is_connect() || e.is_timeout(),
            Self::Connection(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, OpenCodeError>;
