use async_trait::async_trait;
use std::path::Path;

use crate::error::Result;
use crate::events::EventSubscription;
use crate::types::Session;

/// Operations the orchestrator needs from an external agent service
#[async_trait]
pub trait AgentSessions: Send + Sync {
    /// Create a new agent session rooted at `directory`
    async fn create_session(&self, directory: &Path, title: &str) -> Result<Session>;

    /// Open the event stream carrying every session's events for `directory`
    async fn subscribe(&self, directory: &Path) -> Result<EventSubscription>;

    /// Queue input for a session; returns before the agent has processed it
    async fn send_input(&self, session_id: &str, directory: &Path, text: &str) -> Result<()>;

    /// Stop whatever the session is doing
    async fn abort(&self, session_id: &str, directory: &Path) -> Result<()>;
}
