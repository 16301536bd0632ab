use serde::{Deserialize, Serialize};
use uuid::Uuid;

use events::EventEnvelope;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join the channels of the given tasks
    Subscribe { task_ids: Vec<Uuid> },
    /// Leave the given task channels, or all of them when `task_ids` is absent
    Unsubscribe {
        #[serde(default)]
        task_ids: Option<Vec<Uuid>>,
    },
    Ping,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Event { envelope: EventEnvelope },
    /// Task channels the socket is joined to after the last request
    Subscribed { task_ids: Vec<Uuid> },
    Pong,
    Error { message: String },
}

impl ServerMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
