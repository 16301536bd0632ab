//! Session event stream for the OpenCode `/event` SSE endpoint.
//!
//! One connection carries the events of every session in a directory, so
//! consumers correlate by [`SessionEvent::session_id`].

use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{OpenCodeError, Result};

const SUBSCRIPTION_BUFFER: usize = 100;

/// One raw event from the agent's event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, rename = "sessionID", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub properties: serde_json::Value,
}

/// How a consumer should treat an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEventKind {
    /// The session finished processing
    Idle,
    /// The session reported an error; the message is kept verbatim
    Error(String),
    /// Anything else
    Activity,
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    properties: serde_json::Value,
}

impl SessionEvent {
    pub fn new(
        event_type: impl Into<String>,
        session_id: Option<&str>,
        properties: serde_json::Value,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            session_id: session_id.map(String::from),
            properties,
        }
    }

    /// Parse the JSON payload of one SSE `data:` frame.
    pub fn parse(data: &str) -> Result<Self> {
        let raw: RawEvent = serde_json::from_str(data)?;
        let session_id = Self::extract_session_id(&raw.properties);
        Ok(Self {
            event_type: raw.event_type,
            session_id,
            properties: raw.properties,
        })
    }

    /// OpenCode puts the session id in different places depending on the event.
    fn extract_session_id(properties: &serde_json::Value) -> Option<String> {
        properties
            .get("sessionID")
            .or_else(|| properties.get("part").and_then(|p| p.get("sessionID")))
            .or_else(|| properties.get("info").and_then(|i| i.get("sessionID")))
            .and_then(|v| v.as_str())
            .map(String::from)
    }

    pub fn belongs_to(&self, session_id: &str) -> bool {
        self.session_id.as_deref() == Some(session_id)
    }

    pub fn kind(&self) -> SessionEventKind {
        match self.event_type.as_str() {
            "session.idle" => SessionEventKind::Idle,
            "session.status" => {
                let status = self
                    .properties
                    .get("status")
                    .and_then(|s| s.get("type"))
                    .and_then(|t| t.as_str());
                if status == Some("idle") {
                    SessionEventKind::Idle
                } else {
                    SessionEventKind::Activity
                }
            }
            "session.error" => SessionEventKind::Error(self.error_message()),
            _ => SessionEventKind::Activity,
        }
    }

    fn error_message(&self) -> String {
        let error = self.properties.get("error");
        error
            .and_then(|e| e.get("data"))
            .and_then(|d| d.get("message"))
            .and_then(|m| m.as_str())
            .or_else(|| error.and_then(|e| e.get("name")).and_then(|n| n.as_str()))
            .unwrap_or("unknown session error")
            .to_string()
    }
}

/// Handle to one open event subscription.
///
/// The sequence is not restartable: events emitted after this handle is
/// dropped and before a new one connects are lost, so a watcher keeps a
/// single subscription open for the whole watch.
pub struct EventSubscription {
    rx: mpsc::Receiver<Result<SessionEvent>>,
    reader: Option<JoinHandle<()>>,
}

impl EventSubscription {
    /// Build a subscription fed by an in-process channel.
    pub fn channel(buffer: usize) -> (mpsc::Sender<Result<SessionEvent>>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self { rx, reader: None })
    }

    /// Subscribe to an already-connected SSE response.
    pub(crate) fn from_response(response: reqwest::Response) -> Self {
        let (tx, rx) = mpsc::channel::<Result<SessionEvent>>(SUBSCRIPTION_BUFFER);
        let byte_stream = response.bytes_stream();

        let reader = tokio::spawn(async move {
            let mut event_stream = byte_stream.eventsource();
            let mut event_count = 0u64;

            while let Some(event_result) = event_stream.next().await {
                match event_result {
                    Ok(event) => {
                        if event.data.is_empty() {
                            continue;
                        }
                        match SessionEvent::parse(&event.data) {
                            Ok(parsed) => {
                                event_count += 1;
                                debug!(
                                    event_type = %parsed.event_type,
                                    session_id = ?parsed.session_id,
                                    event_count,
                                    "Received SSE event"
                                );
                                if tx.send(Ok(parsed)).await.is_err() {
                                    debug!("Subscriber dropped, stopping SSE reader");
                                    return;
                                }
                            }
                            Err(e) => {
                                warn!(error = %e, data = %event.data, "Failed to parse event");
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(OpenCodeError::EventStream(e.to_string()))).await;
                        return;
                    }
                }
            }

            info!(event_count, "SSE stream ended");
        });

        Self {
            rx,
            reader: Some(reader),
        }
    }

    /// Next event, or `None` once the connection is closed.
    pub async fn next_event(&mut self) -> Option<Result<SessionEvent>> {
        self.rx.recv().await
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}
