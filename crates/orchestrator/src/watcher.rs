//! Waits on a session event stream until one session reaches a terminal state.

use opencode::{EventSubscription, SessionEvent, SessionEventKind};
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use crate::error::OrchestratorError;

pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// A failed wait, with every event observed before it failed.
#[derive(Debug)]
pub struct WatchFailure {
    pub error: OrchestratorError,
    pub events: Vec<SessionEvent>,
}

pub type WatchResult = std::result::Result<Vec<SessionEvent>, WatchFailure>;

pub struct CompletionWatcher {
    timeout: Duration,
}

impl CompletionWatcher {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Consume `subscription` until `session_id` goes idle or errors.
    ///
    /// Every event is accumulated and passed to `on_event`, including events
    /// of other sessions sharing the connection; only events of `session_id`
    /// can end the wait. The deadline is checked both while waiting and after
    /// each event so that neither a silent stream nor a busy one outlives it.
    pub async fn wait_for_terminal<F>(
        &self,
        subscription: &mut EventSubscription,
        session_id: &str,
        mut on_event: F,
    ) -> WatchResult
    where
        F: FnMut(&SessionEvent) + Send,
    {
        let started = Instant::now();
        let deadline = started + self.timeout;
        let mut events = Vec::new();

        loop {
            let next = match timeout_at(deadline, subscription.next_event()).await {
                Ok(next) => next,
                Err(_) => return Err(self.timed_out(session_id, events)),
            };

            let event = match next {
                Some(Ok(event)) => event,
                Some(Err(e)) => {
                    warn!(session_id, error = %e, "Session event stream failed");
                    return Err(WatchFailure {
                        error: OrchestratorError::Agent(e),
                        events,
                    });
                }
                None => {
                    return Err(WatchFailure {
                        error: OrchestratorError::StreamClosed,
                        events,
                    });
                }
            };

            on_event(&event);
            let own = event.belongs_to(session_id);
            let kind = event.kind();
            events.push(event);

            if own {
                match kind {
                    SessionEventKind::Idle => {
                        debug!(session_id, event_count = events.len(), "Session idle");
                        return Ok(events);
                    }
                    SessionEventKind::Error(message) => {
                        warn!(session_id, error = %message, "Session reported an error");
                        return Err(WatchFailure {
                            error: OrchestratorError::session_error(message),
                            events,
                        });
                    }
                    SessionEventKind::Activity => {}
                }
            }

            if started.elapsed() > self.timeout {
                return Err(self.timed_out(session_id, events));
            }
        }
    }

    fn timed_out(&self, session_id: &str, events: Vec<SessionEvent>) -> WatchFailure {
        warn!(
            session_id,
            timeout_ms = self.timeout.as_millis() as u64,
            event_count = events.len(),
            "Session timed out"
        );
        WatchFailure {
            error: OrchestratorError::SessionTimeout {
                duration_ms: self.timeout.as_millis() as u64,
            },
            events,
        }
    }
}

impl Default for CompletionWatcher {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencode::OpenCodeError;
    use serde_json::json;

    fn event(event_type: &str, session_id: &str) -> SessionEvent {
        SessionEvent::new(event_type, Some(session_id), json!({}))
    }

    fn error_event(session_id: &str, message: &str) -> SessionEvent {
        SessionEvent::new(
            "session.error",
            Some(session_id),
            json!({"error": {"name": "APIError", "data": {"message": message}}}),
        )
    }

    #[tokio::test]
    async fn test_idle_of_watched_session_succeeds() {
        let (tx, mut subscription) = EventSubscription::channel(16);
        tx.send(Ok(event("message.updated", "ses_1"))).await.unwrap();
        tx.send(Ok(event("session.idle", "ses_1"))).await.unwrap();

        let mut seen = 0;
        let events = CompletionWatcher::default()
            .wait_for_terminal(&mut subscription, "ses_1", |_| seen += 1)
            .await
            .unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(seen, 2);
    }

    #[tokio::test]
    async fn test_other_sessions_never_terminate_wait() {
        let (tx, mut subscription) = EventSubscription::channel(16);
        tx.send(Ok(event("session.idle", "ses_other"))).await.unwrap();
        tx.send(Ok(error_event("ses_other", "boom"))).await.unwrap();
        tx.send(Ok(event("session.idle", "ses_1"))).await.unwrap();

        let events = CompletionWatcher::default()
            .wait_for_terminal(&mut subscription, "ses_1", |_| {})
            .await
            .unwrap();

        assert_eq!(events.len(), 3);
        assert!(events[2].belongs_to("ses_1"));
    }

    #[tokio::test]
    async fn test_error_before_idle_fails_with_message() {
        let (tx, mut subscription) = EventSubscription::channel(16);
        tx.send(Ok(event("message.updated", "ses_1"))).await.unwrap();
        tx.send(Ok(error_event("ses_1", "rate limited"))).await.unwrap();
        tx.send(Ok(event("session.idle", "ses_1"))).await.unwrap();

        let failure = CompletionWatcher::default()
            .wait_for_terminal(&mut subscription, "ses_1", |_| {})
            .await
            .unwrap_err();

        assert_eq!(failure.error.to_string(), "rate limited");
        assert_eq!(failure.events.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_stream_times_out_after_budget() {
        let (_tx, mut subscription) = EventSubscription::channel(16);
        let watcher = CompletionWatcher::new(Duration::from_secs(30));

        let started = Instant::now();
        let failure = watcher
            .wait_for_terminal(&mut subscription, "ses_1", |_| {})
            .await
            .unwrap_err();

        assert!(matches!(
            failure.error,
            OrchestratorError::SessionTimeout { duration_ms: 30_000 }
        ));
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(30));
        assert!(waited < Duration::from_secs(31));
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_stream_still_times_out() {
        let (tx, mut subscription) = EventSubscription::channel(16);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(1)).await;
                if tx.send(Ok(event("message.part.updated", "ses_1"))).await.is_err() {
                    return;
                }
            }
        });

        let failure = CompletionWatcher::new(Duration::from_secs(10))
            .wait_for_terminal(&mut subscription, "ses_1", |_| {})
            .await
            .unwrap_err();

        assert!(matches!(failure.error, OrchestratorError::SessionTimeout { .. }));
        assert!(failure.events.len() >= 9);
    }

    #[tokio::test]
    async fn test_closed_stream_fails() {
        let (tx, mut subscription) = EventSubscription::channel(16);
        tx.send(Ok(event("message.updated", "ses_1"))).await.unwrap();
        drop(tx);

        let failure = CompletionWatcher::default()
            .wait_for_terminal(&mut subscription, "ses_1", |_| {})
            .await
            .unwrap_err();

        assert!(matches!(failure.error, OrchestratorError::StreamClosed));
        assert_eq!(failure.events.len(), 1);
    }

    #[tokio::test]
    async fn test_stream_error_fails() {
        let (tx, mut subscription) = EventSubscription::channel(16);
        tx.send(Err(OpenCodeError::EventStream("reset".to_string())))
            .await
            .unwrap();

        let failure = CompletionWatcher::default()
            .wait_for_terminal(&mut subscription, "ses_1", |_| {})
            .await
            .unwrap_err();

        assert!(failure.error.is_external());
    }
}
