//! Per-run cancellation tokens keyed by task.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Cancellation token of every task with a run in flight.
///
/// Phases look their task's token up and check it before each irreversible
/// step. A task without a registered run gets a token nobody can cancel.
#[derive(Default)]
pub struct CancellationRegistry {
    tokens: Mutex<HashMap<Uuid, CancellationToken>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a fresh token for `task_id`, replacing any earlier one
    pub fn register(&self, task_id: Uuid) -> CancellationToken {
        let token = CancellationToken::new();
        self.lock().insert(task_id, token.clone());
        token
    }

    pub fn token(&self, task_id: Uuid) -> CancellationToken {
        self.lock().get(&task_id).cloned().unwrap_or_default()
    }

    pub fn is_cancelled(&self, task_id: Uuid) -> bool {
        self.lock()
            .get(&task_id)
            .is_some_and(CancellationToken::is_cancelled)
    }

    /// Returns whether a run was registered for `task_id`
    pub fn cancel(&self, task_id: Uuid) -> bool {
        match self.lock().get(&task_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, task_id: Uuid) {
        self.lock().remove(&task_id);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, CancellationToken>> {
        self.tokens.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
