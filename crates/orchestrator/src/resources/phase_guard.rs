use events::{Event, NotificationBridge};
use tracing::warn;
use uuid::Uuid;

use crate::core::PhaseResult;

/// Pairs every `phase:start` with exactly one `phase:complete`.
///
/// If the phase future is dropped before [`PhaseGuard::complete`] runs,
/// the guard reports the phase as failed on drop.
pub struct PhaseGuard {
    bridge: NotificationBridge,
    task_id: Uuid,
    phase: &'static str,
    completed: bool,
}

impl PhaseGuard {
    pub fn new(bridge: NotificationBridge, task_id: Uuid, phase: &'static str) -> Self {
        Self {
            bridge,
            task_id,
            phase,
            completed: false,
        }
    }

    pub fn complete(mut self, result: &PhaseResult) {
        self.completed = true;
        self.bridge.to_task(
            self.task_id,
            Event::PhaseComplete {
                phase: self.phase.to_string(),
                success: result.success,
                merged: result.merged,
                error: result.error.clone(),
            },
        );
    }
}

impl Drop for PhaseGuard {
    fn drop(&mut self) {
        if self.completed {
            return;
        }

        warn!(task_id = %self.task_id, phase = self.phase, "Phase dropped before completion");
        self.bridge.to_task(
            self.task_id,
            Event::PhaseComplete {
                phase: self.phase.to_string(),
                success: false,
                merged: None,
                error: Some("phase aborted before completion".to_string()),
            },
        );
    }
}
