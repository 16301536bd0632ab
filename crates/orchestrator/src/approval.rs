//! Human-approval gate: suspends a phase until someone decides.

use events::{ApprovalPayload, Event, NotificationBridge, ObserverJoinHook};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{OrchestratorError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approved,
    Denied,
}

impl ApprovalDecision {
    pub fn from_approved(approved: bool) -> Self {
        if approved {
            Self::Approved
        } else {
            Self::Denied
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved)
    }
}

enum Resolution {
    Decided(ApprovalDecision),
    Cancelled,
}

struct Pending {
    request_id: u64,
    payload: ApprovalPayload,
    tx: oneshot::Sender<Resolution>,
}

/// At most one pending approval per task.
///
/// A second `request` for a task that already waits is rejected with
/// [`OrchestratorError::ApprovalAlreadyPending`]. Waits have no timeout;
/// [`ApprovalGate::cancel`] is the only way to end one without a decision.
pub struct ApprovalGate {
    bridge: NotificationBridge,
    pending: Mutex<HashMap<Uuid, Pending>>,
    next_request_id: AtomicU64,
}

impl ApprovalGate {
    pub fn new(bridge: NotificationBridge) -> Self {
        Self {
            bridge,
            pending: Mutex::new(HashMap::new()),
            next_request_id: AtomicU64::new(1),
        }
    }

    /// Publish `payload` as `merge:approval_required` and wait for a decision.
    pub async fn request(&self, task_id: Uuid, payload: ApprovalPayload) -> Result<ApprovalDecision> {
        let (tx, rx) = oneshot::channel();
        let request_id = self.next_request_id.fetch_add(1, Ordering::SeqCst);

        {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            if pending.contains_key(&task_id) {
                warn!(task_id = %task_id, "Approval requested while another is pending");
                return Err(OrchestratorError::ApprovalAlreadyPending(task_id));
            }
            pending.insert(
                task_id,
                Pending {
                    request_id,
                    payload: payload.clone(),
                    tx,
                },
            );
        }

        // Removes the entry if this future is dropped while still waiting
        let _entry = PendingEntry {
            gate: self,
            task_id,
            request_id,
        };

        info!(task_id = %task_id, pr_number = payload.pr_number, "Waiting for merge approval");
        self.bridge
            .to_task(task_id, Event::MergeApprovalRequired(payload));

        match rx.await {
            Ok(Resolution::Decided(decision)) => {
                info!(task_id = %task_id, ?decision, "Approval resolved");
                Ok(decision)
            }
            Ok(Resolution::Cancelled) | Err(_) => Err(OrchestratorError::ApprovalCancelled(task_id)),
        }
    }

    /// Deliver a decision to the task's suspended request.
    pub fn resolve(&self, task_id: Uuid, decision: ApprovalDecision) -> Result<()> {
        let entry = self.take(task_id, None);
        let Some(entry) = entry else {
            return Err(OrchestratorError::NoPendingApproval(task_id));
        };

        if entry.tx.send(Resolution::Decided(decision)).is_err() {
            return Err(OrchestratorError::NoPendingApproval(task_id));
        }
        Ok(())
    }

    /// Re-publish the pending payload, if any. Returns whether one was sent.
    pub fn resend_pending(&self, task_id: Uuid) -> bool {
        let Some(payload) = self.pending_payload(task_id) else {
            return false;
        };

        debug!(task_id = %task_id, pr_number = payload.pr_number, "Re-sending pending approval");
        self.bridge
            .to_task(task_id, Event::MergeApprovalRequired(payload));
        true
    }

    /// End the task's pending request with [`OrchestratorError::ApprovalCancelled`].
    pub fn cancel(&self, task_id: Uuid) -> bool {
        match self.take(task_id, None) {
            Some(entry) => {
                info!(task_id = %task_id, "Cancelling pending approval");
                let _ = entry.tx.send(Resolution::Cancelled);
                true
            }
            None => false,
        }
    }

    pub fn pending_payload(&self, task_id: Uuid) -> Option<ApprovalPayload> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&task_id)
            .map(|entry| entry.payload.clone())
    }

    pub fn is_pending(&self, task_id: Uuid) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&task_id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Remove the task's entry, optionally only if it belongs to `request_id`.
    fn take(&self, task_id: Uuid, request_id: Option<u64>) -> Option<Pending> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        match (pending.get(&task_id), request_id) {
            (Some(entry), Some(id)) if entry.request_id != id => None,
            (Some(_), _) => pending.remove(&task_id),
            (None, _) => None,
        }
    }
}

impl ObserverJoinHook for ApprovalGate {
    fn on_observer_join(&self, task_id: Uuid) {
        self.resend_pending(task_id);
    }
}

struct PendingEntry<'a> {
    gate: &'a ApprovalGate,
    task_id: Uuid,
    request_id: u64,
}

impl Drop for PendingEntry<'_> {
    fn drop(&mut self) {
        if self.gate.take(self.task_id, Some(self.request_id)).is_some() {
            debug!(task_id = %self.task_id, "Dropped approval request removed from gate");
        }
    }
}
