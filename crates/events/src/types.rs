//! Event types delivered to task observers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping all events with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event ID
    pub id: Uuid,
    /// Monotonic sequence number assigned by the bridge
    pub seq: u64,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// Task channel the event was published on
    pub task_id: Uuid,
    /// The actual event
    pub event: Event,
}

impl EventEnvelope {
    /// Create a new event envelope with auto-generated ID and timestamp
    pub fn new(task_id: Uuid, seq: u64, event: Event) -> Self {
        Self {
            id: Uuid::new_v4(),
            seq,
            timestamp: Utc::now(),
            task_id,
            event,
        }
    }

    pub fn name(&self) -> &'static str {
        self.event.name()
    }
}

/// Payload published when a merge needs a human decision.
///
/// The same value is re-published verbatim when an observer rejoins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalPayload {
    pub pr_number: u64,
    pub pr_url: String,
    pub title: String,
    pub branch_name: String,
    pub base_branch: String,
}

/// All events published on a task channel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// A pipeline run started
    #[serde(rename = "pipeline:start")]
    PipelineStart {
        pipeline: String,
        phases: Vec<String>,
    },

    /// A pipeline run finished (successfully or not)
    #[serde(rename = "pipeline:complete")]
    PipelineComplete {
        pipeline: String,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// A phase is about to run
    #[serde(rename = "phase:start")]
    PhaseStart {
        phase: String,
        pipeline: String,
        working_dir: String,
        branch_name: String,
    },

    /// A phase finished; emitted exactly once per `phase:start`
    #[serde(rename = "phase:complete")]
    PhaseComplete {
        phase: String,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        merged: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Informational event from the external agent session
    #[serde(rename = "session:activity")]
    SessionActivity {
        phase: String,
        session_id: String,
        event_type: String,
        properties: serde_json::Value,
    },

    /// Pull request opened by the merge phase
    #[serde(rename = "merge:pr_created")]
    MergePrCreated {
        pr_number: u64,
        pr_url: String,
        title: String,
    },

    /// Merge is suspended until a human approves or denies it
    #[serde(rename = "merge:approval_required")]
    MergeApprovalRequired(ApprovalPayload),

    /// Merge decision has been carried out
    #[serde(rename = "merge:completed")]
    MergeCompleted { pr_number: u64, merged: bool },
}

impl Event {
    /// Wire name of the event as seen by observers
    pub fn name(&self) -> &'static str {
        match self {
            Event::PipelineStart { .. } => "pipeline:start",
            Event::PipelineComplete { .. } => "pipeline:complete",
            Event::PhaseStart { .. } => "phase:start",
            Event::PhaseComplete { .. } => "phase:complete",
            Event::SessionActivity { .. } => "session:activity",
            Event::MergePrCreated { .. } => "merge:pr_created",
            Event::MergeApprovalRequired(_) => "merge:approval_required",
            Event::MergeCompleted { .. } => "merge:completed",
        }
    }
}
