//! Event system for phaseflow
//!
//! This crate provides the per-task notification bridge and the event types
//! observers receive while a pipeline runs.

mod bridge;
mod types;

pub use bridge::{NotificationBridge, ObserverJoinHook, TaskObserver};
pub use types::*;
