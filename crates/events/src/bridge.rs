//! Per-task notification bridge built on tokio broadcast channels

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::types::{Event, EventEnvelope};

/// Capacity for each task's broadcast channel
const DEFAULT_CAPACITY: usize = 256;

/// Hook invoked every time an observer subscribes to a task channel.
///
/// Hooks run after the observer's receiver exists, so anything they publish
/// for that task reaches the new observer.
pub trait ObserverJoinHook: Send + Sync {
    fn on_observer_join(&self, task_id: Uuid);
}

struct BridgeInner {
    channels: RwLock<HashMap<Uuid, broadcast::Sender<EventEnvelope>>>,
    hooks: RwLock<Vec<Weak<dyn ObserverJoinHook>>>,
    sequence: AtomicU64,
    capacity: usize,
}

/// Fan-out channel keyed by task id.
///
/// Delivery is best effort: an event published while nobody observes the
/// task is dropped.
#[derive(Clone)]
pub struct NotificationBridge {
    inner: Arc<BridgeInner>,
}

impl NotificationBridge {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                channels: RwLock::new(HashMap::new()),
                hooks: RwLock::new(Vec::new()),
                sequence: AtomicU64::new(0),
                capacity,
            }),
        }
    }

    /// Publish an event to every observer currently subscribed to `task_id`.
    ///
    /// Returns the number of observers that received it.
    pub fn to_task(&self, task_id: Uuid, event: Event) -> usize {
        let seq = self.inner.sequence.fetch_add(1, Ordering::SeqCst);
        let name = event.name();

        let sender = {
            let channels = self
                .inner
                .channels
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            channels.get(&task_id).cloned()
        };

        let Some(sender) = sender else {
            debug!(task_id = %task_id, event = name, "No observers for task, event dropped");
            return 0;
        };

        match sender.send(EventEnvelope::new(task_id, seq, event)) {
            Ok(delivered) => {
                debug!(task_id = %task_id, event = name, seq, delivered, "Event published");
                delivered
            }
            Err(_) => {
                self.prune(task_id);
                0
            }
        }
    }

    /// Subscribe to a task channel and run the observer-join hooks.
    pub fn subscribe(&self, task_id: Uuid) -> TaskObserver {
        let receiver = {
            let mut channels = self
                .inner
                .channels
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            channels
                .entry(task_id)
                .or_insert_with(|| broadcast::channel(self.inner.capacity).0)
                .subscribe()
        };

        debug!(task_id = %task_id, "Observer joined task channel");
        self.run_join_hooks(task_id);

        TaskObserver { task_id, receiver }
    }

    /// Register a hook called whenever an observer joins any task channel.
    ///
    /// The bridge only keeps a weak reference; dropping the hook's last `Arc`
    /// unregisters it.
    pub fn on_observer_join<H>(&self, hook: &Arc<H>)
    where
        H: ObserverJoinHook + 'static,
    {
        let hook: Arc<dyn ObserverJoinHook> = hook.clone();
        self.inner
            .hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::downgrade(&hook));
    }

    /// Number of observers currently subscribed to a task
    pub fn observer_count(&self, task_id: Uuid) -> usize {
        self.inner
            .channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&task_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    /// Total number of events published (including dropped ones)
    pub fn event_count(&self) -> u64 {
        self.inner.sequence.load(Ordering::SeqCst)
    }

    fn run_join_hooks(&self, task_id: Uuid) {
        let hooks: Vec<Arc<dyn ObserverJoinHook>> = {
            let mut hooks = self
                .inner
                .hooks
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            hooks.retain(|hook| hook.strong_count() > 0);
            hooks.iter().filter_map(Weak::upgrade).collect()
        };

        for hook in hooks {
            hook.on_observer_join(task_id);
        }
    }

    fn prune(&self, task_id: Uuid) {
        let mut channels = self
            .inner
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(sender) = channels.get(&task_id) {
            if sender.receiver_count() == 0 {
                channels.remove(&task_id);
                debug!(task_id = %task_id, "Removed task channel without observers");
            }
        }
    }
}

impl Default for NotificationBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for NotificationBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let channels = self
            .inner
            .channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("NotificationBridge")
            .field("channels", &channels)
            .field("event_count", &self.event_count())
            .finish()
    }
}

/// Receiving end of one observer's subscription to a task channel
pub struct TaskObserver {
    task_id: Uuid,
    receiver: broadcast::Receiver<EventEnvelope>,
}

impl TaskObserver {
    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    /// Wait for the next event. Returns `None` once the channel is closed.
    ///
    /// An observer that falls behind skips the events it missed.
    pub async fn recv(&mut self) -> Option<EventEnvelope> {
        loop {
            match self.receiver.recv().await {
                Ok(envelope) => return Some(envelope),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(task_id = %self.task_id, missed = n, "Observer lagged, events skipped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking receive, used to drain buffered events.
    pub fn try_recv(&mut self) -> Option<EventEnvelope> {
        loop {
            match self.receiver.try_recv() {
                Ok(envelope) => return Some(envelope),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}
