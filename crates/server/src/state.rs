use db::TaskRepository;
use events::NotificationBridge;
use orchestrator::Orchestrator;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub tasks: TaskRepository,
    pub bridge: NotificationBridge,
}

impl AppState {
    /// The bridge is taken from the orchestrator so websocket observers and
    /// the engine share one set of task channels.
    pub fn new(orchestrator: Arc<Orchestrator>, tasks: TaskRepository) -> Self {
        let bridge = orchestrator.context().bridge.clone();
        Self {
            orchestrator,
            tasks,
            bridge,
        }
    }
}
