use std::collections::HashMap;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, warn};
use uuid::Uuid;

use events::{EventEnvelope, NotificationBridge};

use crate::messages::{ClientMessage, ServerMessage};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);
const FORWARD_BUFFER: usize = 256;

#[derive(Clone)]
pub struct WsState {
    pub bridge: NotificationBridge,
}

impl WsState {
    pub fn new(bridge: NotificationBridge) -> Self {
        Self { bridge }
    }
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<WsState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Task channels one socket is joined to.
///
/// Each joined task gets a forwarding task that moves envelopes from its
/// bridge observer into the socket's queue.
struct Subscriptions {
    bridge: NotificationBridge,
    forwarders: HashMap<Uuid, JoinHandle<()>>,
    tx: mpsc::Sender<EventEnvelope>,
}

impl Subscriptions {
    fn new(bridge: NotificationBridge, tx: mpsc::Sender<EventEnvelope>) -> Self {
        Self {
            bridge,
            forwarders: HashMap::new(),
            tx,
        }
    }

    /// Join `task_id`. Re-joining an already joined task resubscribes it,
    /// which replays any pending approval.
    fn join(&mut self, task_id: Uuid) {
        if let Some(previous) = self.forwarders.remove(&task_id) {
            previous.abort();
        }

        // Subscribing runs the join hooks; whatever they publish is already
        // buffered in this observer.
        let mut observer = self.bridge.subscribe(task_id);
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            while let Some(envelope) = observer.recv().await {
                if tx.send(envelope).await.is_err() {
                    break;
                }
            }
        });
        self.forwarders.insert(task_id, handle);
    }

    fn leave(&mut self, task_id: Uuid) {
        if let Some(handle) = self.forwarders.remove(&task_id) {
            handle.abort();
        }
    }

    fn leave_all(&mut self) {
        for (_, handle) in self.forwarders.drain() {
            handle.abort();
        }
    }

    fn task_ids(&self) -> Vec<Uuid> {
        let mut ids: Vec<_> = self.forwarders.keys().copied().collect();
        ids.sort();
        ids
    }
}

impl Drop for Subscriptions {
    fn drop(&mut self) {
        self.leave_all();
    }
}

type Sink = SplitSink<WebSocket, Message>;

async fn send(sender: &mut Sink, message: &ServerMessage) -> bool {
    let json = match message.to_json() {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "Failed to serialize websocket message");
            return true;
        }
    };
    sender.send(Message::Text(json.into())).await.is_ok()
}

async fn handle_socket(socket: WebSocket, state: WsState) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut events) = mpsc::channel(FORWARD_BUFFER);
    let mut subscriptions = Subscriptions::new(state.bridge.clone(), tx);

    let mut heartbeat = interval(HEARTBEAT_INTERVAL);
    heartbeat.reset();

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                if !send(&mut sender, &ServerMessage::Pong).await {
                    break;
                }
            }

            Some(envelope) = events.recv() => {
                if !send(&mut sender, &ServerMessage::Event { envelope }).await {
                    break;
                }
            }

            msg = tokio::time::timeout(CLIENT_TIMEOUT + HEARTBEAT_INTERVAL, receiver.next()) => {
                match msg {
                    Ok(Some(Ok(Message::Text(text)))) => {
                        let response = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Subscribe { task_ids }) => {
                                for task_id in task_ids {
                                    subscriptions.join(task_id);
                                }
                                debug!(tasks = ?subscriptions.task_ids(), "WebSocket subscribed");
                                ServerMessage::Subscribed { task_ids: subscriptions.task_ids() }
                            }
                            Ok(ClientMessage::Unsubscribe { task_ids }) => {
                                match task_ids {
                                    Some(ids) => ids.into_iter().for_each(|id| subscriptions.leave(id)),
                                    None => subscriptions.leave_all(),
                                }
                                ServerMessage::Subscribed { task_ids: subscriptions.task_ids() }
                            }
                            Ok(ClientMessage::Ping) => ServerMessage::Pong,
                            Err(e) => ServerMessage::Error {
                                message: format!("Invalid message: {}", e),
                            },
                        };
                        if !send(&mut sender, &response).await {
                            break;
                        }
                    }
                    Ok(Some(Ok(Message::Close(_)))) | Ok(Some(Err(_))) | Ok(None) => break,
                    Ok(Some(Ok(Message::Ping(data)))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Some(Ok(_))) => {}
                    Err(_) => {
                        debug!("WebSocket client idle");
                    }
                }
            }
        }
    }

    debug!(tasks = ?subscriptions.task_ids(), "WebSocket connection closed");
}
