use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::IntoResponse;

use websocket::WsState;

use crate::state::AppState;

/// Observer socket. Clients pick task channels with a `subscribe` message.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    tracing::debug!(channels = ?state.bridge, "Observer connecting");
    websocket::ws_handler(ws, State(WsState::new(state.bridge))).await
}
