pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health_check))
        .route("/api/pipelines", get(routes::list_pipelines))
        .route(
            "/api/tasks",
            get(routes::list_tasks).post(routes::create_task),
        )
        .route("/api/tasks/{id}", get(routes::get_task))
        .route("/api/tasks/{id}/run", post(routes::run_task))
        .route(
            "/api/tasks/{id}/approval",
            get(routes::get_pending_approval).post(routes::resolve_approval),
        )
        .route("/api/tasks/{id}/cancel", post(routes::cancel_task))
        .route("/ws", get(routes::websocket_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
