use axum::extract::State;
use axum::Json;
use orchestrator::PipelineInfo;

use crate::state::AppState;

pub async fn list_pipelines(State(state): State<AppState>) -> Json<Vec<PipelineInfo>> {
    Json(state.orchestrator.pipelines())
}
