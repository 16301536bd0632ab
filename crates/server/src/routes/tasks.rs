use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use events::ApprovalPayload;
use orchestrator::{CancelOutcome, OrchestratorError};
use phaseflow_core::{CreateTaskRequest, Task};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

pub async fn list_tasks(State(state): State<AppState>) -> Result<Json<Vec<Task>>, AppError> {
    let tasks = state.tasks.find_all().await?;
    Ok(Json(tasks))
}

pub async fn create_task(
    State(state): State<AppState>,
    Json(payload): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<Task>), AppError> {
    payload.validate()?;

    let created = state.tasks.create(&payload.into_task()).await?;
    tracing::info!(task_id = %created.id, "Task created");

    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Task>, AppError> {
    Ok(Json(load_task(&state, id).await?))
}

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    pub pipeline: String,
}

#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub task_id: Uuid,
    pub pipeline: String,
    pub phases: Vec<String>,
}

/// Start a pipeline run in the background. Progress is observed over `/ws`.
pub async fn run_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RunRequest>,
) -> Result<(StatusCode, Json<RunResponse>), AppError> {
    let task = load_task(&state, id).await?;

    let phases = state
        .orchestrator
        .pipeline(&payload.pipeline)
        .map(|pipeline| pipeline.phase_names())
        .ok_or_else(|| OrchestratorError::PipelineNotFound(payload.pipeline.clone()))?;

    if state.orchestrator.is_running(id) {
        return Err(OrchestratorError::RunInProgress(id).into());
    }

    let orchestrator = state.orchestrator.clone();
    let pipeline = payload.pipeline.clone();
    tokio::spawn(async move {
        let initial = orchestrator.initial_context(&task);
        match orchestrator.run(&pipeline, &task, initial).await {
            Ok(result) => tracing::info!(
                task_id = %task.id,
                pipeline = %pipeline,
                success = result.success,
                "Pipeline run finished"
            ),
            Err(e) => tracing::warn!(
                task_id = %task.id,
                pipeline = %pipeline,
                error = %e,
                "Pipeline run rejected"
            ),
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(RunResponse {
            task_id: id,
            pipeline: payload.pipeline,
            phases,
        }),
    ))
}

pub async fn get_pending_approval(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApprovalPayload>, AppError> {
    state
        .orchestrator
        .context()
        .approvals
        .pending_payload(id)
        .map(Json)
        .ok_or_else(|| OrchestratorError::NoPendingApproval(id).into())
}

#[derive(Debug, Deserialize)]
pub struct ApprovalRequest {
    pub approved: bool,
}

#[derive(Debug, Serialize)]
pub struct ApprovalResponse {
    pub task_id: Uuid,
    pub approved: bool,
}

pub async fn resolve_approval(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ApprovalRequest>,
) -> Result<Json<ApprovalResponse>, AppError> {
    state.orchestrator.resolve_approval(id, payload.approved)?;
    tracing::info!(task_id = %id, approved = payload.approved, "Approval resolved");

    Ok(Json(ApprovalResponse {
        task_id: id,
        approved: payload.approved,
    }))
}

pub async fn cancel_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CancelOutcome>, AppError> {
    Ok(Json(state.orchestrator.cancel(id).await?))
}

async fn load_task(state: &AppState, id: Uuid) -> Result<Task, AppError> {
    state
        .tasks
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Task not found: {}", id)))
}
