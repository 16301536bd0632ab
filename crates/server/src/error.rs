use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use orchestrator::OrchestratorError;
use serde::Serialize;

#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Database(db::DbError),
    Orchestrator(OrchestratorError),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            AppError::Database(err) => {
                tracing::error!("Database error: {:?}", err);
                match err {
                    db::DbError::TaskNotFound(id) => (
                        StatusCode::NOT_FOUND,
                        "not_found",
                        format!("Task not found: {}", id),
                    ),
                    _ => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "database_error",
                        "Database error occurred".to_string(),
                    ),
                }
            }
            AppError::Orchestrator(err) => {
                let message = err.to_string();
                match err {
                    OrchestratorError::PipelineNotFound(_)
                    | OrchestratorError::NoPendingApproval(_) => {
                        (StatusCode::NOT_FOUND, "not_found", message)
                    }
                    OrchestratorError::DuplicatePipelineName(_)
                    | OrchestratorError::RunInProgress(_)
                    | OrchestratorError::ApprovalAlreadyPending(_) => {
                        (StatusCode::CONFLICT, "conflict", message)
                    }
                    other => {
                        tracing::error!("Orchestrator error: {:?}", other);
                        (StatusCode::INTERNAL_SERVER_ERROR, "orchestrator_error", message)
                    }
                }
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

impl From<db::DbError> for AppError {
    fn from(err: db::DbError) -> Self {
        AppError::Database(err)
    }
}

impl From<OrchestratorError> for AppError {
    fn from(err: OrchestratorError) -> Self {
        AppError::Orchestrator(err)
    }
}

impl From<phaseflow_core::CoreError> for AppError {
    fn from(err: phaseflow_core::CoreError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}
