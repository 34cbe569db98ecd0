use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

use crate::error::{OrchestratorError, PersistenceError};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("job {0} not found")]
    UnknownJob(String),

    #[error("{0}")]
    BadRequest(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::Orchestrator(OrchestratorError::InvalidInput(message)) => {
                json_error(StatusCode::BAD_REQUEST, message)
            }
            ApiError::Orchestrator(OrchestratorError::NotFound(job_id)) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "job not found", "job_id": job_id })),
            )
                .into_response(),
            ApiError::UnknownJob(job_id) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "job not found", "job_id": job_id })),
            )
                .into_response(),
            ApiError::Orchestrator(err @ (OrchestratorError::QueueFull | OrchestratorError::Closed)) => {
                json_error(StatusCode::SERVICE_UNAVAILABLE, &err.to_string())
            }
            ApiError::Persistence(err) => {
                error!(error = %err, "gallery listing failed");
                json_error(StatusCode::INTERNAL_SERVER_ERROR, "could not read generated images")
            }
            ApiError::BadRequest(message) => json_error(StatusCode::BAD_REQUEST, message),
        }
    }
}
