use axum::{
    Json,
    extract::{
        Path, Query, Request, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    middleware::Next,
    response::{Html, IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::error::OrchestratorError;
use crate::jobs::{JobId, JobRequest, Orchestrator};
use crate::styles;
use crate::web::error::{ApiError, ApiResult};

const INDEX_HTML: &str = include_str!("../../templates/index.html");
const DEFAULT_GALLERY_LIMIT: usize = 50;

#[derive(Serialize)]
struct SubmitResponse {
    job_id: JobId,
}

#[derive(Debug, Deserialize)]
pub struct GalleryQuery {
    pub limit: Option<usize>,
}

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// POST /generate
pub async fn generate(
    State(orchestrator): State<Orchestrator>,
    payload: Result<Json<JobRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let job_id = orchestrator.submit(request)?;
    Ok(Json(SubmitResponse { job_id }))
}

/// GET /status/{job_id}
pub async fn status(
    State(orchestrator): State<Orchestrator>,
    Path(raw_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let job_id = raw_id
        .parse::<JobId>()
        .map_err(|_| ApiError::UnknownJob(raw_id.clone()))?;
    let job = orchestrator.get_status(&job_id).map_err(|err| match err {
        OrchestratorError::NotFound(_) => {
            info!(job_id = %raw_id, "status requested for unknown job");
            ApiError::UnknownJob(raw_id.clone())
        }
        other => other.into(),
    })?;
    Ok(Json(job))
}

/// GET /api/styles
pub async fn list_styles() -> impl IntoResponse {
    Json(styles::name_map())
}

/// GET /api/images
pub async fn list_images(
    State(orchestrator): State<Orchestrator>,
    query: Result<Query<GalleryQuery>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(query) = query.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let library = orchestrator
        .delivery()
        .library()
        .ok_or_else(|| ApiError::BadRequest("images are delivered inline".to_string()))?;
    let limit = query.limit.unwrap_or(DEFAULT_GALLERY_LIMIT).max(1);
    let images = library.list_images(limit).await?;
    Ok(Json(images))
}

/// Only generated PNGs are served from the output directory; the metadata sidecar stays private.
pub async fn only_png_files(request: Request, next: Next) -> Response {
    let path = request.uri().path();
    let is_png = path
        .rsplit('/')
        .next()
        .is_some_and(|name| name.len() > ".png".len() && name.ends_with(".png"));
    if !is_png {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "image not found" }))).into_response();
    }
    next.run(request).await
}
