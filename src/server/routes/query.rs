//! `/query` routes: submit, status, result, schema (spec.md §6).

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dispatcher::ColumnSchema;
use crate::error::{DispatcherError, ErrorCode};
use crate::registry::{Format, JobStatus};
use crate::server::app::AppState;

#[derive(Deserialize)]
pub struct QueryRequest {
    pub sql: String,
}

#[derive(Serialize)]
pub struct QueryStatusResponse {
    pub status: JobStatus,
    pub format: Format,
    pub job_id: Uuid,
}

#[derive(Serialize)]
pub struct QuerySchemaResponse {
    pub columns: Vec<ColumnSchema>,
}

/// `POST /query` — submit a SQL string for execution (spec.md §6).
pub async fn submit_query_handler(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryStatusResponse>, ApiError> {
    let handle = state.dispatcher.submit(&req.sql).await?;
    Ok(Json(QueryStatusResponse {
        status: handle.status,
        format: handle.format,
        job_id: handle.job_id,
    }))
}

/// `GET /query/{job_id}` — job status (spec.md §6).
pub async fn query_status_handler(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<QueryStatusResponse>, ApiError> {
    let handle = state.dispatcher.status(job_id).await?;
    Ok(Json(QueryStatusResponse {
        status: handle.status,
        format: handle.format,
        job_id: handle.job_id,
    }))
}

/// `GET /query/{job_id}/result` — stream the stored Arrow IPC artifact
/// (spec.md §6); 400 if not ready, 404 if unknown.
pub async fn query_result_handler(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let stream = state.dispatcher.result_stream(job_id).await?;
    let body = Body::from_stream(stream);

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_DISPOSITION, "attachment; filename=result.arrow")
        .body(body)
        .expect("response with a valid header set"))
}

/// `GET /query/{job_id}/schema` — the result's column schema (spec.md §6).
pub async fn query_schema_handler(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<QuerySchemaResponse>, ApiError> {
    let columns = state.dispatcher.schema(job_id).await?;
    Ok(Json(QuerySchemaResponse { columns }))
}

/// Classifies `DispatcherError` into the HTTP statuses of spec.md §7.
pub struct ApiError(DispatcherError);

impl From<DispatcherError> for ApiError {
    fn from(err: DispatcherError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.0.code();
        let status = match code {
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::NotReady => StatusCode::BAD_REQUEST,
            ErrorCode::Overloaded => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::ExecutionFailed | ErrorCode::UploadFailed => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::RecoveredOrphan | ErrorCode::Shutdown => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (
            status,
            Json(serde_json::json!({
                "error": code.as_str(),
                "detail": self.0.to_string(),
            })),
        )
            .into_response()
    }
}
