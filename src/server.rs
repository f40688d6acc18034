//! HTTP surface for résumé ranking.
//!
//! - `POST /analyze` – Normalise the uploaded résumés and rank them against a
//!   job description. Body: `{"files": [{"type": "pdf", "data": "<base64>"}],
//!   "job_description": "...", "job_post_id": "..."}`; `job_post_id` may be a
//!   string or a number. Returns `{"analysis", "accepted", "rejected"}`.
//! - `GET /health` – Liveness probe.
//!
//! Status codes: 400 for a malformed request or when no file survives
//! normalisation, 502 when the model fails or times out, 500 otherwise.

use crate::error::RankError;
use crate::rank::{RankRequest, Ranker};
use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Default request body ceiling: a few dozen base64 résumés.
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 64 * 1024 * 1024;

/// Build the HTTP router around a shared [`Ranker`].
pub fn create_router(ranker: Arc<Ranker>, max_request_bytes: usize) -> Router {
    Router::new()
        .route("/analyze", post(analyze))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(max_request_bytes))
        .with_state(ranker)
}

/// Request body for `POST /analyze`. Every field is optional here so that
/// shape errors come back as our own 400s instead of extractor rejections.
#[derive(Deserialize)]
struct AnalyzeRequest {
    #[serde(default)]
    files: Option<Value>,
    #[serde(default)]
    job_description: Option<String>,
    #[serde(default)]
    job_post_id: Option<Value>,
}

impl TryFrom<AnalyzeRequest> for RankRequest {
    type Error = RankError;

    fn try_from(body: AnalyzeRequest) -> Result<Self, Self::Error> {
        let files = match body.files {
            Some(Value::Array(files)) => files,
            Some(_) => return Err(RankError::InvalidRequest("'files' must be a list".into())),
            None => return Err(RankError::InvalidRequest("missing 'files'".into())),
        };
        let job_description = body
            .job_description
            .ok_or_else(|| RankError::InvalidRequest("missing 'job_description'".into()))?;
        let job_post_id = match body.job_post_id {
            Some(Value::String(s)) => s,
            Some(Value::Number(n)) => n.to_string(),
            Some(_) => {
                return Err(RankError::InvalidRequest(
                    "'job_post_id' must be a string or number".into(),
                ))
            }
            None => return Err(RankError::InvalidRequest("missing 'job_post_id'".into())),
        };
        let request = RankRequest {
            files,
            job_description,
            job_post_id,
        };
        request.validate()?;
        Ok(request)
    }
}

/// Success response for `POST /analyze`.
#[derive(Serialize)]
struct AnalyzeResponse {
    /// Model output, verbatim.
    analysis: String,
    accepted: usize,
    rejected: usize,
}

async fn analyze(
    State(ranker): State<Arc<Ranker>>,
    body: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let Json(body) = body.map_err(AppError::Rejected)?;
    let request = RankRequest::try_from(body)?;
    let output = ranker.rank(&request).await?;
    tracing::info!(
        job_post_id = %request.job_post_id,
        accepted = output.stats.accepted,
        rejected = output.stats.rejected,
        "Analyze request completed"
    );
    Ok(Json(AnalyzeResponse {
        analysis: output.analysis,
        accepted: output.stats.accepted,
        rejected: output.stats.rejected,
    }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

enum AppError {
    Rank(RankError),
    Rejected(JsonRejection),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Rejected(rejection) => {
                let status = if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                    StatusCode::PAYLOAD_TOO_LARGE
                } else {
                    StatusCode::BAD_REQUEST
                };
                (status, rejection.body_text())
            }
            AppError::Rank(err) => {
                let status = match err {
                    RankError::InvalidRequest(_) | RankError::EmptyBatch { .. } => {
                        StatusCode::BAD_REQUEST
                    }
                    RankError::AnalysisFailed { .. } | RankError::AnalysisTimeout { .. } => {
                        StatusCode::BAD_GATEWAY
                    }
                    RankError::ProviderNotConfigured { .. }
                    | RankError::InvalidConfig(_)
                    | RankError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                if status.is_server_error() {
                    tracing::error!(error = %err, "Analyze request failed");
                }
                (status, err.to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<RankError> for AppError {
    fn from(inner: RankError) -> Self {
        Self::Rank(inner)
    }
}
