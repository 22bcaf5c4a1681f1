//! Search group: readiness, version, and the query endpoint.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::models::{Answer, Document};
use crate::pipeline::{PipelineState, RunParams};

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub params: Option<RunParams>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueryResponse {
    pub query: String,
    pub answers: Vec<Answer>,
    pub documents: Vec<Document>,
}

#[derive(Serialize)]
pub struct VersionResponse {
    pub version: &'static str,
    pub pipeline: String,
    pub state: PipelineState,
}

/// `GET /initialized`: true once the query pipeline is loaded.
pub async fn initialized(State(ctx): State<ApiContext>) -> Json<bool> {
    Json(ctx.query_pipeline.state() != PipelineState::Released)
}

/// `GET /version`
pub async fn version(State(ctx): State<ApiContext>) -> Json<VersionResponse> {
    Json(VersionResponse {
        version: crate::config::APP_VERSION,
        pipeline: ctx.query_pipeline.name().to_string(),
        state: ctx.query_pipeline.state(),
    })
}

/// `POST /query`: run the query pipeline.
///
/// Refused with 503 while the configured number of queries is in flight.
pub async fn query(
    State(ctx): State<ApiContext>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let _permit = ctx.request_limiter.acquire()?;

    if request.query.trim().is_empty() {
        return Err(ApiError::BadRequest("query must not be empty".into()));
    }

    let params = request.params.unwrap_or_default();
    let result = ctx.query_pipeline.run(&request.query, &params).await?;

    tracing::info!(
        query = %result.query,
        answers = result.answers.len(),
        elapsed_ms = result.elapsed_ms,
        "Query answered"
    );

    Ok(Json(QueryResponse {
        query: result.query,
        answers: result.answers,
        documents: result.documents,
    }))
}
