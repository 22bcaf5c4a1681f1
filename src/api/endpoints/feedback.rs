//! Feedback group: user labels on answers and their aggregate accuracy.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::models::{Filters, Label, USER_FEEDBACK_ORIGIN};

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub query: String,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub document_id: Option<String>,
    pub is_correct_answer: bool,
    pub is_correct_document: bool,
    #[serde(default)]
    pub no_answer: bool,
    #[serde(default)]
    pub pipeline_id: Option<String>,
    #[serde(default)]
    pub meta: Map<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EvalRequest {
    #[serde(default)]
    pub filters: Filters,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct EvalResponse {
    /// Percentage of labels marking the answer correct.
    pub answer_accuracy: Option<f64>,
    pub document_accuracy: Option<f64>,
    pub n_feedback: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub deleted: usize,
}

/// `POST /feedback`: store one user label.
pub async fn record(
    State(ctx): State<ApiContext>,
    Json(request): Json<FeedbackRequest>,
) -> Result<Json<Label>, ApiError> {
    if request.query.trim().is_empty() {
        return Err(ApiError::BadRequest("query must not be empty".into()));
    }

    let label = Label {
        id: request.id.unwrap_or_else(Uuid::new_v4),
        query: request.query,
        answer: request.answer,
        document_id: request.document_id,
        is_correct_answer: request.is_correct_answer,
        is_correct_document: request.is_correct_document,
        no_answer: request.no_answer,
        origin: USER_FEEDBACK_ORIGIN.to_string(),
        pipeline_id: request
            .pipeline_id
            .or_else(|| Some(ctx.query_pipeline.name().to_string())),
        created_at: Utc::now(),
        meta: request.meta,
    };

    ctx.store()?.write_label(label.clone())?;
    tracing::debug!(label = %label.id, "Feedback recorded");
    Ok(Json(label))
}

/// `GET /feedback`: all labels of the served index.
pub async fn list(State(ctx): State<ApiContext>) -> Result<Json<Vec<Label>>, ApiError> {
    Ok(Json(ctx.store()?.get_all_labels(&Filters::new())?))
}

/// `DELETE /feedback`: remove user-provided labels only.
pub async fn delete(State(ctx): State<ApiContext>) -> Result<Json<DeleteResponse>, ApiError> {
    let filters = Filters::new().with("origin", vec![Value::from(USER_FEEDBACK_ORIGIN)]);
    let deleted = ctx.store()?.delete_labels(&filters)?;
    tracing::info!(deleted, "User feedback deleted");
    Ok(Json(DeleteResponse { deleted }))
}

/// `POST /eval-feedback`: accuracy over user feedback matching `filters`.
pub async fn evaluate(
    State(ctx): State<ApiContext>,
    request: Option<Json<EvalRequest>>,
) -> Result<Json<EvalResponse>, ApiError> {
    let filters = request.map(|Json(r)| r.filters).unwrap_or_default();
    let labels: Vec<Label> = ctx
        .store()?
        .get_all_labels(&filters)?
        .into_iter()
        .filter(|l| l.origin == USER_FEEDBACK_ORIGIN)
        .collect();

    Ok(Json(accuracy(&labels)))
}

fn accuracy(labels: &[Label]) -> EvalResponse {
    if labels.is_empty() {
        return EvalResponse {
            answer_accuracy: None,
            document_accuracy: None,
            n_feedback: 0,
        };
    }
    let n = labels.len() as f64;
    let percent = |count: usize| (count as f64 / n * 10_000.0).round() / 100.0;
    EvalResponse {
        answer_accuracy: Some(percent(labels.iter().filter(|l| l.is_correct_answer).count())),
        document_accuracy: Some(percent(labels.iter().filter(|l| l.is_correct_document).count())),
        n_feedback: labels.len(),
    }
}
