//! Documents group: inspect and delete stored documents by metadata filter.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::models::{Document, Filters};

#[derive(Debug, Default, Deserialize)]
pub struct FilterRequest {
    #[serde(default)]
    pub filters: Filters,
}

/// `POST /documents/get_by_filters`
pub async fn get_by_filters(
    State(ctx): State<ApiContext>,
    Json(request): Json<FilterRequest>,
) -> Result<Json<Vec<Document>>, ApiError> {
    Ok(Json(ctx.store()?.get_all_documents(&request.filters)?))
}

/// `POST /documents/delete_by_filters`: an empty filter deletes every
/// document in the index.
pub async fn delete_by_filters(
    State(ctx): State<ApiContext>,
    Json(request): Json<FilterRequest>,
) -> Result<Json<bool>, ApiError> {
    let deleted = ctx.store()?.delete_documents(&request.filters)?;
    tracing::info!(index = %ctx.index, deleted, "Documents deleted");
    Ok(Json(true))
}
