//! File upload group: index uploaded files through the indexing pipeline.
//!
//! `POST /file-upload`: multipart form with one or more `files` parts and
//! an optional `meta` part holding a JSON object applied to every file.

use axum::extract::{Multipart, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::models::FileInput;
use crate::pipeline::RunParams;

/// Maximum number of files per upload request.
const MAX_FILES: usize = 100;

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub files: Vec<String>,
    pub documents_written: usize,
}

pub async fn upload(
    State(ctx): State<ApiContext>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let pipeline = ctx.indexing_pipeline.clone().ok_or_else(|| {
        ApiError::NotConfigured("no indexing pipeline is loaded; file upload is disabled".into())
    })?;

    let mut files: Vec<FileInput> = Vec::new();
    let mut meta: Map<String, Value> = Map::new();
    let mut params = RunParams::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "files" => {
                if files.len() >= MAX_FILES {
                    return Err(ApiError::BadRequest(format!("At most {MAX_FILES} files per upload")));
                }
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Cannot read '{file_name}': {e}")))?;
                files.push(FileInput::new(file_name, bytes.to_vec()));
            }
            "meta" | "params" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Cannot read '{name}': {e}")))?;
                if text.trim().is_empty() || text.trim() == "null" {
                    continue;
                }
                let object = serde_json::from_str::<Map<String, Value>>(&text)
                    .map_err(|e| ApiError::BadRequest(format!("'{name}' must be a JSON object: {e}")))?;
                if name == "meta" {
                    meta = object;
                } else {
                    params = object;
                }
            }
            other => {
                return Err(ApiError::BadRequest(format!("Unexpected form field '{other}'")));
            }
        }
    }

    if files.is_empty() {
        return Err(ApiError::BadRequest("No files in upload".into()));
    }

    for file in &mut files {
        file.meta = meta.clone();
    }
    let names: Vec<String> = files.iter().map(|f| f.name.clone()).collect();

    let result = pipeline.run_files(files, &params).await?;
    tracing::info!(
        files = names.len(),
        written = result.documents_written,
        elapsed_ms = result.elapsed_ms,
        "Files indexed"
    );

    Ok(Json(UploadResponse {
        files: names,
        documents_written: result.documents_written,
    }))
}
