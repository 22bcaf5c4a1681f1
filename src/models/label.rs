use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Origin recorded on labels created through the feedback endpoint.
pub const USER_FEEDBACK_ORIGIN: &str = "user-feedback";

/// Feedback on one answer (and the document it came from) for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub id: Uuid,
    pub query: String,
    pub answer: Option<String>,
    pub document_id: Option<String>,
    pub is_correct_answer: bool,
    pub is_correct_document: bool,
    pub no_answer: bool,
    pub origin: String,
    pub pipeline_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub meta: Map<String, Value>,
}

impl Label {
    /// Field lookup used by label filters.
    pub fn field(&self, name: &str) -> Option<Value> {
        match name {
            "id" => Some(Value::String(self.id.to_string())),
            "query" => Some(Value::String(self.query.clone())),
            "answer" => self.answer.clone().map(Value::String),
            "document_id" => self.document_id.clone().map(Value::String),
            "origin" => Some(Value::String(self.origin.clone())),
            "pipeline_id" => self.pipeline_id.clone().map(Value::String),
            "is_correct_answer" => Some(Value::Bool(self.is_correct_answer)),
            "is_correct_document" => Some(Value::Bool(self.is_correct_document)),
            "no_answer" => Some(Value::Bool(self.no_answer)),
            other => self.meta.get(other).cloned(),
        }
    }
}
