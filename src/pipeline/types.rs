use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::{sort_answers, Answer, Document, FileInput};

/// Entry point of a pipeline graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RootKind {
    Query,
    File,
}

impl RootKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Query" => Some(RootKind::Query),
            "File" => Some(RootKind::File),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RootKind::Query => "Query",
            RootKind::File => "File",
        }
    }
}

/// Per-invocation parameters: `{"Retriever": {"top_k": 10}, "debug": true}`.
///
/// Object values keyed by a stage name configure that stage; any other
/// non-object value is a global option offered to every stage.
pub type RunParams = Map<String, Value>;

/// Resolved options for one stage invocation.
pub type StageParams = Map<String, Value>;

/// Data flowing along the edges of a pipeline.
#[derive(Debug, Clone, Default)]
pub struct Payload {
    pub query: Option<String>,
    pub files: Vec<FileInput>,
    pub documents: Vec<Document>,
    pub answers: Vec<Answer>,
    /// Documents persisted by store nodes along the way.
    pub documents_written: usize,
}

impl Payload {
    pub fn from_query(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            ..Self::default()
        }
    }

    pub fn from_files(files: Vec<FileInput>) -> Self {
        Self {
            files,
            ..Self::default()
        }
    }

    /// Combine the outputs of several upstream stages.
    ///
    /// Documents are de-duplicated by id (best score wins, first-seen order
    /// kept); answers are concatenated and re-sorted by score.
    pub fn merge(payloads: Vec<Payload>) -> Payload {
        let mut merged = Payload::default();
        for p in payloads {
            if merged.query.is_none() {
                merged.query = p.query;
            }
            merged.files.extend(p.files);
            for doc in p.documents {
                match merged.documents.iter_mut().find(|d| d.id == doc.id) {
                    Some(existing) => {
                        if doc.score.unwrap_or(f32::MIN) > existing.score.unwrap_or(f32::MIN) {
                            existing.score = doc.score;
                        }
                    }
                    None => merged.documents.push(doc),
                }
            }
            merged.answers.extend(p.answers);
            merged.documents_written += p.documents_written;
        }
        sort_answers(&mut merged.answers);
        merged
    }
}

#[derive(Error, Debug)]
pub enum StageError {
    #[error("{0}")]
    InvalidParams(String),

    /// The run's input cannot be processed by this stage.
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Failed(String),
}

/// One unit of computation in a pipeline.
///
/// Stages hold only their load-time configuration; everything that varies
/// per run arrives through `input` and `params`, so one instance can serve
/// concurrent runs.
pub trait Stage: Send + Sync {
    /// Component type name, as written in the description.
    fn kind(&self) -> &'static str;

    /// Option names accepted in per-run params.
    fn accepted_params(&self) -> &'static [&'static str];

    fn run(&self, input: Payload, params: &StageParams) -> Result<Payload, StageError>;

    /// Combine the outputs of several upstream stages into one input.
    fn combine(&self, inputs: Vec<Payload>) -> Payload {
        Payload::merge(inputs)
    }
}

/// Deserialize run-time overrides, rejecting unknown option names.
pub fn parse_overrides<T: DeserializeOwned>(
    params: &StageParams,
    known: &[&str],
) -> Result<T, StageError> {
    if let Some(unknown) = params.keys().find(|k| !known.contains(&k.as_str())) {
        return Err(StageError::InvalidParams(format!(
            "unknown option '{unknown}' (accepted: {})",
            known.join(", ")
        )));
    }
    serde_json::from_value(Value::Object(params.clone()))
        .map_err(|e| StageError::InvalidParams(e.to_string()))
}

/// Result of a Query-rooted pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub query: String,
    pub answers: Vec<Answer>,
    pub documents: Vec<Document>,
    pub pipeline: String,
    pub elapsed_ms: u64,
}

/// Result of a File-rooted pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingResult {
    pub documents_written: usize,
    pub documents: Vec<Document>,
    pub pipeline: String,
    pub elapsed_ms: u64,
}

/// Params resolved per stage name for one run.
pub type ResolvedParams = HashMap<String, StageParams>;
