use std::sync::Arc;

use serde::Deserialize;

use crate::pipeline::types::{parse_overrides, Payload, Stage, StageError, StageParams};
use crate::store::{DuplicatePolicy, InMemoryDocumentStore, StoreError};

const PARAMS: &[&str] = &["duplicate_documents"];

#[derive(Debug, Default, Deserialize)]
struct WriterOverrides {
    duplicate_documents: Option<DuplicatePolicy>,
}

/// A document store used as a pipeline node: persists incoming documents.
pub struct DocumentWriter {
    store: Arc<InMemoryDocumentStore>,
    policy: DuplicatePolicy,
}

impl DocumentWriter {
    pub fn new(store: Arc<InMemoryDocumentStore>, policy: DuplicatePolicy) -> Self {
        Self { store, policy }
    }
}

impl Stage for DocumentWriter {
    fn kind(&self) -> &'static str {
        "InMemoryDocumentStore"
    }

    fn accepted_params(&self) -> &'static [&'static str] {
        PARAMS
    }

    fn run(&self, input: Payload, params: &StageParams) -> Result<Payload, StageError> {
        let overrides: WriterOverrides = parse_overrides(params, PARAMS)?;
        let policy = overrides.duplicate_documents.unwrap_or(self.policy);

        let written = self
            .store
            .write_documents(input.documents.clone(), policy)
            .map_err(|e| match e {
                StoreError::DuplicateDocument(id) => {
                    StageError::Failed(format!("document {id} already exists in '{}'", self.store.index()))
                }
                other => StageError::Failed(other.to_string()),
            })?;

        Ok(Payload {
            documents_written: input.documents_written + written,
            ..input
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Document, Filters};
    use serde_json::json;

    fn payload(contents: &[&str]) -> Payload {
        Payload {
            documents: contents.iter().map(|c| Document::new(*c)).collect(),
            ..Payload::default()
        }
    }

    #[test]
    fn writes_and_counts() {
        let store = Arc::new(InMemoryDocumentStore::new("document"));
        let writer = DocumentWriter::new(store.clone(), DuplicatePolicy::Overwrite);
        let out = writer.run(payload(&["a", "b"]), &StageParams::new()).unwrap();
        assert_eq!(out.documents_written, 2);
        assert_eq!(out.documents.len(), 2);
        assert_eq!(store.get_all_documents(&Filters::new()).unwrap().len(), 2);
    }

    #[test]
    fn skip_policy_counts_only_new_documents() {
        let store = Arc::new(InMemoryDocumentStore::new("document"));
        let writer = DocumentWriter::new(store.clone(), DuplicatePolicy::Skip);
        writer.run(payload(&["a"]), &StageParams::new()).unwrap();
        let out = writer.run(payload(&["a", "b"]), &StageParams::new()).unwrap();
        assert_eq!(out.documents_written, 1);
        assert_eq!(store.document_count().unwrap(), 2);
    }

    #[test]
    fn fail_policy_from_params() {
        let store = Arc::new(InMemoryDocumentStore::new("document"));
        let writer = DocumentWriter::new(store.clone(), DuplicatePolicy::Overwrite);
        writer.run(payload(&["a"]), &StageParams::new()).unwrap();

        let params = json!({"duplicate_documents": "fail"}).as_object().cloned().unwrap();
        let err = writer.run(payload(&["b", "a"]), &params).unwrap_err();
        assert!(matches!(err, StageError::Failed(_)));
        assert_eq!(store.document_count().unwrap(), 1);
    }
}
