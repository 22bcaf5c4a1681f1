use std::sync::Arc;

use serde::Deserialize;

use crate::models::Filters;
use crate::pipeline::types::{parse_overrides, Payload, Stage, StageError, StageParams};
use crate::store::InMemoryDocumentStore;

const PARAMS: &[&str] = &["top_k", "filters"];

fn default_top_k() -> usize {
    10
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrieverConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub filters: Filters,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            filters: Filters::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RetrieverOverrides {
    top_k: Option<usize>,
    filters: Option<Filters>,
}

/// Lexical retriever: BM25 over the referenced document store.
pub struct Bm25Retriever {
    store: Arc<InMemoryDocumentStore>,
    config: RetrieverConfig,
}

impl Bm25Retriever {
    pub fn new(store: Arc<InMemoryDocumentStore>, config: RetrieverConfig) -> Self {
        Self { store, config }
    }
}

impl Stage for Bm25Retriever {
    fn kind(&self) -> &'static str {
        "BM25Retriever"
    }

    fn accepted_params(&self) -> &'static [&'static str] {
        PARAMS
    }

    fn run(&self, input: Payload, params: &StageParams) -> Result<Payload, StageError> {
        let overrides: RetrieverOverrides = parse_overrides(params, PARAMS)?;
        let top_k = overrides.top_k.unwrap_or(self.config.top_k);
        let filters = overrides.filters.as_ref().unwrap_or(&self.config.filters);

        let query = input
            .query
            .as_deref()
            .ok_or_else(|| StageError::Failed("retriever requires a query".into()))?;

        let documents = self
            .store
            .query_bm25(query, top_k, filters)
            .map_err(|e| StageError::Failed(e.to_string()))?;

        tracing::debug!(index = self.store.index(), top_k, hits = documents.len(), "bm25 retrieval");

        Ok(Payload {
            documents,
            ..input
        })
    }
}
