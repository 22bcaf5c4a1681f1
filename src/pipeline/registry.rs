//! Component types known to the loader.
//!
//! Resolution happens in two steps so that a bad description is rejected
//! before any store is allocated: [`resolve`] parses and cross-checks the
//! configuration of every component a pipeline needs, then [`instantiate`]
//! builds the stages.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::description::{ComponentSpec, PipelineDescription};
use super::graph::PipelineGraph;
use super::stages::converter::ConverterConfig;
use super::stages::join::JoinConfig;
use super::stages::preprocessor::PreProcessorConfig;
use super::stages::reader::ReaderConfig;
use super::stages::retriever::RetrieverConfig;
use super::stages::{
    Bm25Retriever, DocumentWriter, ExtractiveReader, JoinDocuments, PreProcessor, TextConverter,
};
use super::types::Stage;
use super::PipelineError;
use crate::store::{DuplicatePolicy, InMemoryDocumentStore, StoreCatalog};

pub const COMPONENT_TYPES: &[&str] = &[
    "InMemoryDocumentStore",
    "BM25Retriever",
    "ExtractiveReader",
    "TextConverter",
    "PreProcessor",
    "JoinDocuments",
];

fn default_index() -> String {
    "document".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    #[serde(default = "default_index")]
    pub index: String,
    #[serde(default)]
    pub duplicate_documents: DuplicatePolicy,
}

/// Parsed configuration of one component.
#[derive(Debug, Clone)]
pub enum ComponentConfig {
    Store(StoreConfig),
    Retriever {
        document_store: String,
        config: RetrieverConfig,
    },
    Reader(ReaderConfig),
    Converter(ConverterConfig),
    PreProcessor(PreProcessorConfig),
    Join(JoinConfig),
}

impl ComponentConfig {
    pub fn from_spec(spec: &ComponentSpec) -> Result<Self, PipelineError> {
        let mut params = spec.params.clone();
        let config = match spec.component_type.as_str() {
            "InMemoryDocumentStore" => ComponentConfig::Store(parse(spec, params)?),
            "BM25Retriever" => {
                let document_store = match params.remove("document_store") {
                    Some(Value::String(name)) => name,
                    Some(_) => return Err(bad_params(spec, "'document_store' must be a component name")),
                    None => return Err(bad_params(spec, "missing 'document_store'")),
                };
                ComponentConfig::Retriever {
                    document_store,
                    config: parse(spec, params)?,
                }
            }
            "ExtractiveReader" => ComponentConfig::Reader(parse(spec, params)?),
            "TextConverter" => ComponentConfig::Converter(parse(spec, params)?),
            "PreProcessor" => {
                let config: PreProcessorConfig = parse(spec, params)?;
                config
                    .validate()
                    .map_err(|e| bad_params(spec, &e.to_string()))?;
                ComponentConfig::PreProcessor(config)
            }
            "JoinDocuments" => ComponentConfig::Join(parse(spec, params)?),
            other => {
                return Err(PipelineError::Validation(format!(
                    "component '{}' has unknown type '{other}' (known: {})",
                    spec.name,
                    COMPONENT_TYPES.join(", ")
                )))
            }
        };
        Ok(config)
    }

    /// Name of the component this one depends on, if any.
    pub fn reference(&self) -> Option<&str> {
        match self {
            ComponentConfig::Retriever { document_store, .. } => Some(document_store),
            _ => None,
        }
    }
}

fn parse<T: DeserializeOwned>(spec: &ComponentSpec, params: Map<String, Value>) -> Result<T, PipelineError> {
    serde_json::from_value(Value::Object(params)).map_err(|e| bad_params(spec, &e.to_string()))
}

fn bad_params(spec: &ComponentSpec, msg: &str) -> PipelineError {
    PipelineError::Validation(format!("component '{}' ({}): {msg}", spec.name, spec.component_type))
}

/// Parse every component used by `graph`, plus the stores they reference.
pub fn resolve(
    description: &PipelineDescription,
    graph: &PipelineGraph,
) -> Result<BTreeMap<String, ComponentConfig>, PipelineError> {
    let mut resolved = BTreeMap::new();

    for name in graph.node_names() {
        let spec = lookup(description, name)?;
        let config = ComponentConfig::from_spec(spec)?;

        if let Some(target) = config.reference() {
            let target_spec = description.component(target).ok_or_else(|| {
                PipelineError::Validation(format!(
                    "component '{name}' references unknown component '{target}'"
                ))
            })?;
            let target_config = ComponentConfig::from_spec(target_spec)?;
            if !matches!(target_config, ComponentConfig::Store(_)) {
                return Err(PipelineError::Validation(format!(
                    "component '{name}' references '{target}', which is not a document store"
                )));
            }
            resolved.insert(target.to_string(), target_config);
        }

        resolved.insert(name.to_string(), config);
    }

    Ok(resolved)
}

fn lookup<'a>(description: &'a PipelineDescription, name: &str) -> Result<&'a ComponentSpec, PipelineError> {
    description
        .component(name)
        .ok_or_else(|| PipelineError::Validation(format!("unknown component '{name}'")))
}

/// Build a stage for every node of `graph`, allocating stores in `catalog`.
pub fn instantiate(
    resolved: &BTreeMap<String, ComponentConfig>,
    graph: &PipelineGraph,
    catalog: &StoreCatalog,
) -> Result<HashMap<String, Arc<dyn Stage>>, PipelineError> {
    let store_for = |name: &str| -> Result<(Arc<InMemoryDocumentStore>, DuplicatePolicy), PipelineError> {
        match resolved.get(name) {
            Some(ComponentConfig::Store(cfg)) => Ok((catalog.get_or_create(&cfg.index)?, cfg.duplicate_documents)),
            _ => Err(PipelineError::Allocation(format!("'{name}' is not a resolved document store"))),
        }
    };

    let mut stages: HashMap<String, Arc<dyn Stage>> = HashMap::new();
    for name in graph.node_names() {
        let config = resolved
            .get(name)
            .ok_or_else(|| PipelineError::Allocation(format!("component '{name}' was not resolved")))?;

        let stage: Arc<dyn Stage> = match config {
            ComponentConfig::Store(_) => {
                let (store, policy) = store_for(name)?;
                Arc::new(DocumentWriter::new(store, policy))
            }
            ComponentConfig::Retriever {
                document_store,
                config,
            } => {
                let (store, _) = store_for(document_store)?;
                Arc::new(Bm25Retriever::new(store, config.clone()))
            }
            ComponentConfig::Reader(c) => Arc::new(ExtractiveReader::new(c.clone())),
            ComponentConfig::Converter(c) => Arc::new(TextConverter::new(c.clone())),
            ComponentConfig::PreProcessor(c) => Arc::new(PreProcessor::new(c.clone())),
            ComponentConfig::Join(c) => Arc::new(JoinDocuments::new(c.clone())),
        };
        stages.insert(name.to_string(), stage);
    }

    Ok(stages)
}
