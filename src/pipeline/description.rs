//! Declarative pipeline description: components plus named pipelines.
//!
//! ```yaml
//! version: "1.0"
//! components:
//!   - name: Retriever
//!     type: BM25Retriever
//!     params: { document_store: DocumentStore, top_k: 10 }
//! pipelines:
//!   - name: query_pipeline
//!     nodes:
//!       - name: Retriever
//!         inputs: [Query]
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::PipelineError;

/// Supported description formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptionFormat {
    Yaml,
    Json,
}

impl DescriptionFormat {
    /// Pick a format from a file extension (`.yaml`, `.yml`, `.json`).
    pub fn from_path(path: &Path) -> Result<Self, PipelineError> {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("yaml") | Some("yml") => Ok(DescriptionFormat::Yaml),
            Some("json") => Ok(DescriptionFormat::Json),
            _ => Err(PipelineError::Parse(format!(
                "unsupported description format: {}",
                path.display()
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineDescription {
    #[serde(default)]
    pub version: Option<Value>,
    pub components: Vec<ComponentSpec>,
    pub pipelines: Vec<PipelineSpec>,
}

/// A named, typed component with its default configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub component_type: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineSpec {
    pub name: String,
    pub nodes: Vec<NodeSpec>,
}

/// One stage of a pipeline; `inputs` name a root (`Query`, `File`) or
/// other nodes of the same pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeSpec {
    pub name: String,
    pub inputs: Vec<String>,
}

impl PipelineDescription {
    pub fn parse(text: &str, format: DescriptionFormat) -> Result<Self, PipelineError> {
        match format {
            DescriptionFormat::Yaml => {
                serde_yaml::from_str(text).map_err(|e| PipelineError::Parse(e.to_string()))
            }
            DescriptionFormat::Json => {
                serde_json::from_str(text).map_err(|e| PipelineError::Parse(e.to_string()))
            }
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, PipelineError> {
        let format = DescriptionFormat::from_path(path)?;
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text, format)
    }

    pub fn pipeline(&self, name: &str) -> Result<&PipelineSpec, PipelineError> {
        self.pipelines
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| {
                PipelineError::NotFound(format!(
                    "'{name}' (available: {})",
                    self.pipeline_names().join(", ")
                ))
            })
    }

    pub fn pipeline_names(&self) -> Vec<&str> {
        self.pipelines.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn component(&self, name: &str) -> Option<&ComponentSpec> {
        self.components.iter().find(|c| c.name == name)
    }

    /// Version as text, whether written as a string or a number.
    pub fn version(&self) -> Option<String> {
        self.version.as_ref().map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}
