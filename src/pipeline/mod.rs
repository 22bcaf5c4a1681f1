//! Declarative pipelines: parse a description, build the named sub-graph,
//! run it against a query or a batch of files.
//!
//! Flow: `description` (parse) → `graph` (validate) → `registry` (build
//! components) → `loader` (allocate) → `executor` (run).

pub mod description;
pub mod executor;
pub mod graph;
pub mod loader;
pub mod registry;
pub mod stages;
pub mod types;

use thiserror::Error;

use crate::store::StoreError;

pub use description::{DescriptionFormat, PipelineDescription};
pub use executor::{PipelineState, RunnablePipeline};
pub use loader::PipelineLoader;
pub use types::{ExecutionResult, IndexingResult, RootKind, RunParams};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Pipeline description parse error: {0}")]
    Parse(String),

    #[error("Invalid pipeline: {0}")]
    Validation(String),

    #[error("Pipeline not found: {0}")]
    NotFound(String),

    #[error("Resource allocation failed: {0}")]
    Allocation(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Stage '{stage}' failed: {message}")]
    Execution { stage: String, message: String },

    #[error("Pipeline '{0}' has been released")]
    Released(String),

    #[error("Failed to read pipeline description: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        PipelineError::Allocation(err.to_string())
    }
}
