use std::path::Path;

use tokio::sync::Semaphore;

use super::description::{DescriptionFormat, PipelineDescription};
use super::executor::RunnablePipeline;
use super::graph::PipelineGraph;
use super::registry;
use super::PipelineError;
use crate::store::StoreCatalog;

/// Builds runnable pipelines from descriptions.
///
/// Stores created while loading are registered in the shared catalog, so
/// pipelines naming the same index see the same documents.
#[derive(Clone, Default)]
pub struct PipelineLoader {
    catalog: StoreCatalog,
}

impl PipelineLoader {
    pub fn new(catalog: StoreCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &StoreCatalog {
        &self.catalog
    }

    pub fn load_from_path(
        &self,
        path: &Path,
        pipeline_name: &str,
        concurrency_hint: usize,
    ) -> Result<RunnablePipeline, PipelineError> {
        let description = PipelineDescription::from_path(path)?;
        tracing::debug!(path = %path.display(), version = ?description.version(), "pipeline description parsed");
        self.load(&description, pipeline_name, concurrency_hint)
    }

    pub fn load_from_str(
        &self,
        text: &str,
        format: DescriptionFormat,
        pipeline_name: &str,
        concurrency_hint: usize,
    ) -> Result<RunnablePipeline, PipelineError> {
        let description = PipelineDescription::parse(text, format)?;
        self.load(&description, pipeline_name, concurrency_hint)
    }

    /// Validate the named pipeline, then allocate its stages and workers.
    ///
    /// Nothing is allocated unless the name resolves and the sub-graph is
    /// valid. Each call returns a new, independent pipeline.
    pub fn load(
        &self,
        description: &PipelineDescription,
        pipeline_name: &str,
        concurrency_hint: usize,
    ) -> Result<RunnablePipeline, PipelineError> {
        let spec = description.pipeline(pipeline_name)?;
        let graph = PipelineGraph::build(description, spec)?;
        let resolved = registry::resolve(description, &graph)?;

        if concurrency_hint == 0 {
            return Err(PipelineError::Allocation(
                "concurrency hint must be at least 1".into(),
            ));
        }
        if concurrency_hint > Semaphore::MAX_PERMITS {
            return Err(PipelineError::Allocation(format!(
                "concurrency hint {concurrency_hint} exceeds the worker pool limit"
            )));
        }

        let stages = registry::instantiate(&resolved, &graph, &self.catalog)?;

        tracing::info!(
            pipeline = pipeline_name,
            root = graph.root.as_str(),
            stages = stages.len(),
            workers = concurrency_hint,
            "Pipeline loaded"
        );

        Ok(RunnablePipeline::new(
            pipeline_name.to_string(),
            graph,
            stages,
            concurrency_hint,
        ))
    }
}
