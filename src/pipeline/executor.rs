//! Running a loaded pipeline.
//!
//! Stages execute level by level; stages of one level run concurrently on
//! blocking worker threads, each holding a permit from the pipeline's pool.
//! The first failing stage aborts the run: stages still waiting for a
//! worker are skipped, and the run returns only once every started stage
//! of the level has finished.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures_util::future::join_all;
use serde::Serialize;
use serde_json::Map;
use tokio::sync::Semaphore;

use super::graph::{NodeInput, PipelineGraph};
use super::types::{
    ExecutionResult, IndexingResult, Payload, ResolvedParams, RootKind, RunParams, Stage,
    StageError, StageParams,
};
use super::PipelineError;
use crate::models::FileInput;

/// Lifecycle of a loaded pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Loaded,
    Running,
    Released,
}

/// A validated, instantiated pipeline with its own worker pool.
pub struct RunnablePipeline {
    name: String,
    graph: PipelineGraph,
    stages: HashMap<String, Arc<dyn Stage>>,
    workers: Arc<Semaphore>,
    concurrency: usize,
    active_runs: AtomicUsize,
    released: AtomicBool,
}

impl fmt::Debug for RunnablePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnablePipeline")
            .field("name", &self.name)
            .field("root", &self.graph.root)
            .field("concurrency", &self.concurrency)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Counts a run as active for as long as it lives.
struct RunGuard<'a>(&'a AtomicUsize);

impl<'a> RunGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl RunnablePipeline {
    pub(crate) fn new(
        name: String,
        graph: PipelineGraph,
        stages: HashMap<String, Arc<dyn Stage>>,
        concurrency: usize,
    ) -> Self {
        Self {
            name,
            graph,
            stages,
            workers: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            active_runs: AtomicUsize::new(0),
            released: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> RootKind {
        self.graph.root
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn topology(&self) -> &PipelineGraph {
        &self.graph
    }

    /// Stage names in execution order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.graph.node_names().collect()
    }

    pub fn state(&self) -> PipelineState {
        if self.released.load(Ordering::SeqCst) {
            PipelineState::Released
        } else if self.active_runs.load(Ordering::SeqCst) > 0 {
            PipelineState::Running
        } else {
            PipelineState::Loaded
        }
    }

    /// Release the worker pool. Runs still waiting for a worker fail, and
    /// later runs are refused.
    pub fn shutdown(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.workers.close();
            tracing::info!(pipeline = %self.name, "Pipeline released");
        }
    }

    /// Answer `query` with a Query-rooted pipeline.
    pub async fn run(&self, query: &str, params: &RunParams) -> Result<ExecutionResult, PipelineError> {
        self.expect_root(RootKind::Query)?;
        let started = Instant::now();
        let output = self.execute(Payload::from_query(query), params).await?;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            pipeline = %self.name,
            answers = output.answers.len(),
            documents = output.documents.len(),
            elapsed_ms,
            "Pipeline run finished"
        );

        Ok(ExecutionResult {
            query: query.to_string(),
            answers: output.answers,
            documents: output.documents,
            pipeline: self.name.clone(),
            elapsed_ms,
        })
    }

    /// Feed `files` through a File-rooted pipeline.
    pub async fn run_files(
        &self,
        files: Vec<FileInput>,
        params: &RunParams,
    ) -> Result<IndexingResult, PipelineError> {
        self.expect_root(RootKind::File)?;
        if files.is_empty() {
            return Err(PipelineError::InvalidInput("no files provided".into()));
        }
        let started = Instant::now();
        let output = self.execute(Payload::from_files(files), params).await?;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            pipeline = %self.name,
            written = output.documents_written,
            elapsed_ms,
            "Indexing run finished"
        );

        Ok(IndexingResult {
            documents_written: output.documents_written,
            documents: output.documents,
            pipeline: self.name.clone(),
            elapsed_ms,
        })
    }

    fn expect_root(&self, kind: RootKind) -> Result<(), PipelineError> {
        if self.released.load(Ordering::SeqCst) {
            return Err(PipelineError::Released(self.name.clone()));
        }
        if self.graph.root != kind {
            return Err(PipelineError::InvalidInput(format!(
                "pipeline '{}' reads from '{}', not '{}'",
                self.name,
                self.graph.root.as_str(),
                kind.as_str()
            )));
        }
        Ok(())
    }

    /// Split run params into per-stage option maps.
    ///
    /// Object values keyed by a stage name go to that stage. Other values
    /// are globals, offered to every stage that accepts the option; a
    /// stage-specific value wins over a global one.
    pub fn resolve_params(&self, params: &RunParams) -> Result<ResolvedParams, PipelineError> {
        let mut globals = Map::new();
        for (key, value) in params {
            if self.stages.contains_key(key) {
                if !value.is_object() {
                    return Err(PipelineError::InvalidParams(format!(
                        "params for stage '{key}' must be an object"
                    )));
                }
                continue;
            }
            if value.is_object() {
                return Err(PipelineError::InvalidParams(format!(
                    "no stage named '{key}' in pipeline '{}' (stages: {})",
                    self.name,
                    self.stage_names().join(", ")
                )));
            }
            if !self.stages.values().any(|s| s.accepted_params().contains(&key.as_str())) {
                return Err(PipelineError::InvalidParams(format!(
                    "option '{key}' is not accepted by any stage"
                )));
            }
            globals.insert(key.clone(), value.clone());
        }

        let mut resolved = ResolvedParams::new();
        for (name, stage) in &self.stages {
            let mut own: StageParams = globals
                .iter()
                .filter(|(k, _)| stage.accepted_params().contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            if let Some(specific) = params.get(name).and_then(|v| v.as_object()) {
                own.extend(specific.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            resolved.insert(name.clone(), own);
        }
        Ok(resolved)
    }

    async fn execute(&self, root: Payload, params: &RunParams) -> Result<Payload, PipelineError> {
        let mut resolved = self.resolve_params(params)?;
        let _guard = RunGuard::enter(&self.active_runs);
        let aborted = Arc::new(AtomicBool::new(false));

        tracing::debug!(pipeline = %self.name, root = self.graph.root.as_str(), "Pipeline run started");

        let mut outputs: HashMap<String, Payload> = HashMap::new();
        for level in &self.graph.levels {
            let mut tasks = Vec::with_capacity(level.len());
            for node in level {
                let input = self.gather(node, &root, &outputs)?;
                let stage_params = resolved.remove(node).unwrap_or_default();
                tasks.push(self.run_stage(node, input, stage_params, aborted.clone()));
            }
            // Every stage of the level settles before the first error is returned.
            let results = join_all(tasks).await;
            for (node, result) in level.iter().zip(results) {
                if let Some(output) = result? {
                    outputs.insert(node.clone(), output);
                }
            }
        }

        outputs.remove(&self.graph.sink).ok_or_else(|| PipelineError::Execution {
            stage: self.graph.sink.clone(),
            message: "produced no output".into(),
        })
    }

    fn stage(&self, node: &str) -> Result<Arc<dyn Stage>, PipelineError> {
        self.stages.get(node).cloned().ok_or_else(|| PipelineError::Execution {
            stage: node.to_string(),
            message: "stage is not instantiated".into(),
        })
    }

    fn gather(
        &self,
        node: &str,
        root: &Payload,
        outputs: &HashMap<String, Payload>,
    ) -> Result<Payload, PipelineError> {
        let inputs = self.graph.inputs.get(node).map(Vec::as_slice).unwrap_or_default();
        let mut payloads = Vec::with_capacity(inputs.len());
        for input in inputs {
            let payload = match input {
                NodeInput::Root(_) => root.clone(),
                NodeInput::Node(name) => outputs.get(name).cloned().ok_or_else(|| {
                    PipelineError::Execution {
                        stage: node.to_string(),
                        message: format!("input '{name}' has not run"),
                    }
                })?,
            };
            payloads.push(payload);
        }

        Ok(match payloads.len() {
            1 => payloads.pop().unwrap_or_default(),
            _ => self.stage(node)?.combine(payloads),
        })
    }

    /// Run one stage on a pooled worker. Returns `Ok(None)` when the stage
    /// was skipped because another stage of the run already failed.
    async fn run_stage(
        &self,
        node: &str,
        input: Payload,
        params: StageParams,
        aborted: Arc<AtomicBool>,
    ) -> Result<Option<Payload>, PipelineError> {
        let result = self.run_on_worker(node, input, params, &aborted).await;
        if result.is_err() {
            aborted.store(true, Ordering::SeqCst);
        }
        result
    }

    async fn run_on_worker(
        &self,
        node: &str,
        input: Payload,
        params: StageParams,
        aborted: &Arc<AtomicBool>,
    ) -> Result<Option<Payload>, PipelineError> {
        let stage = self.stage(node)?;
        let permit = self
            .workers
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PipelineError::Released(self.name.clone()))?;

        if aborted.load(Ordering::SeqCst) {
            tracing::debug!(pipeline = %self.name, stage = node, "Stage skipped after an earlier failure");
            return Ok(None);
        }

        let started = Instant::now();
        let flag = aborted.clone();
        let result = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let result = stage.run(input, &params);
            // Raised before the permit is returned, so a stage queued behind
            // this one sees it.
            if result.is_err() {
                flag.store(true, Ordering::SeqCst);
            }
            result
        })
        .await
        .map_err(|e| PipelineError::Execution {
            stage: node.to_string(),
            message: format!("worker task failed: {e}"),
        })?;

        match result {
            Ok(output) => {
                tracing::debug!(
                    pipeline = %self.name,
                    stage = node,
                    documents = output.documents.len(),
                    answers = output.answers.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Stage finished"
                );
                Ok(Some(output))
            }
            Err(StageError::InvalidParams(msg)) => {
                Err(PipelineError::InvalidParams(format!("stage '{node}': {msg}")))
            }
            Err(StageError::InvalidInput(msg)) => {
                tracing::info!(pipeline = %self.name, stage = node, error = %msg, "Stage rejected input");
                Err(PipelineError::InvalidInput(format!("stage '{node}': {msg}")))
            }
            Err(StageError::Failed(message)) => {
                tracing::warn!(pipeline = %self.name, stage = node, error = %message, "Stage failed");
                Err(PipelineError::Execution {
                    stage: node.to_string(),
                    message,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{DescriptionFormat, PipelineLoader};
    use crate::store::memory::tests::people_documents;
    use crate::store::{DuplicatePolicy, StoreCatalog};
    use serde_json::json;
    use std::time::Duration;

    const SAMPLE: &str = include_str!("../../samples/pipeline/test_pipeline.yaml");

    fn params(v: serde_json::Value) -> RunParams {
        v.as_object().cloned().unwrap()
    }

    fn query_pipeline(workers: usize) -> (RunnablePipeline, StoreCatalog) {
        let catalog = StoreCatalog::new();
        let pipeline = PipelineLoader::new(catalog.clone())
            .load_from_str(SAMPLE, DescriptionFormat::Yaml, "query_pipeline", workers)
            .unwrap();
        catalog
            .get_or_create("document")
            .unwrap()
            .write_documents(people_documents(), DuplicatePolicy::Overwrite)
            .unwrap();
        (pipeline, catalog)
    }

    #[tokio::test]
    async fn answers_who_lives_in_berlin() {
        let (pipeline, _catalog) = query_pipeline(8);
        let result = pipeline
            .run(
                "Who lives in Berlin?",
                &params(json!({"Retriever": {"top_k": 10}, "Reader": {"top_k": 3}})),
            )
            .await
            .unwrap();

        assert_eq!(result.query, "Who lives in Berlin?");
        assert_eq!(result.pipeline, "query_pipeline");
        assert!(!result.answers.is_empty() && result.answers.len() <= 3);
        assert_eq!(result.answers[0].answer, "Carla");
        assert!(result.documents[0].content.contains("Berlin"));
        assert_eq!(pipeline.state(), PipelineState::Loaded);
    }

    #[tokio::test]
    async fn sequential_runs_do_not_share_params() {
        let (pipeline, _catalog) = query_pipeline(2);
        let narrow = pipeline
            .run("Who lives in Berlin?", &params(json!({"Reader": {"top_k": 1}})))
            .await
            .unwrap();
        let default = pipeline.run("Who lives in Berlin?", &RunParams::new()).await.unwrap();

        assert_eq!(narrow.answers.len(), 1);
        assert!(default.answers.len() > 1);
        assert_eq!(narrow.answers[0].answer, default.answers[0].answer);
    }

    #[tokio::test]
    async fn concurrent_runs_are_isolated() {
        let (pipeline, _catalog) = query_pipeline(4);
        let a_params = params(json!({"Reader": {"top_k": 1}}));
        let b_params = params(json!({"Retriever": {"top_k": 1}}));
        let (a, b) = tokio::join!(
            pipeline.run("Who lives in Berlin?", &a_params),
            pipeline.run("Who lives in Paris?", &b_params),
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.answers.len(), 1);
        assert_eq!(b.documents.len(), 1);
        assert!(b.documents[0].content.contains("Paris"));
    }

    #[tokio::test]
    async fn global_params_reach_every_accepting_stage() {
        let (pipeline, _catalog) = query_pipeline(2);
        let resolved = pipeline
            .resolve_params(&params(json!({"top_k": 2, "Reader": {"top_k": 1}})))
            .unwrap();
        assert_eq!(resolved["Retriever"]["top_k"], 2);
        assert_eq!(resolved["Reader"]["top_k"], 1);

        let result = pipeline
            .run("Who lives in Berlin?", &params(json!({"top_k": 2})))
            .await
            .unwrap();
        assert_eq!(result.documents.len(), 2);
        assert!(result.answers.len() <= 2);
    }

    #[tokio::test]
    async fn rejects_unknown_params() {
        let (pipeline, _catalog) = query_pipeline(2);
        for bad in [
            json!({"Ranker": {"top_k": 1}}),
            json!({"Retriever": {"depth": 1}}),
            json!({"Retriever": 3}),
            json!({"temperature": 0.2}),
        ] {
            let err = pipeline.run("Who lives in Berlin?", &params(bad.clone())).await.unwrap_err();
            assert!(matches!(err, PipelineError::InvalidParams(_)), "{bad}");
        }
    }

    #[tokio::test]
    async fn wrong_input_kind_is_rejected() {
        let (pipeline, _catalog) = query_pipeline(2);
        let err = pipeline
            .run_files(vec![FileInput::new("a.txt", b"x".to_vec())], &RunParams::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn indexing_pipeline_feeds_query_pipeline() {
        let catalog = StoreCatalog::new();
        let loader = PipelineLoader::new(catalog.clone());
        let indexing = loader
            .load_from_str(SAMPLE, DescriptionFormat::Yaml, "indexing_pipeline", 2)
            .unwrap();
        let query = loader
            .load_from_str(SAMPLE, DescriptionFormat::Yaml, "query_pipeline", 2)
            .unwrap();

        let mut file = FileInput::new("cities.txt", b"My name is Carla and I live in Berlin".to_vec());
        file.meta.insert("source".into(), json!("upload"));
        let indexed = indexing.run_files(vec![file], &RunParams::new()).await.unwrap();
        assert_eq!(indexed.documents_written, 1);
        assert_eq!(indexed.documents[0].meta["name"], "cities.txt");

        let result = query.run("Who lives in Berlin?", &RunParams::new()).await.unwrap();
        assert_eq!(result.answers[0].answer, "Carla");
        assert_eq!(result.documents[0].meta["source"], "upload");

        let err = indexing
            .run_files(vec![FileInput::new("a.pdf", b"x".to_vec())], &RunParams::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(ref msg) if msg.contains("TextConverter")));
    }

    #[tokio::test]
    async fn released_pipeline_refuses_runs() {
        let (pipeline, _catalog) = query_pipeline(2);
        pipeline.shutdown();
        pipeline.shutdown();
        assert_eq!(pipeline.state(), PipelineState::Released);
        let err = pipeline.run("Who lives in Berlin?", &RunParams::new()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Released(_)));
    }

    /// Records the peak number of concurrent calls and completed calls.
    #[derive(Default)]
    struct Probe {
        running: AtomicUsize,
        peak: AtomicUsize,
        finished: AtomicUsize,
    }

    struct SlowStage(Arc<Probe>);

    impl Stage for SlowStage {
        fn kind(&self) -> &'static str {
            "Slow"
        }

        fn accepted_params(&self) -> &'static [&'static str] {
            &[]
        }

        fn run(&self, input: Payload, _params: &StageParams) -> Result<Payload, StageError> {
            let now = self.0.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.0.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            self.0.running.fetch_sub(1, Ordering::SeqCst);
            self.0.finished.fetch_add(1, Ordering::SeqCst);
            Ok(input)
        }
    }

    struct FailingStage;

    impl Stage for FailingStage {
        fn kind(&self) -> &'static str {
            "Failing"
        }

        fn accepted_params(&self) -> &'static [&'static str] {
            &[]
        }

        fn run(&self, _input: Payload, _params: &StageParams) -> Result<Payload, StageError> {
            Err(StageError::Failed("boom".into()))
        }
    }

    fn fan_out(workers: usize, branches: [Arc<dyn Stage>; 3], join: Arc<dyn Stage>) -> RunnablePipeline {
        let yaml = r#"
components:
  - { name: A, type: ExtractiveReader }
  - { name: B, type: ExtractiveReader }
  - { name: C, type: ExtractiveReader }
  - { name: Join, type: JoinDocuments }
pipelines:
  - name: fan
    nodes:
      - { name: A, inputs: [Query] }
      - { name: B, inputs: [Query] }
      - { name: C, inputs: [Query] }
      - { name: Join, inputs: [A, B, C] }
"#;
        let description =
            crate::pipeline::PipelineDescription::parse(yaml, DescriptionFormat::Yaml).unwrap();
        let graph = PipelineGraph::build(&description, description.pipeline("fan").unwrap()).unwrap();
        let mut stages: HashMap<String, Arc<dyn Stage>> = HashMap::new();
        for (name, stage) in ["A", "B", "C"].into_iter().zip(branches) {
            stages.insert(name.into(), stage);
        }
        stages.insert("Join".into(), join);
        RunnablePipeline::new("fan".into(), graph, stages, workers)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn worker_pool_bounds_stage_concurrency() {
        let probe = Arc::new(Probe::default());
        let stage: Arc<dyn Stage> = Arc::new(SlowStage(probe.clone()));
        let pipeline = fan_out(2, [stage.clone(), stage.clone(), stage.clone()], stage);
        pipeline.run("q", &RunParams::new()).await.unwrap();
        assert!(probe.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(pipeline.state(), PipelineState::Loaded);
    }

    #[tokio::test]
    async fn first_failure_aborts_the_run() {
        let probe = Arc::new(Probe::default());
        let failing: Arc<dyn Stage> = Arc::new(FailingStage);
        let pipeline = fan_out(
            4,
            [failing.clone(), failing.clone(), failing],
            Arc::new(SlowStage(probe.clone())),
        );
        let err = pipeline.run("q", &RunParams::new()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Execution { ref message, .. } if message == "boom"));
        assert_eq!(probe.peak.load(Ordering::SeqCst), 0);
        assert_eq!(pipeline.state(), PipelineState::Loaded);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn failed_run_returns_after_started_siblings_finish() {
        let probe = Arc::new(Probe::default());
        let slow: Arc<dyn Stage> = Arc::new(SlowStage(probe.clone()));
        let join = Arc::new(SlowStage(Arc::new(Probe::default())));
        let failing: Arc<dyn Stage> = Arc::new(FailingStage);
        let pipeline = fan_out(4, [failing, slow.clone(), slow], join);

        let err = pipeline.run("q", &RunParams::new()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Execution { ref stage, .. } if stage == "A"));

        let finished_at_return = probe.finished.load(Ordering::SeqCst);
        assert_eq!(probe.running.load(Ordering::SeqCst), 0);
        assert_eq!(pipeline.workers.available_permits(), 4);
        assert_eq!(pipeline.state(), PipelineState::Loaded);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(probe.finished.load(Ordering::SeqCst), finished_at_return);
    }

    #[tokio::test]
    async fn stages_waiting_for_a_worker_are_skipped_after_a_failure() {
        let probe = Arc::new(Probe::default());
        let slow: Arc<dyn Stage> = Arc::new(SlowStage(probe.clone()));
        let failing: Arc<dyn Stage> = Arc::new(FailingStage);
        let pipeline = fan_out(1, [failing, slow.clone(), slow.clone()], slow);

        let err = pipeline.run("q", &RunParams::new()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Execution { ref stage, .. } if stage == "A"));
        assert_eq!(probe.finished.load(Ordering::SeqCst), 0);
        assert_eq!(pipeline.workers.available_permits(), 1);
    }

    #[test]
    fn debug_shows_name_and_state() {
        let (pipeline, _catalog) = query_pipeline(2);
        let shown = format!("{pipeline:?}");
        assert!(shown.contains("query_pipeline"));
        assert!(shown.contains("Loaded"));
    }
}
