//! Validated stage graph for one named pipeline.

use std::collections::{HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::Serialize;

use super::description::{PipelineDescription, PipelineSpec};
use super::types::RootKind;
use super::PipelineError;

/// Where a node reads its input from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum NodeInput {
    Root(RootKind),
    Node(String),
}

impl NodeInput {
    pub fn name(&self) -> &str {
        match self {
            NodeInput::Root(kind) => kind.as_str(),
            NodeInput::Node(name) => name,
        }
    }
}

/// Immutable topology of a loaded pipeline.
///
/// `levels` groups nodes whose inputs are all produced by earlier levels;
/// nodes of one level can run concurrently.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineGraph {
    pub root: RootKind,
    pub inputs: HashMap<String, Vec<NodeInput>>,
    pub levels: Vec<Vec<String>>,
    pub sink: String,
}

impl PipelineGraph {
    pub fn build(
        description: &PipelineDescription,
        spec: &PipelineSpec,
    ) -> Result<Self, PipelineError> {
        let invalid = |msg: String| PipelineError::Validation(format!("pipeline '{}': {msg}", spec.name));

        let mut component_names = HashSet::new();
        for c in &description.components {
            if !component_names.insert(c.name.as_str()) {
                return Err(invalid(format!("duplicate component name '{}'", c.name)));
            }
        }

        if spec.nodes.is_empty() {
            return Err(invalid("no nodes".into()));
        }

        let mut graph = DiGraph::<String, ()>::new();
        let mut index: HashMap<&str, NodeIndex> = HashMap::new();
        for node in &spec.nodes {
            if RootKind::from_name(&node.name).is_some() {
                return Err(invalid(format!("'{}' is reserved for pipeline roots", node.name)));
            }
            if !component_names.contains(node.name.as_str()) {
                return Err(invalid(format!("node '{}' is not a declared component", node.name)));
            }
            if index.contains_key(node.name.as_str()) {
                return Err(invalid(format!("duplicate node '{}'", node.name)));
            }
            index.insert(&node.name, graph.add_node(node.name.clone()));
        }

        let mut root: Option<RootKind> = None;
        let mut inputs = HashMap::new();
        for node in &spec.nodes {
            if node.inputs.is_empty() {
                return Err(invalid(format!("node '{}' has no inputs", node.name)));
            }
            let mut resolved = Vec::with_capacity(node.inputs.len());
            for input in &node.inputs {
                if let Some(kind) = RootKind::from_name(input) {
                    match root {
                        Some(existing) if existing != kind => {
                            return Err(invalid(format!(
                                "mixes '{}' and '{}' roots",
                                existing.as_str(),
                                kind.as_str()
                            )));
                        }
                        _ => root = Some(kind),
                    }
                    resolved.push(NodeInput::Root(kind));
                    continue;
                }
                let from = index.get(input.as_str()).ok_or_else(|| {
                    invalid(format!("node '{}' has unknown input '{input}'", node.name))
                })?;
                graph.add_edge(*from, index[node.name.as_str()], ());
                resolved.push(NodeInput::Node(input.clone()));
            }
            inputs.insert(node.name.clone(), resolved);
        }

        let root = root.ok_or_else(|| invalid("no node reads from 'Query' or 'File'".into()))?;

        let order = toposort(&graph, None)
            .map_err(|cycle| invalid(format!("cycle through node '{}'", graph[cycle.node_id()])))?;

        let sinks: Vec<&String> = graph
            .node_indices()
            .filter(|&i| graph.neighbors_directed(i, Direction::Outgoing).next().is_none())
            .map(|i| &graph[i])
            .collect();
        let sink = match sinks.as_slice() {
            [only] => (*only).clone(),
            many => {
                let names: Vec<&str> = many.iter().map(|s| s.as_str()).collect();
                return Err(invalid(format!("more than one output node: {}", names.join(", "))));
            }
        };

        // Level of a node is one past the deepest of its predecessors.
        let mut depth: HashMap<NodeIndex, usize> = HashMap::new();
        let mut levels: Vec<Vec<String>> = Vec::new();
        for idx in order {
            let level = graph
                .neighbors_directed(idx, Direction::Incoming)
                .map(|p| depth[&p] + 1)
                .max()
                .unwrap_or(0);
            depth.insert(idx, level);
            if levels.len() <= level {
                levels.resize_with(level + 1, Vec::new);
            }
            levels[level].push(graph[idx].clone());
        }
        for level in &mut levels {
            level.sort_by_key(|name| spec.nodes.iter().position(|n| &n.name == name));
        }

        Ok(Self {
            root,
            inputs,
            levels,
            sink,
        })
    }

    /// Node names in execution order.
    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.levels.iter().flatten().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::DescriptionFormat;

    fn build(nodes: &str) -> Result<PipelineGraph, PipelineError> {
        let yaml = format!(
            r#"
components:
  - {{ name: Store, type: InMemoryDocumentStore }}
  - {{ name: A, type: BM25Retriever, params: {{ document_store: Store }} }}
  - {{ name: B, type: BM25Retriever, params: {{ document_store: Store }} }}
  - {{ name: Join, type: JoinDocuments }}
  - {{ name: Reader, type: ExtractiveReader }}
  - {{ name: Converter, type: TextConverter }}
pipelines:
  - name: p
    nodes:
{nodes}
"#
        );
        let description = PipelineDescription::parse(&yaml, DescriptionFormat::Yaml).unwrap();
        PipelineGraph::build(&description, description.pipeline("p").unwrap())
    }

    fn validation_message(result: Result<PipelineGraph, PipelineError>) -> String {
        match result {
            Err(PipelineError::Validation(msg)) => msg,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn levels_follow_dependencies() {
        let graph = build(
            "      - { name: A, inputs: [Query] }
      - { name: B, inputs: [Query] }
      - { name: Join, inputs: [A, B] }
      - { name: Reader, inputs: [Join] }",
        )
        .unwrap();
        assert_eq!(graph.root, RootKind::Query);
        assert_eq!(graph.sink, "Reader");
        assert_eq!(
            graph.levels,
            vec![vec!["A".to_string(), "B".to_string()], vec!["Join".into()], vec!["Reader".into()]]
        );
        assert_eq!(graph.node_names().collect::<Vec<_>>(), vec!["A", "B", "Join", "Reader"]);
        assert_eq!(
            graph.inputs["Join"],
            vec![NodeInput::Node("A".into()), NodeInput::Node("B".into())]
        );
    }

    #[test]
    fn rejects_unknown_input() {
        let msg = validation_message(build("      - { name: Reader, inputs: [Retriever] }"));
        assert!(msg.contains("unknown input 'Retriever'"));
    }

    #[test]
    fn rejects_undeclared_node() {
        let msg = validation_message(build("      - { name: Ghost, inputs: [Query] }"));
        assert!(msg.contains("Ghost"));
    }

    #[test]
    fn rejects_cycles() {
        let msg = validation_message(build(
            "      - { name: A, inputs: [Query, Join] }
      - { name: Join, inputs: [A] }
      - { name: Reader, inputs: [Join] }",
        ));
        assert!(msg.contains("cycle"));
    }

    #[test]
    fn rejects_mixed_and_missing_roots() {
        let msg = validation_message(build(
            "      - { name: A, inputs: [Query] }
      - { name: Converter, inputs: [File] }
      - { name: Join, inputs: [A, Converter] }",
        ));
        assert!(msg.contains("mixes"));

        let msg = validation_message(build(
            "      - { name: A, inputs: [Join] }
      - { name: Join, inputs: [A] }",
        ));
        assert!(msg.contains("no node reads"));
    }

    #[test]
    fn rejects_duplicate_nodes_and_multiple_sinks() {
        let msg = validation_message(build(
            "      - { name: A, inputs: [Query] }
      - { name: A, inputs: [Query] }",
        ));
        assert!(msg.contains("duplicate node"));

        let msg = validation_message(build(
            "      - { name: A, inputs: [Query] }
      - { name: B, inputs: [Query] }",
        ));
        assert!(msg.contains("more than one output"));
    }
}
