use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::marker::PhantomData;
use std::sync::Arc;

use tokio::io::AsyncRead;
use tracing::debug;

use ferry_core::error::GraphValidationError;

use crate::edge::Edge;
use crate::executor::{erase, ErasedExecutor, Executor};
use crate::input::InputStream;
use crate::payload::Payload;
use crate::run::{self, RunOptions, WorkflowRun};

/// The validated, immutable graph shared by every run of a workflow.
pub(crate) struct WorkflowGraph {
    pub(crate) name: String,
    pub(crate) executors: Vec<Arc<dyn ErasedExecutor>>,
    pub(crate) ids: Vec<Arc<str>>,
    pub(crate) edges: Vec<Edge>,
    /// Target executor index of each edge.
    pub(crate) edge_targets: Vec<usize>,
    /// Outgoing edge indices per executor, in the order edges were added.
    pub(crate) outgoing: Vec<Vec<usize>>,
    pub(crate) is_output: Vec<bool>,
    pub(crate) start: usize,
    pub(crate) options: RunOptions,
    index: HashMap<String, usize>,
}

impl WorkflowGraph {
    fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }
}

/// Fluent builder for a [`Workflow`].
///
/// The start executor is registered by [`new`](Self::new); every other
/// executor must be registered with [`add_executor`](Self::add_executor)
/// before `build()`. Edges refer to executors by id.
pub struct WorkflowBuilder<I> {
    name: Option<String>,
    executors: Vec<Arc<dyn ErasedExecutor>>,
    edges: Vec<Edge>,
    outputs: Vec<String>,
    options: RunOptions,
    _input: PhantomData<fn(I)>,
}

impl<I: Clone + Send + Sync + 'static> WorkflowBuilder<I> {
    /// Start a graph whose entry point is `start`.
    pub fn new<E>(start: E) -> Self
    where
        E: Executor<Input = I>,
    {
        Self {
            name: None,
            executors: vec![erase(start)],
            edges: Vec::new(),
            outputs: Vec::new(),
            options: RunOptions::default(),
            _input: PhantomData,
        }
    }

    /// Set the workflow name (defaults to the start executor id).
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Register an executor.
    pub fn add_executor<E: Executor>(mut self, executor: E) -> Self {
        self.executors.push(erase(executor));
        self
    }

    /// Add a prebuilt edge.
    pub fn add(mut self, edge: Edge) -> Self {
        self.edges.push(edge);
        self
    }

    /// Add an unconditional edge.
    pub fn add_edge(self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.add(Edge::always(from, to))
    }

    /// Add an edge that fires only when `predicate` holds for the source's
    /// output, which must be a `T`.
    pub fn add_edge_if<T, F>(
        self,
        from: impl Into<String>,
        to: impl Into<String>,
        predicate: F,
    ) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.add(Edge::when::<T, F>(from, to, predicate))
    }

    /// Designate an executor whose completion values are the workflow's
    /// results.
    pub fn mark_output(mut self, executor_id: impl Into<String>) -> Self {
        self.outputs.push(executor_id.into());
        self
    }

    /// Default run options for runs started with [`Workflow::run`].
    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Validate and freeze the graph.
    ///
    /// # Errors
    ///
    /// Returns the first [`GraphValidationError`] found, checking in order:
    /// duplicate ids, edges or outputs naming unregistered executors, edge
    /// type mismatches, predicate type mismatches, unreachable executors.
    pub fn build(self) -> Result<Workflow<I>, GraphValidationError> {
        let ids: Vec<Arc<str>> = self.executors.iter().map(|e| Arc::from(e.id())).collect();

        let mut index = HashMap::with_capacity(ids.len());
        for (i, id) in ids.iter().enumerate() {
            if index.insert(id.to_string(), i).is_some() {
                return Err(GraphValidationError::DuplicateExecutor(id.to_string()));
            }
        }

        let mut edge_targets = Vec::with_capacity(self.edges.len());
        let mut outgoing = vec![Vec::new(); ids.len()];
        for (edge_idx, edge) in self.edges.iter().enumerate() {
            let unknown = |missing: &str| GraphValidationError::UnknownEdgeEndpoint {
                from: edge.from.clone(),
                to: edge.to.clone(),
                missing: missing.to_string(),
            };
            let from = *index.get(&edge.from).ok_or_else(|| unknown(&edge.from))?;
            let to = *index.get(&edge.to).ok_or_else(|| unknown(&edge.to))?;
            outgoing[from].push(edge_idx);
            edge_targets.push(to);
        }

        let mut is_output = vec![false; ids.len()];
        for id in &self.outputs {
            let idx = index
                .get(id)
                .ok_or_else(|| GraphValidationError::UnknownOutput(id.clone()))?;
            is_output[*idx] = true;
        }

        for (edge, &to) in self.edges.iter().zip(&edge_targets) {
            let source = &self.executors[index[&edge.from]];
            let produced = source.output_type();
            let accepted = self.executors[to].input_type();
            if produced != accepted {
                return Err(GraphValidationError::TypeMismatch {
                    from: edge.from.clone(),
                    to: edge.to.clone(),
                    produced: produced.name().to_string(),
                    accepted: accepted.name().to_string(),
                });
            }
            if let Some(expected) = edge.predicate_type() {
                if expected != produced {
                    return Err(GraphValidationError::PredicateType {
                        from: edge.from.clone(),
                        to: edge.to.clone(),
                        expected: expected.name().to_string(),
                        produced: produced.name().to_string(),
                    });
                }
            }
        }

        let start = 0;
        let reachable = reachable_from(start, &outgoing, &edge_targets);
        if let Some(orphan) = reachable.iter().position(|r| !r) {
            return Err(GraphValidationError::Unreachable {
                executor: ids[orphan].to_string(),
                start: ids[start].to_string(),
            });
        }

        let name = self.name.unwrap_or_else(|| ids[start].to_string());
        debug!(
            workflow = %name,
            executors = ids.len(),
            edges = self.edges.len(),
            "Workflow graph built"
        );

        Ok(Workflow {
            graph: Arc::new(WorkflowGraph {
                name,
                executors: self.executors,
                ids,
                edges: self.edges,
                edge_targets,
                outgoing,
                is_output,
                start,
                options: self.options,
                index,
            }),
            _input: PhantomData,
        })
    }
}

/// Breadth-first reachability over edge indices.
fn reachable_from(start: usize, outgoing: &[Vec<usize>], edge_targets: &[usize]) -> Vec<bool> {
    let mut seen = vec![false; outgoing.len()];
    let mut queue = VecDeque::from([start]);
    seen[start] = true;
    while let Some(node) = queue.pop_front() {
        for &edge in &outgoing[node] {
            let next = edge_targets[edge];
            if !seen[next] {
                seen[next] = true;
                queue.push_back(next);
            }
        }
    }
    seen
}

/// A built, immutable workflow whose start executor accepts `I`.
///
/// Cloning is cheap; every clone shares the same graph and any number of
/// runs may be in progress at once.
pub struct Workflow<I> {
    graph: Arc<WorkflowGraph>,
    _input: PhantomData<fn(I)>,
}

impl<I> Clone for Workflow<I> {
    fn clone(&self) -> Self {
        Self {
            graph: Arc::clone(&self.graph),
            _input: PhantomData,
        }
    }
}

impl<I: Clone + Send + Sync + 'static> Workflow<I> {
    pub fn name(&self) -> &str {
        &self.graph.name
    }

    pub fn start_executor(&self) -> &str {
        &self.graph.ids[self.graph.start]
    }

    /// Executor ids in registration order.
    pub fn executor_ids(&self) -> impl Iterator<Item = &str> {
        self.graph.ids.iter().map(|id| id.as_ref())
    }

    /// Edges in the order they were added.
    pub fn edges(&self) -> &[Edge] {
        &self.graph.edges
    }

    /// Targets of `executor_id`'s outgoing edges, in edge order.
    pub fn successors(&self, executor_id: &str) -> Vec<&str> {
        match self.graph.position(executor_id) {
            Some(idx) => self.graph.outgoing[idx]
                .iter()
                .map(|&e| self.graph.ids[self.graph.edge_targets[e]].as_ref())
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn is_output(&self, executor_id: &str) -> bool {
        self.graph
            .position(executor_id)
            .is_some_and(|idx| self.graph.is_output[idx])
    }

    pub fn options(&self) -> &RunOptions {
        &self.graph.options
    }

    /// Start a run with the workflow's default options.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn run(&self, input: I) -> WorkflowRun {
        self.run_with_options(input, self.graph.options.clone())
    }

    /// Start a run with explicit options.
    pub fn run_with_options(&self, input: I, options: RunOptions) -> WorkflowRun {
        run::start(Arc::clone(&self.graph), Payload::new(input), options)
    }
}

impl Workflow<InputStream> {
    /// Start a run whose input is read from `reader`.
    pub fn run_reader<R>(&self, name: impl Into<String>, reader: R) -> WorkflowRun
    where
        R: AsyncRead + Send + 'static,
    {
        self.run(InputStream::from_reader(name, reader))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionContext;
    use crate::executor::from_fn;

    fn passthrough(id: &str) -> impl Executor<Input = String, Output = String> {
        from_fn(id, |s: String, _ctx: ExecutionContext<String>| async move { Ok(Some(s)) })
    }

    fn length(id: &str) -> impl Executor<Input = String, Output = usize> {
        from_fn(id, |s: String, _ctx: ExecutionContext<usize>| async move {
            Ok(Some(s.len()))
        })
    }

    #[test]
    fn test_linear_workflow() {
        let wf = WorkflowBuilder::new(passthrough("a"))
            .with_name("chain")
            .add_executor(passthrough("b"))
            .add_executor(passthrough("c"))
            .add_edge("a", "b")
            .add_edge("b", "c")
            .mark_output("c")
            .build()
            .unwrap();

        assert_eq!(wf.name(), "chain");
        assert_eq!(wf.start_executor(), "a");
        assert_eq!(wf.executor_ids().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(wf.successors("a"), vec!["b"]);
        assert!(wf.is_output("c"));
        assert!(!wf.is_output("b"));
        assert_eq!(wf.edges().len(), 2);
    }

    #[test]
    fn test_default_name_is_start() {
        let wf = WorkflowBuilder::new(passthrough("only")).build().unwrap();
        assert_eq!(wf.name(), "only");
        assert!(wf.successors("missing").is_empty());
    }

    #[test]
    fn test_fan_out_successors_in_edge_order() {
        let wf = WorkflowBuilder::new(passthrough("a"))
            .add_executor(passthrough("c"))
            .add_executor(passthrough("b"))
            .add_edge_if::<String, _>("a", "b", |s| s.contains(' '))
            .add_edge_if::<String, _>("a", "c", |s| !s.contains(' '))
            .build()
            .unwrap();
        assert_eq!(wf.successors("a"), vec!["b", "c"]);
    }

    #[test]
    fn test_duplicate_executor() {
        let err = WorkflowBuilder::new(passthrough("a"))
            .add_executor(passthrough("a"))
            .build()
            .err()
            .unwrap();
        assert_eq!(err, GraphValidationError::DuplicateExecutor("a".into()));
    }

    #[test]
    fn test_unknown_edge_endpoint() {
        let err = WorkflowBuilder::new(passthrough("a"))
            .add_edge("a", "ghost")
            .build()
            .err()
            .unwrap();
        assert_eq!(
            err,
            GraphValidationError::UnknownEdgeEndpoint {
                from: "a".into(),
                to: "ghost".into(),
                missing: "ghost".into(),
            }
        );
    }

    #[test]
    fn test_unknown_output() {
        let err = WorkflowBuilder::new(passthrough("a"))
            .mark_output("nope")
            .build()
            .err()
            .unwrap();
        assert_eq!(err, GraphValidationError::UnknownOutput("nope".into()));
    }

    #[test]
    fn test_type_mismatch() {
        // usize output feeding a String input
        let err = WorkflowBuilder::new(length("len"))
            .add_executor(passthrough("echo"))
            .add_edge("len", "echo")
            .build()
            .err()
            .unwrap();
        match err {
            GraphValidationError::TypeMismatch {
                from,
                to,
                produced,
                accepted,
            } => {
                assert_eq!(from, "len");
                assert_eq!(to, "echo");
                assert!(produced.contains("usize"));
                assert!(accepted.contains("String"));
            }
            other => panic!("expected TypeMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_predicate_type_mismatch() {
        let err = WorkflowBuilder::new(passthrough("a"))
            .add_executor(passthrough("b"))
            .add_edge_if::<u32, _>("a", "b", |n| *n > 0)
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, GraphValidationError::PredicateType { .. }));
    }

    #[test]
    fn test_unreachable_executor() {
        let err = WorkflowBuilder::new(passthrough("a"))
            .add_executor(passthrough("b"))
            .add_executor(passthrough("island"))
            .add_edge("a", "b")
            .build()
            .err()
            .unwrap();
        assert_eq!(
            err,
            GraphValidationError::Unreachable {
                executor: "island".into(),
                start: "a".into(),
            }
        );
    }

    #[test]
    fn test_cycles_are_allowed() {
        let wf = WorkflowBuilder::new(passthrough("a"))
            .add_executor(passthrough("b"))
            .add_edge("a", "b")
            .add_edge_if::<String, _>("b", "a", |s| s.len() < 3)
            .build();
        assert!(wf.is_ok());
    }

    #[test]
    fn test_reachable_through_target_only() {
        // b is only a target of c, which is only a target of a.
        let seen = reachable_from(0, &[vec![0], vec![], vec![1]], &[2, 1]);
        assert_eq!(seen, vec![true, true, true]);
    }
}
