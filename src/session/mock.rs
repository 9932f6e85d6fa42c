//! Mock session for testing and workload simulation
//!
//! Deterministic in-process implementation of [`Session`]. Every run writes
//! `sum(inputs) + graph_id` into each output element, so results can be
//! checked without real kernels.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::trace;

use crate::error::{Error, Result};
use crate::tensor::{Tensor, TensorRef};

use super::{
    AnfNodeRef, FuncGraph, GraphId, GraphSegment, KernelWithIndex, Session, TensorToNode,
};

// ─────────────────────────────────────────────────────────────────
// Mock Session Configuration
// ─────────────────────────────────────────────────────────────────

/// Configuration for mock session behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Simulated device time per graph run
    pub run_latency: Duration,

    /// Simulated compile time
    pub compile_latency: Duration,

    /// Output tensors created per run
    pub outputs_per_graph: usize,

    /// Report non graph-output inputs as tensors the run must lock
    pub lock_inputs: bool,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            run_latency: Duration::ZERO,
            compile_latency: Duration::ZERO,
            outputs_per_graph: 1,
            lock_inputs: false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Concurrency Probe
// ─────────────────────────────────────────────────────────────────

/// Counts how many session calls are in flight at once
///
/// Share one probe between several sessions to check that an executor never
/// overlaps their calls.
#[derive(Debug, Default)]
pub struct ConcurrencyProbe {
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl ConcurrencyProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn enter(&self) -> ProbeGuard<'_> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        ProbeGuard(self)
    }

    /// Highest number of simultaneous calls observed
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

struct ProbeGuard<'a>(&'a ConcurrencyProbe);

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

// ─────────────────────────────────────────────────────────────────
// Mock Session
// ─────────────────────────────────────────────────────────────────

/// A session call as recorded by [`MockSession`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCall {
    CompileNodes(GraphId),
    CompileGraph(GraphId),
    BuildGraph(GraphId),
    RunGraph(GraphId),
}

/// Callback invoked on the worker thread at the start of every run
pub type RunHook = Arc<dyn Fn(GraphId) + Send + Sync>;

#[derive(Debug)]
struct MockGraph {
    name: String,
    built: bool,
}

/// Mock implementation of [`Session`]
pub struct MockSession {
    name: String,
    config: MockConfig,
    probe: Arc<ConcurrencyProbe>,
    graphs: Mutex<HashMap<GraphId, MockGraph>>,
    next_graph_id: AtomicU32,
    calls: Mutex<Vec<SessionCall>>,
    failing: Mutex<HashSet<GraphId>>,
    panicking: Mutex<HashSet<GraphId>>,
    run_hook: Mutex<Option<RunHook>>,
}

impl MockSession {
    /// Create a mock session with default configuration
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, MockConfig::default(), ConcurrencyProbe::new())
    }

    /// Create a mock session with custom configuration and a (possibly shared) probe
    pub fn with_config(name: impl Into<String>, config: MockConfig, probe: Arc<ConcurrencyProbe>) -> Self {
        Self {
            name: name.into(),
            config,
            probe,
            graphs: Mutex::new(HashMap::new()),
            next_graph_id: AtomicU32::new(1),
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            panicking: Mutex::new(HashSet::new()),
            run_hook: Mutex::new(None),
        }
    }

    /// Make every later run of `graph_id` return an error
    pub fn fail_graph(&self, graph_id: GraphId) {
        self.failing.lock().insert(graph_id);
    }

    /// Make every later run of `graph_id` panic
    pub fn panic_graph(&self, graph_id: GraphId) {
        self.panicking.lock().insert(graph_id);
    }

    pub fn set_run_hook(&self, hook: RunHook) {
        *self.run_hook.lock() = Some(hook);
    }

    /// All calls recorded so far, in execution order
    pub fn calls(&self) -> Vec<SessionCall> {
        self.calls.lock().clone()
    }

    /// Graph ids in the order their runs executed
    pub fn run_order(&self) -> Vec<GraphId> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                SessionCall::RunGraph(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    pub fn probe(&self) -> &Arc<ConcurrencyProbe> {
        &self.probe
    }

    pub fn graph_name(&self, graph_id: GraphId) -> Option<String> {
        self.graphs.lock().get(&graph_id).map(|g| g.name.clone())
    }

    fn register_graph(&self, name: String, latency: Duration) -> GraphId {
        if !latency.is_zero() {
            thread::sleep(latency);
        }
        let graph_id = self.next_graph_id.fetch_add(1, Ordering::SeqCst);
        self.graphs.lock().insert(graph_id, MockGraph { name, built: false });
        graph_id
    }

    fn record(&self, call: SessionCall) {
        trace!(session = %self.name, ?call, "Mock session call");
        self.calls.lock().push(call);
    }
}

impl Session for MockSession {
    fn name(&self) -> &str {
        &self.name
    }

    fn compile_nodes(&self, segment: &GraphSegment, outputs: &[AnfNodeRef]) -> Result<GraphId> {
        let _guard = self.probe.enter();
        if segment.nodes.is_empty() {
            return Err(Error::execution_failed("CompileNodes", "segment has no nodes"));
        }
        let name = outputs
            .first()
            .or_else(|| segment.nodes.last())
            .map(|node| format!("segment_{}", node.name))
            .unwrap_or_default();
        let graph_id = self.register_graph(name, self.config.compile_latency);
        self.record(SessionCall::CompileNodes(graph_id));
        Ok(graph_id)
    }

    fn compile_graph(&self, func_graph: &FuncGraph) -> Result<GraphId> {
        let _guard = self.probe.enter();
        if func_graph.nodes.is_empty() {
            return Err(Error::execution_failed(
                "CompileGraph",
                format!("graph '{}' has no nodes", func_graph.name),
            ));
        }
        let graph_id = self.register_graph(func_graph.name.clone(), self.config.compile_latency);
        self.record(SessionCall::CompileGraph(graph_id));
        Ok(graph_id)
    }

    fn build_graph(&self, graph_id: GraphId) -> Result<()> {
        let _guard = self.probe.enter();
        self.graphs
            .lock()
            .get_mut(&graph_id)
            .ok_or(Error::GraphNotFound { graph_id })?
            .built = true;
        self.record(SessionCall::BuildGraph(graph_id));
        Ok(())
    }

    fn create_output_tensors(
        &self,
        graph_id: GraphId,
        _inputs: &[TensorRef],
        tensor_to_node: &mut TensorToNode,
    ) -> Result<Vec<TensorRef>> {
        if !self.graphs.lock().contains_key(&graph_id) {
            return Err(Error::GraphNotFound { graph_id });
        }
        let outputs: Vec<TensorRef> = (0..self.config.outputs_per_graph)
            .map(|_| Tensor::placeholder(vec![1]))
            .collect();
        for (output_index, tensor) in outputs.iter().enumerate() {
            tensor.set_graph_output(true);
            tensor_to_node.insert(
                tensor.id(),
                KernelWithIndex {
                    node: format!("graph_{}_output", graph_id),
                    output_index,
                },
            );
        }
        Ok(outputs)
    }

    fn input_need_lock_tensors(&self, _graph_id: GraphId, inputs: &[TensorRef]) -> Vec<TensorRef> {
        if !self.config.lock_inputs {
            return Vec::new();
        }
        inputs
            .iter()
            .filter(|tensor| !tensor.is_graph_output())
            .cloned()
            .collect()
    }

    fn run_graph_impl(&self, graph_id: GraphId, inputs: &[TensorRef], outputs: &[TensorRef]) -> Result<()> {
        // The hook may re-enter the executor, so it runs outside the probe
        let hook = self.run_hook.lock().clone();
        if let Some(hook) = hook {
            hook(graph_id);
        }

        let _guard = self.probe.enter();
        self.record(SessionCall::RunGraph(graph_id));
        if !self.config.run_latency.is_zero() {
            thread::sleep(self.config.run_latency);
        }

        match self.graphs.lock().get(&graph_id) {
            None => return Err(Error::GraphNotFound { graph_id }),
            Some(graph) if !graph.built => {
                return Err(Error::execution_failed(
                    "RunGraph",
                    format!("graph {} was not built", graph_id),
                ))
            }
            Some(_) => {}
        }
        if self.panicking.lock().contains(&graph_id) {
            panic!("mock kernel crashed in graph {}", graph_id);
        }
        if self.failing.lock().contains(&graph_id) {
            return Err(Error::execution_failed(
                "RunGraph",
                format!("injected failure in graph {}", graph_id),
            ));
        }

        let input_sum: f32 = inputs.iter().flat_map(|t| t.data()).sum();
        let value = input_sum + graph_id as f32;
        for output in outputs {
            let len = output.shape().iter().product();
            output.set_data(vec![value; len]);
        }
        Ok(())
    }
}
