//! Session contract consumed by the executor
//!
//! A session owns compiled kernel graphs for one device. The executor never
//! calls into a session from two threads at once; implementations may assume
//! that every method except [`Session::create_output_tensors`] and
//! [`Session::input_need_lock_tensors`] runs on the executor's worker thread.

mod graph;
mod mock;

pub use graph::*;
pub use mock::*;

use std::sync::Arc;

use crate::error::Result;
use crate::tensor::TensorRef;

/// Graph identifier handed out by a session
pub type GraphId = u32;

// ─────────────────────────────────────────────────────────────────
// Session Trait
// ─────────────────────────────────────────────────────────────────

/// Compile/build/run surface of a backend session
///
/// Methods are blocking and report failures through `Result`. They are not
/// required to be safe under concurrent calls; the executor serializes them.
pub trait Session: Send + Sync {
    /// Name used in log output
    fn name(&self) -> &str;

    /// Compile a partitioned graph segment
    fn compile_nodes(&self, segment: &GraphSegment, outputs: &[AnfNodeRef]) -> Result<GraphId>;

    /// Compile a whole function graph
    fn compile_graph(&self, func_graph: &FuncGraph) -> Result<GraphId>;

    /// Allocate and link kernels for a compiled graph
    fn build_graph(&self, graph_id: GraphId) -> Result<()>;

    /// Create the output placeholders of a run, recording their producers
    ///
    /// Called on the submitting thread before the run is queued.
    fn create_output_tensors(
        &self,
        graph_id: GraphId,
        inputs: &[TensorRef],
        tensor_to_node: &mut TensorToNode,
    ) -> Result<Vec<TensorRef>>;

    /// Inputs the run must hold exclusively (e.g. parameters an optimizer updates)
    fn input_need_lock_tensors(&self, _graph_id: GraphId, _inputs: &[TensorRef]) -> Vec<TensorRef> {
        Vec::new()
    }

    /// Stage inputs on the device
    fn load_inputs(&self, _graph_id: GraphId, _inputs: &[TensorRef]) -> Result<()> {
        Ok(())
    }

    /// Execute a built graph, writing results into `outputs` in place
    fn run_graph_impl(&self, graph_id: GraphId, inputs: &[TensorRef], outputs: &[TensorRef]) -> Result<()>;

    /// Bind device results back onto output tensors after a run
    fn update_output_tensors(&self, _outputs: &[TensorRef], _tensor_to_node: &TensorToNode) {}

    fn report_warning_message(&self) {}

    fn report_error_message(&self) {}
}

/// Shared session handle; the caller and the executor both hold one
pub type SessionRef = Arc<dyn Session>;
