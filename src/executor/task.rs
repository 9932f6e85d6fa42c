//! Executor task model
//!
//! A [`Task`] is one unit of work for the worker thread. Each variant owns
//! exactly the payload its kind needs. Tasks travel wrapped in a
//! [`QueuedTask`] that carries the submission flags and the completion cell a
//! synchronous caller waits on.

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use serde::Serialize;

use crate::session::{AnfNodeRef, FuncGraph, GraphId, GraphSegment, SessionRef, TensorToNode};
use crate::tensor::TensorRef;

/// Per-executor task identifier, assigned at submission
pub type TaskId = u64;

// ─────────────────────────────────────────────────────────────────
// Task Kinds
// ─────────────────────────────────────────────────────────────────

/// Discriminant of [`Task`], used for logging and bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TaskKind {
    CompileNodes,
    CompileGraph,
    BuildGraph,
    RunGraph,
    CreateCommGroup,
    DestroyCommGroup,
    Exit,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskKind::CompileNodes => "CompileNodes",
            TaskKind::CompileGraph => "CompileGraph",
            TaskKind::BuildGraph => "BuildGraph",
            TaskKind::RunGraph => "RunGraph",
            TaskKind::CreateCommGroup => "CreateCommGroup",
            TaskKind::DestroyCommGroup => "DestroyCommGroup",
            TaskKind::Exit => "Exit",
        };
        f.write_str(name)
    }
}

// ─────────────────────────────────────────────────────────────────
// RunGraph Payload
// ─────────────────────────────────────────────────────────────────

/// A graph execution request
///
/// The three classified input lists decide when the run may start and what it
/// must release when it finishes.
pub struct RunGraphTask {
    pub session: SessionRef,
    pub graph_id: GraphId,

    /// Inputs in the order the graph consumes them
    pub input_tensors: Vec<TensorRef>,

    /// Inputs that were consumable at submission
    pub input_ready_tensors: Vec<TensorRef>,

    /// Outputs of in-flight runs; the task stays pending until all are released
    pub input_need_wait_tensors: Vec<TensorRef>,

    /// Inputs held exclusively by this run and released when it finishes
    pub input_need_lock_tensors: Vec<TensorRef>,

    /// Output slots, written in place by the session
    pub outputs: Vec<TensorRef>,

    pub tensor_to_node: TensorToNode,
}

impl RunGraphTask {
    pub fn new(session: SessionRef, graph_id: GraphId, input_tensors: Vec<TensorRef>) -> Self {
        Self {
            session,
            graph_id,
            input_tensors,
            input_ready_tensors: Vec::new(),
            input_need_wait_tensors: Vec::new(),
            input_need_lock_tensors: Vec::new(),
            outputs: Vec::new(),
            tensor_to_node: TensorToNode::new(),
        }
    }

    /// True once no need-wait input is still owned by another run
    pub fn is_ready(&self) -> bool {
        self.input_need_wait_tensors.iter().all(|tensor| !tensor.need_wait())
    }

    /// Claim the locked inputs and the outputs for this run
    pub fn lock_tensors(&self) {
        for tensor in &self.input_need_lock_tensors {
            tensor.set_need_wait(true);
        }
        for tensor in &self.outputs {
            tensor.set_graph_output(true);
            tensor.set_need_wait(true);
        }
    }

    /// Release everything [`lock_tensors`](Self::lock_tensors) claimed, waking their waiters
    pub fn release_tensors(&self) {
        for tensor in &self.input_need_lock_tensors {
            tensor.set_need_wait(false);
        }
        for tensor in &self.outputs {
            tensor.set_need_wait(false);
        }
    }
}

impl fmt::Debug for RunGraphTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunGraphTask")
            .field("session", &self.session.name())
            .field("graph_id", &self.graph_id)
            .field("inputs", &self.input_tensors.len())
            .field("need_wait", &self.input_need_wait_tensors.len())
            .field("need_lock", &self.input_need_lock_tensors.len())
            .field("outputs", &self.outputs.len())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────
// Task
// ─────────────────────────────────────────────────────────────────

/// Work item executed on the worker thread
pub enum Task {
    CompileNodes {
        session: SessionRef,
        segment: GraphSegment,
        outputs: Vec<AnfNodeRef>,
    },
    CompileGraph {
        session: SessionRef,
        func_graph: FuncGraph,
    },
    BuildGraph {
        session: SessionRef,
        graph_id: GraphId,
    },
    RunGraph(RunGraphTask),
    CreateCommGroup {
        group_name: String,
        ranks: Vec<u32>,
    },
    DestroyCommGroup {
        group_name: String,
    },
    Exit,
}

impl Task {
    pub fn kind(&self) -> TaskKind {
        match self {
            Task::CompileNodes { .. } => TaskKind::CompileNodes,
            Task::CompileGraph { .. } => TaskKind::CompileGraph,
            Task::BuildGraph { .. } => TaskKind::BuildGraph,
            Task::RunGraph(_) => TaskKind::RunGraph,
            Task::CreateCommGroup { .. } => TaskKind::CreateCommGroup,
            Task::DestroyCommGroup { .. } => TaskKind::DestroyCommGroup,
            Task::Exit => TaskKind::Exit,
        }
    }

    pub fn as_run_graph(&self) -> Option<&RunGraphTask> {
        match self {
            Task::RunGraph(run) => Some(run),
            _ => None,
        }
    }

    /// Graph the task operates on, if any
    pub fn graph_id(&self) -> Option<GraphId> {
        match self {
            Task::BuildGraph { graph_id, .. } => Some(*graph_id),
            Task::RunGraph(run) => Some(run.graph_id),
            _ => None,
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::RunGraph(run) => fmt::Debug::fmt(run, f),
            Task::CreateCommGroup { group_name, ranks } => f
                .debug_struct("CreateCommGroup")
                .field("group_name", group_name)
                .field("ranks", ranks)
                .finish(),
            Task::DestroyCommGroup { group_name } => f
                .debug_struct("DestroyCommGroup")
                .field("group_name", group_name)
                .finish(),
            other => write!(f, "{}", other.kind()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Outcome & Completion
// ─────────────────────────────────────────────────────────────────

/// Result of a finished task as recorded in the done list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TaskOutcome {
    /// Compile produced a graph
    GraphId(GraphId),
    /// Comm-group operation result
    Bool(bool),
    Done,
    Failed(String),
    /// Dropped without running (exception event or shutdown)
    Skipped,
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, TaskOutcome::Failed(_) | TaskOutcome::Skipped)
    }
}

/// Write-once cell the worker fills when a task finishes
#[derive(Debug, Default)]
pub struct TaskCompletion {
    outcome: OnceLock<TaskOutcome>,
}

impl TaskCompletion {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Record the outcome; later calls are ignored
    pub fn set(&self, outcome: TaskOutcome) {
        let _ = self.outcome.set(outcome);
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.get().is_some()
    }

    pub fn outcome(&self) -> Option<TaskOutcome> {
        self.outcome.get().cloned()
    }
}

/// A task plus its submission metadata
#[derive(Debug)]
pub struct QueuedTask {
    pub id: TaskId,

    /// A caller is blocked on `completion`
    pub sync_run: bool,

    /// The caller expects a long wait and reports progress while blocked
    pub long_run: bool,

    pub task: Task,
    pub completion: Arc<TaskCompletion>,
    pub submitted_at: Instant,
}

impl QueuedTask {
    pub fn new(id: TaskId, task: Task) -> Self {
        Self {
            id,
            sync_run: false,
            long_run: false,
            task,
            completion: TaskCompletion::new(),
            submitted_at: Instant::now(),
        }
    }

    pub fn sync_run(mut self, long_run: bool) -> Self {
        self.sync_run = true;
        self.long_run = long_run;
        self
    }

    pub fn kind(&self) -> TaskKind {
        self.task.kind()
    }

    /// An asynchronous RunGraph, i.e. one nobody is waiting on
    pub fn is_async_run_graph(&self) -> bool {
        !self.sync_run && matches!(self.task, Task::RunGraph(_))
    }
}
