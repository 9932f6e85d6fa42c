//! Executor façade
//!
//! Every session operation is turned into a [`Task`] and handed to the
//! worker thread. Synchronous operations block the caller until their task
//! completes; [`Executor::run_graph_async`] returns as soon as the run is
//! queued and gates it on the readiness of its inputs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use crate::comm::{CommManager, LocalCommManager};
use crate::config::ExecutorSettings;
use crate::error::{Error, Result};
use crate::session::{AnfNodeRef, FuncGraph, GraphId, GraphSegment, SessionRef};
use crate::tensor::TensorRef;

use super::state::{DoneTaskInfo, ExecutorStats, WorkerState};
use super::task::{QueuedTask, RunGraphTask, Task, TaskCompletion, TaskId, TaskKind, TaskOutcome};
use super::worker::{worker_loop, Shared};

// ─────────────────────────────────────────────────────────────────
// Executor Configuration
// ─────────────────────────────────────────────────────────────────

/// Configuration for an executor
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Async RunGraph tasks allowed in flight before submitters block (0 = unbounded)
    pub max_inflight_async_runs: usize,

    /// How often an idle worker rescans the pending list
    pub pending_scan_interval: Duration,

    /// How often a blocked long-running caller reports progress
    pub long_run_report_interval: Duration,

    /// Done-list entries kept for inspection (0 = unbounded)
    pub done_tasks_retained: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_inflight_async_runs: 64,
            pending_scan_interval: Duration::from_millis(20),
            long_run_report_interval: Duration::from_secs(60),
            done_tasks_retained: 4096,
        }
    }
}

impl From<&ExecutorSettings> for ExecutorConfig {
    fn from(settings: &ExecutorSettings) -> Self {
        Self {
            max_inflight_async_runs: settings.max_inflight_async_runs,
            pending_scan_interval: Duration::from_millis(settings.pending_scan_interval_ms),
            long_run_report_interval: Duration::from_millis(settings.long_run_report_interval_ms),
            done_tasks_retained: settings.done_tasks_retained,
        }
    }
}

/// Notification delivered to an executor from outside
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorEvent {
    /// Discard the done list
    Clear,
    /// A graph run finished elsewhere; rescan pending runs
    RunGraphFinished,
    /// The device runtime failed asynchronously
    Exception,
}

// ─────────────────────────────────────────────────────────────────
// Executor
// ─────────────────────────────────────────────────────────────────

/// Serializes session work for one device on a dedicated worker thread
pub struct Executor {
    device_name: String,
    device_id: u32,
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_thread: ThreadId,
    next_task_id: AtomicU64,
}

impl Executor {
    /// Create an executor with default configuration and a local comm manager
    pub fn new(device_name: impl Into<String>, device_id: u32) -> Result<Self> {
        Self::with_config(
            device_name,
            device_id,
            ExecutorConfig::default(),
            Arc::new(LocalCommManager::new()),
        )
    }

    /// Create an executor and start its worker thread
    pub fn with_config(
        device_name: impl Into<String>,
        device_id: u32,
        config: ExecutorConfig,
        comm: Arc<dyn CommManager>,
    ) -> Result<Self> {
        let device_name = device_name.into();
        if device_name.is_empty() {
            return Err(Error::config_field_invalid("device_name", "device name cannot be empty"));
        }
        if config.pending_scan_interval.is_zero() {
            return Err(Error::config_field_invalid(
                "pending_scan_interval_ms",
                "pending scan interval must be positive",
            ));
        }
        if config.long_run_report_interval.is_zero() {
            return Err(Error::config_field_invalid(
                "long_run_report_interval_ms",
                "long-run report interval must be positive",
            ));
        }

        let device = format!("{}-{}", device_name, device_id);
        let shared = Arc::new(Shared::new(device.clone(), config, comm));
        let handle = {
            let shared = shared.clone();
            thread::Builder::new()
                .name(format!("{}-executor", device))
                .spawn(move || worker_loop(shared))
                .map_err(|e| Error::Internal(format!("Failed to spawn executor worker: {}", e)))?
        };
        let worker_thread = handle.thread().id();

        info!(device = %device, "Executor created");

        Ok(Self {
            device_name,
            device_id,
            shared,
            worker: Mutex::new(Some(handle)),
            worker_thread,
            next_task_id: AtomicU64::new(1),
        })
    }

    // ─────────────────────────────────────────────────────────────
    // Session Operations
    // ─────────────────────────────────────────────────────────────

    /// Compile a partitioned graph segment
    pub fn compile_nodes(
        &self,
        session: &SessionRef,
        segment: &GraphSegment,
        outputs: &[AnfNodeRef],
    ) -> Result<GraphId> {
        let task = Task::CompileNodes {
            session: session.clone(),
            segment: segment.clone(),
            outputs: outputs.to_vec(),
        };
        expect_graph_id(TaskKind::CompileNodes, self.run_sync(task, false)?)
    }

    /// Compile a whole function graph
    pub fn compile_graph(&self, session: &SessionRef, func_graph: &FuncGraph) -> Result<GraphId> {
        let task = Task::CompileGraph {
            session: session.clone(),
            func_graph: func_graph.clone(),
        };
        expect_graph_id(TaskKind::CompileGraph, self.run_sync(task, false)?)
    }

    pub fn build_graph(&self, session: &SessionRef, graph_id: GraphId) -> Result<()> {
        let task = Task::BuildGraph {
            session: session.clone(),
            graph_id,
        };
        self.run_sync(task, false).map(|_| ())
    }

    /// Run a graph and wait for it
    ///
    /// Output tensors are appended to `outputs` and hold the results on return.
    /// Inputs still owned by another run are waited on first. On the worker
    /// thread the run executes inline and such an input cannot be released
    /// while it runs, so the call fails instead.
    pub fn run_graph(
        &self,
        session: &SessionRef,
        graph_id: GraphId,
        inputs: &[TensorRef],
        outputs: &mut Vec<TensorRef>,
    ) -> Result<()> {
        self.ensure_running()?;
        if self.is_worker_thread() {
            if let Some(tensor) = inputs.iter().find(|t| t.need_wait()) {
                return Err(Error::execution_failed(
                    TaskKind::RunGraph,
                    format!(
                        "input tensor {} is still owned by an unfinished run and cannot be waited on from the worker thread",
                        tensor.id()
                    ),
                ));
            }
        } else {
            self.wait_for_inputs(inputs)?;
        }

        let mut run = RunGraphTask::new(session.clone(), graph_id, inputs.to_vec());
        run.outputs = session.create_output_tensors(graph_id, inputs, &mut run.tensor_to_node)?;
        outputs.extend(run.outputs.iter().cloned());
        run.input_ready_tensors = inputs.to_vec();
        self.run_sync(Task::RunGraph(run), true).map(|_| ())
    }

    /// Queue a graph run and return without waiting for it
    ///
    /// Output tensors are appended to `outputs` immediately and report
    /// `need_wait() == true` until the run finishes. Inputs produced by runs
    /// still in flight are waited on by the worker, not the caller.
    ///
    /// A graph without outputs runs synchronously once its inputs are
    /// released. Submitted from the worker thread with an unreleased input,
    /// it is queued like any other asynchronous run instead.
    pub fn run_graph_async(
        &self,
        session: &SessionRef,
        graph_id: GraphId,
        inputs: &[TensorRef],
        outputs: &mut Vec<TensorRef>,
    ) -> Result<()> {
        self.ensure_running()?;
        let mut run = RunGraphTask::new(session.clone(), graph_id, inputs.to_vec());
        run.outputs = session.create_output_tensors(graph_id, inputs, &mut run.tensor_to_node)?;
        outputs.extend(run.outputs.iter().cloned());

        let on_worker = self.is_worker_thread();
        if run.outputs.is_empty() {
            if !on_worker {
                self.wait_for_inputs(inputs)?;
            }
            if !inputs.iter().any(|t| t.need_wait()) {
                debug!(device = %self.shared.device, graph_id, "Graph has no outputs, running synchronously");
                run.input_ready_tensors = inputs.to_vec();
                return self.run_sync(Task::RunGraph(run), true).map(|_| ());
            }
            debug!(device = %self.shared.device, graph_id, "Graph has no outputs but its inputs are unreleased, queueing");
        }

        let limit = if on_worker {
            0
        } else {
            self.shared.config.max_inflight_async_runs
        };
        self.shared.reenter.acquire(limit);

        if let Err(err) = self.classify_inputs(&mut run, on_worker) {
            self.shared.reenter.release();
            return Err(err);
        }
        run.lock_tensors();

        let claimed: Vec<TensorRef> = run
            .input_need_lock_tensors
            .iter()
            .chain(&run.outputs)
            .cloned()
            .collect();
        let queued = QueuedTask::new(self.next_id(), Task::RunGraph(run));
        let task_id = queued.id;

        match self.shared.queue.enqueue_pending_or_ready(queued) {
            Ok(pending) => {
                debug!(device = %self.shared.device, task_id, graph_id, pending, "RunGraph queued");
                Ok(())
            }
            Err(_) => {
                for tensor in &claimed {
                    tensor.set_need_wait(false);
                }
                self.shared.reenter.release();
                Err(self.terminated())
            }
        }
    }

    /// Sort inputs into ready, need-wait and need-lock lists
    ///
    /// A locked input that is not a graph output (e.g. a parameter another
    /// run is updating) is waited on here, on the caller thread.
    fn classify_inputs(&self, run: &mut RunGraphTask, on_worker: bool) -> Result<()> {
        for tensor in &run.input_tensors {
            if tensor.need_wait() {
                if tensor.is_graph_output() || on_worker {
                    run.input_need_wait_tensors.push(tensor.clone());
                    continue;
                }
                self.wait_for_tensor(tensor)?;
            }
            run.input_ready_tensors.push(tensor.clone());
        }
        run.input_need_lock_tensors = run
            .session
            .input_need_lock_tensors(run.graph_id, &run.input_tensors);
        Ok(())
    }

    /// Block until every input is released
    fn wait_for_inputs(&self, inputs: &[TensorRef]) -> Result<()> {
        for tensor in inputs {
            if tensor.need_wait() {
                self.wait_for_tensor(tensor)?;
            }
        }
        Ok(())
    }

    /// Block until `tensor` is released, surfacing worker exceptions meanwhile
    fn wait_for_tensor(&self, tensor: &TensorRef) -> Result<()> {
        let slice = self.shared.config.pending_scan_interval;
        loop {
            self.shared.exception.check()?;
            if tensor.wait_timeout(slice) {
                return Ok(());
            }
            if self.shared.worker_state() == WorkerState::Terminated {
                return Err(self.terminated());
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Communication Groups
    // ─────────────────────────────────────────────────────────────

    pub fn create_comm_group(&self, group_name: &str, ranks: &[u32]) -> Result<bool> {
        let task = Task::CreateCommGroup {
            group_name: group_name.to_string(),
            ranks: ranks.to_vec(),
        };
        expect_bool(TaskKind::CreateCommGroup, self.run_sync(task, false)?)
    }

    pub fn destroy_comm_group(&self, group_name: &str) -> Result<bool> {
        let task = Task::DestroyCommGroup {
            group_name: group_name.to_string(),
        };
        expect_bool(TaskKind::DestroyCommGroup, self.run_sync(task, false)?)
    }

    // ─────────────────────────────────────────────────────────────
    // Events & Lifecycle
    // ─────────────────────────────────────────────────────────────

    pub fn on_event(&self, event: ExecutorEvent) {
        debug!(device = %self.shared.device, ?event, "Executor event");
        match event {
            ExecutorEvent::Clear => self.clear_done_tasks(),
            ExecutorEvent::RunGraphFinished => {
                self.shared.queue.promote_pending_to_ready();
                self.shared.reenter.notify();
            }
            ExecutorEvent::Exception => self.shared.raise_exception(Error::DeviceException {
                message: format!("exception reported for {}", self.shared.device),
            }),
        }
    }

    /// Discard the done list, dropping the tensors its RunGraph tasks kept alive
    pub fn clear_done_tasks(&self) {
        let removed = self.shared.done.lock().clear();
        if removed > 0 {
            debug!(device = %self.shared.device, removed, "Cleared done tasks");
        }
    }

    /// Stop the worker after it drains the backlog, then join it
    ///
    /// Idempotent. From the worker thread itself the worker is told to exit
    /// but not joined.
    pub fn worker_join(&self) {
        let exit = QueuedTask::new(self.next_id(), Task::Exit);
        if self.is_worker_thread() {
            warn!(device = %self.shared.device, "worker_join called on the worker thread, not joining");
            let _ = self.shared.queue.enqueue_exit(exit);
            return;
        }

        let Some(handle) = self.worker.lock().take() else {
            return;
        };
        let _ = self.shared.queue.enqueue_exit(exit);
        if handle.join().is_err() {
            error!(device = %self.shared.device, "Executor worker panicked");
        }
        info!(device = %self.shared.device, "Executor worker joined");
    }

    // ─────────────────────────────────────────────────────────────
    // Introspection
    // ─────────────────────────────────────────────────────────────

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn device_id(&self) -> u32 {
        self.device_id
    }

    pub fn is_worker_thread(&self) -> bool {
        thread::current().id() == self.worker_thread
    }

    pub fn worker_state(&self) -> WorkerState {
        self.shared.worker_state()
    }

    /// Ids of RunGraph tasks still waiting on their inputs
    pub fn pending_task_ids(&self) -> Vec<TaskId> {
        self.shared.queue.pending_ids()
    }

    /// Snapshot of the done list, oldest first
    pub fn done_tasks(&self) -> Vec<DoneTaskInfo> {
        self.shared.done.lock().snapshot()
    }

    pub fn stats(&self) -> ExecutorStats {
        let (worker_state, current, executed) = {
            let status = self.shared.status.lock();
            (status.state, status.current, status.executed)
        };
        let (done_tasks, completed, failed, skipped) = {
            let done = self.shared.done.lock();
            (done.len(), done.total_completed(), done.total_failed(), done.total_skipped())
        };

        ExecutorStats {
            device_name: self.device_name.clone(),
            device_id: self.device_id,
            worker_state,
            current_task: current.map(|task| task.kind),
            current_task_elapsed_ms: current.map(|task| task.started_at.elapsed().as_millis() as u64),
            ready_tasks: self.shared.queue.ready_len(),
            pending_tasks: self.shared.queue.pending_len(),
            done_tasks,
            inflight_async_runs: self.shared.reenter.inflight(),
            executed,
            completed,
            failed,
            skipped,
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────

    fn next_id(&self) -> TaskId {
        self.next_task_id.fetch_add(1, Ordering::Relaxed)
    }

    fn terminated(&self) -> Error {
        Error::ExecutorTerminated {
            device: self.shared.device.clone(),
        }
    }

    fn ensure_running(&self) -> Result<()> {
        if self.shared.queue.is_closed() && !self.is_worker_thread() {
            return Err(self.terminated());
        }
        Ok(())
    }

    /// Submit `task` and block until it finishes
    ///
    /// On the worker thread the task runs inline. Otherwise a stored worker
    /// exception takes precedence over the task's own outcome.
    fn run_sync(&self, task: Task, long_run: bool) -> Result<TaskOutcome> {
        let kind = task.kind();
        let queued = QueuedTask::new(self.next_id(), task).sync_run(long_run);
        if self.is_worker_thread() {
            return self.shared.execute_inline(queued);
        }

        let task_id = queued.id;
        let completion = queued.completion.clone();
        self.shared
            .queue
            .enqueue(queued)
            .map_err(|_| self.terminated())?;

        self.wait_for_completion(task_id, kind, &completion, long_run);
        self.shared.exception.check()?;

        match completion.outcome() {
            Some(TaskOutcome::Failed(message)) => Err(Error::execution_failed(kind, message)),
            Some(TaskOutcome::Skipped) => Err(Error::Internal(format!(
                "{} task {} was skipped",
                kind, task_id
            ))),
            Some(outcome) => Ok(outcome),
            None => Err(Error::Internal(format!(
                "{} task {} finished without an outcome",
                kind, task_id
            ))),
        }
    }

    fn wait_for_completion(
        &self,
        task_id: TaskId,
        kind: TaskKind,
        completion: &Arc<TaskCompletion>,
        long_run: bool,
    ) {
        let mut done = self.shared.done.lock();
        if !long_run {
            self.shared
                .done_cond
                .wait_while(&mut done, |_| !completion.is_finished());
            return;
        }

        let interval = self.shared.config.long_run_report_interval;
        let started = Instant::now();
        while !completion.is_finished() {
            let timed_out = self
                .shared
                .done_cond
                .wait_while_for(&mut done, |_| !completion.is_finished(), interval)
                .timed_out();
            if timed_out {
                MutexGuard::unlocked(&mut done, || {
                    let running = self.shared.current_task();
                    info!(
                        device = %self.shared.device,
                        task_id,
                        kind = %kind,
                        waited_secs = started.elapsed().as_secs(),
                        running_task = ?running.map(|t| t.kind),
                        running_for_ms = ?running.map(|t| t.started_at.elapsed().as_millis()),
                        "Still waiting for long-running task"
                    );
                });
            }
        }
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.worker_join();
    }
}

fn expect_graph_id(kind: TaskKind, outcome: TaskOutcome) -> Result<GraphId> {
    match outcome {
        TaskOutcome::GraphId(graph_id) => Ok(graph_id),
        other => Err(Error::Internal(format!("{} returned {:?}", kind, other))),
    }
}

fn expect_bool(kind: TaskKind, outcome: TaskOutcome) -> Result<bool> {
    match outcome {
        TaskOutcome::Bool(value) => Ok(value),
        other => Err(Error::Internal(format!("{} returned {:?}", kind, other))),
    }
}
