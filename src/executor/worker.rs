//! Worker thread
//!
//! One OS thread per executor pops tasks from the ready queue and runs them
//! against their session or the comm manager. Failures and panics are turned
//! into errors, published, and never end the loop; only Exit does.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, trace, warn};

use crate::comm::CommManager;
use crate::error::{Error, Result};

use super::queue::TaskQueue;
use super::runner::ExecutorConfig;
use super::state::{
    DoneList, DoneTask, ExceptionSlot, ReenterGate, RunningTask, WorkerState, WorkerStatus,
};
use super::task::{QueuedTask, Task, TaskOutcome};

/// State shared between an executor handle and its worker thread
pub(crate) struct Shared {
    /// "{device_name}-{device_id}", for log fields
    pub device: String,
    pub config: ExecutorConfig,
    pub queue: TaskQueue,
    pub done: Mutex<DoneList>,
    pub done_cond: Condvar,
    pub exception: ExceptionSlot,
    pub reenter: ReenterGate,
    pub status: Mutex<WorkerStatus>,
    pub comm: Arc<dyn CommManager>,
}

impl Shared {
    pub fn new(device: String, config: ExecutorConfig, comm: Arc<dyn CommManager>) -> Self {
        Self {
            device,
            queue: TaskQueue::new(config.pending_scan_interval),
            done: Mutex::new(DoneList::new(config.done_tasks_retained)),
            done_cond: Condvar::new(),
            exception: ExceptionSlot::default(),
            reenter: ReenterGate::default(),
            status: Mutex::new(WorkerStatus::default()),
            comm,
            config,
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Execution
    // ─────────────────────────────────────────────────────────────

    /// Run a dequeued task and publish its completion
    pub fn execute(&self, queued: QueuedTask) {
        let started = Instant::now();
        self.mark_running(&queued, started);
        trace!(device = %self.device, task_id = queued.id, task = ?queued.task, "Running task");

        let result = self.run_task(&queued.task);
        self.set_state(WorkerState::Draining);

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => self.handle_failure(&queued, err),
        };
        self.finish_task(queued, outcome, started.elapsed());
    }

    /// Run a task submitted from the worker thread itself
    ///
    /// The result goes straight back to the caller; the exception slot is not
    /// touched and the worker status keeps describing the outer task.
    pub fn execute_inline(&self, queued: QueuedTask) -> Result<TaskOutcome> {
        let started = Instant::now();
        debug!(device = %self.device, task_id = queued.id, kind = %queued.kind(), "Running task inline");
        let result = self.run_task(&queued.task);
        let outcome = match &result {
            Ok(outcome) => outcome.clone(),
            Err(err) => TaskOutcome::Failed(err.to_string()),
        };
        self.finish_task(queued, outcome, started.elapsed());
        result
    }

    fn run_task(&self, task: &Task) -> Result<TaskOutcome> {
        match panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(task))) {
            Ok(result) => result,
            Err(payload) => Err(Error::TaskPanicked {
                task: task.kind().to_string(),
                message: panic_message(payload.as_ref()),
            }),
        }
    }

    fn dispatch(&self, task: &Task) -> Result<TaskOutcome> {
        match task {
            Task::CompileNodes {
                session,
                segment,
                outputs,
            } => session.compile_nodes(segment, outputs).map(TaskOutcome::GraphId),
            Task::CompileGraph {
                session,
                func_graph,
            } => session.compile_graph(func_graph).map(TaskOutcome::GraphId),
            Task::BuildGraph { session, graph_id } => {
                session.build_graph(*graph_id).map(|_| TaskOutcome::Done)
            }
            Task::RunGraph(run) => {
                run.session.load_inputs(run.graph_id, &run.input_tensors)?;
                run.session
                    .run_graph_impl(run.graph_id, &run.input_tensors, &run.outputs)?;
                run.session.update_output_tensors(&run.outputs, &run.tensor_to_node);
                Ok(TaskOutcome::Done)
            }
            Task::CreateCommGroup { group_name, ranks } => self
                .comm
                .create_group_sync(group_name, ranks)
                .map(TaskOutcome::Bool),
            Task::DestroyCommGroup { group_name } => {
                self.comm.destroy_group(group_name).map(TaskOutcome::Bool)
            }
            Task::Exit => Ok(TaskOutcome::Done),
        }
    }

    /// Record a failed task's error for the next synchronous caller
    ///
    /// Only a failed RunGraph raises the exception event and skips queued
    /// asynchronous runs, since those may consume outputs it never wrote. A
    /// failed compile, build or comm-group task touches no run's tensors, so
    /// queued runs stay and the error reaches its own caller.
    fn handle_failure(&self, queued: &QueuedTask, err: Error) -> TaskOutcome {
        error!(
            device = %self.device,
            task_id = queued.id,
            kind = %queued.kind(),
            error = %err.format_for_log(),
            "Task failed"
        );
        let outcome = TaskOutcome::Failed(err.to_string());
        if queued.task.as_run_graph().is_some() {
            self.raise_exception(err);
        } else {
            self.exception.store(err);
        }
        outcome
    }

    /// Release tensors, record the task as done and wake whoever depends on it
    fn finish_task(&self, queued: QueuedTask, outcome: TaskOutcome, elapsed: Duration) {
        let is_run_graph = queued.task.as_run_graph().is_some();
        let async_run = queued.is_async_run_graph();
        if let Some(run) = queued.task.as_run_graph() {
            if outcome.is_success() {
                run.session.report_warning_message();
            } else {
                run.session.report_error_message();
            }
            run.release_tensors();
        }

        self.record_done(queued, outcome, elapsed);

        if async_run {
            self.reenter.release();
        }
        if is_run_graph {
            let promoted = self.queue.promote_pending_to_ready();
            if promoted > 0 {
                debug!(device = %self.device, promoted, "Promoted pending RunGraph tasks");
            }
            self.reenter.notify();
        }
    }

    fn record_done(&self, queued: QueuedTask, outcome: TaskOutcome, elapsed: Duration) {
        let mut done = self.done.lock();
        queued.completion.set(outcome.clone());
        done.push(DoneTask::new(queued, outcome, elapsed));
        self.done_cond.notify_all();
    }

    /// Drop a task without running it
    fn skip_task(&self, queued: QueuedTask) {
        if let Some(run) = queued.task.as_run_graph() {
            run.release_tensors();
        }
        let async_run = queued.is_async_run_graph();
        self.record_done(queued, TaskOutcome::Skipped, Duration::ZERO);
        if async_run {
            self.reenter.release();
        }
    }

    /// Store `err` and skip every queued asynchronous RunGraph
    ///
    /// Synchronous tasks stay queued; their callers receive the stored error
    /// once they complete.
    pub fn raise_exception(&self, err: Error) {
        self.exception.store(err);

        let skipped = self.queue.drain_async_run_graphs();
        if !skipped.is_empty() {
            warn!(
                device = %self.device,
                count = skipped.len(),
                "Skipping queued asynchronous runs after exception"
            );
        }
        for queued in skipped {
            self.skip_task(queued);
        }

        {
            let _done = self.done.lock();
            self.done_cond.notify_all();
        }
        self.reenter.notify();
    }

    // ─────────────────────────────────────────────────────────────
    // Shutdown
    // ─────────────────────────────────────────────────────────────

    /// Finish the backlog after Exit was dequeued
    ///
    /// Pending runs that become ready still execute; the rest are skipped.
    fn drain_on_exit(&self, exit: QueuedTask) {
        self.set_state(WorkerState::Draining);
        loop {
            self.queue.promote_pending_to_ready();
            match self.queue.try_pop_ready() {
                Some(queued) => self.execute(queued),
                None => break,
            }
        }

        let leftovers = self.queue.drain_pending();
        if !leftovers.is_empty() {
            warn!(
                device = %self.device,
                count = leftovers.len(),
                "Skipping RunGraph tasks whose inputs never became ready"
            );
        }
        for queued in leftovers {
            self.skip_task(queued);
        }

        let elapsed = exit.submitted_at.elapsed();
        self.record_done(exit, TaskOutcome::Done, elapsed);
        self.set_state(WorkerState::Terminated);
    }

    // ─────────────────────────────────────────────────────────────
    // Status
    // ─────────────────────────────────────────────────────────────

    fn mark_running(&self, queued: &QueuedTask, started_at: Instant) {
        let mut status = self.status.lock();
        status.state = WorkerState::Running;
        status.current = Some(RunningTask {
            id: queued.id,
            kind: queued.kind(),
            started_at,
        });
        status.executed += 1;
    }

    fn set_state(&self, state: WorkerState) {
        let mut status = self.status.lock();
        status.state = state;
        if state != WorkerState::Draining {
            status.current = None;
        }
    }

    pub fn worker_state(&self) -> WorkerState {
        self.status.lock().state
    }

    pub fn current_task(&self) -> Option<RunningTask> {
        self.status.lock().current
    }
}

/// Worker thread body
pub(crate) fn worker_loop(shared: Arc<Shared>) {
    info!(device = %shared.device, "Executor worker started");
    loop {
        shared.set_state(WorkerState::Idle);
        let queued = shared.queue.pop_ready();
        if matches!(queued.task, Task::Exit) {
            shared.drain_on_exit(queued);
            break;
        }
        shared.execute(queued);
    }
    info!(device = %shared.device, "Executor worker terminated");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
