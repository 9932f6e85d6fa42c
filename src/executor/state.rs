//! Executor state tracking
//!
//! Done list, exception slot, async in-flight gate and worker status.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use tracing::warn;

use crate::error::{Error, Result};
use crate::session::GraphId;

use super::task::{QueuedTask, Task, TaskId, TaskKind, TaskOutcome};

// ─────────────────────────────────────────────────────────────────
// Worker State
// ─────────────────────────────────────────────────────────────────

/// Lifecycle state of the worker thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    /// Waiting for work
    Idle,
    /// Executing a task
    Running,
    /// Publishing a task's completion
    Draining,
    /// Worker thread has exited
    Terminated,
}

impl Default for WorkerState {
    fn default() -> Self {
        WorkerState::Idle
    }
}

/// The task the worker is currently executing
#[derive(Debug, Clone, Copy)]
pub struct RunningTask {
    pub id: TaskId,
    pub kind: TaskKind,
    pub started_at: Instant,
}

/// Published worker status
#[derive(Debug, Default)]
pub struct WorkerStatus {
    pub state: WorkerState,
    pub current: Option<RunningTask>,

    /// Tasks executed on the worker thread (since startup)
    pub executed: u64,
}

// ─────────────────────────────────────────────────────────────────
// Done List
// ─────────────────────────────────────────────────────────────────

/// A finished task
///
/// Keeps the task itself so tensors referenced by a RunGraph stay alive
/// until the done list is cleared.
pub struct DoneTask {
    pub id: TaskId,
    pub kind: TaskKind,
    pub sync_run: bool,
    pub graph_id: Option<GraphId>,
    pub outcome: TaskOutcome,
    pub finished_at: DateTime<Utc>,
    pub elapsed: Duration,
    _task: Task,
}

impl DoneTask {
    pub fn new(queued: QueuedTask, outcome: TaskOutcome, elapsed: Duration) -> Self {
        Self {
            id: queued.id,
            kind: queued.kind(),
            sync_run: queued.sync_run,
            graph_id: queued.task.graph_id(),
            outcome,
            finished_at: Utc::now(),
            elapsed,
            _task: queued.task,
        }
    }

    pub fn info(&self) -> DoneTaskInfo {
        DoneTaskInfo {
            id: self.id,
            kind: self.kind,
            sync_run: self.sync_run,
            graph_id: self.graph_id,
            outcome: self.outcome.clone(),
            finished_at: self.finished_at,
            elapsed_ms: self.elapsed.as_millis() as u64,
        }
    }
}

/// Serializable snapshot of a [`DoneTask`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DoneTaskInfo {
    pub id: TaskId,
    pub kind: TaskKind,
    pub sync_run: bool,
    pub graph_id: Option<GraphId>,
    pub outcome: TaskOutcome,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

/// Finished tasks in completion order
pub struct DoneList {
    tasks: VecDeque<DoneTask>,

    /// Maximum retained entries (0 = unbounded)
    retained: usize,

    completed: u64,
    failed: u64,
    skipped: u64,
}

impl DoneList {
    pub fn new(retained: usize) -> Self {
        Self {
            tasks: VecDeque::new(),
            retained,
            completed: 0,
            failed: 0,
            skipped: 0,
        }
    }

    /// Record a finished task, dropping the oldest entries past the cap
    pub fn push(&mut self, task: DoneTask) {
        match task.outcome {
            TaskOutcome::Failed(_) => self.failed += 1,
            TaskOutcome::Skipped => self.skipped += 1,
            _ => self.completed += 1,
        }
        self.tasks.push_back(task);
        if self.retained > 0 {
            let excess = self.tasks.len().saturating_sub(self.retained);
            self.tasks.drain(..excess);
        }
    }

    /// Discard every entry; returns how many were removed
    pub fn clear(&mut self) -> usize {
        let removed = self.tasks.len();
        self.tasks.clear();
        removed
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn snapshot(&self) -> Vec<DoneTaskInfo> {
        self.tasks.iter().map(DoneTask::info).collect()
    }

    pub fn total_completed(&self) -> u64 {
        self.completed
    }

    pub fn total_failed(&self) -> u64 {
        self.failed
    }

    pub fn total_skipped(&self) -> u64 {
        self.skipped
    }
}

// ─────────────────────────────────────────────────────────────────
// Exception Slot
// ─────────────────────────────────────────────────────────────────

/// Holds the first unreported worker-side error
#[derive(Debug, Default)]
pub struct ExceptionSlot {
    slot: Mutex<Option<Error>>,
}

impl ExceptionSlot {
    /// Store `error` unless one is already waiting; returns whether it was kept
    pub fn store(&self, error: Error) -> bool {
        let mut slot = self.slot.lock();
        if let Some(existing) = slot.as_ref() {
            warn!(
                kept = %existing.format_for_log(),
                dropped = %error.format_for_log(),
                "Exception slot occupied, dropping later error"
            );
            return false;
        }
        *slot = Some(error);
        true
    }

    pub fn take(&self) -> Option<Error> {
        self.slot.lock().take()
    }

    /// Take the stored error and return it as `Err`
    pub fn check(&self) -> Result<()> {
        match self.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    pub fn is_set(&self) -> bool {
        self.slot.lock().is_some()
    }
}

// ─────────────────────────────────────────────────────────────────
// Reenter Gate
// ─────────────────────────────────────────────────────────────────

/// Counts asynchronous RunGraph tasks submitted but not yet finished
#[derive(Debug, Default)]
pub struct ReenterGate {
    inflight: Mutex<usize>,
    cond: Condvar,
}

impl ReenterGate {
    /// Take a slot, blocking while `limit` runs are in flight (0 = no limit)
    pub fn acquire(&self, limit: usize) {
        let mut inflight = self.inflight.lock();
        if limit > 0 {
            self.cond.wait_while(&mut inflight, |n| *n >= limit);
        }
        *inflight += 1;
    }

    pub fn release(&self) {
        let mut inflight = self.inflight.lock();
        *inflight = inflight.saturating_sub(1);
        self.cond.notify_all();
    }

    /// Wake blocked submitters so they re-check the limit
    pub fn notify(&self) {
        let _inflight = self.inflight.lock();
        self.cond.notify_all();
    }

    pub fn inflight(&self) -> usize {
        *self.inflight.lock()
    }
}

// ─────────────────────────────────────────────────────────────────
// Statistics
// ─────────────────────────────────────────────────────────────────

/// Point-in-time executor statistics
#[derive(Debug, Clone, Serialize)]
pub struct ExecutorStats {
    pub device_name: String,
    pub device_id: u32,
    pub worker_state: WorkerState,
    pub current_task: Option<TaskKind>,
    pub current_task_elapsed_ms: Option<u64>,
    pub ready_tasks: usize,
    pub pending_tasks: usize,
    pub done_tasks: usize,
    pub inflight_async_runs: usize,
    pub executed: u64,
    pub completed: u64,
    pub failed: u64,
    pub skipped: u64,
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
