//! Ready queue and pending list
//!
//! Lock order when both are held: pending, then ready.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use super::task::{QueuedTask, Task, TaskId};

#[derive(Default)]
struct ReadyQueue {
    tasks: VecDeque<QueuedTask>,

    /// Set once Exit is queued; no further submissions are accepted
    closed: bool,
}

/// FIFO of runnable tasks plus the RunGraph tasks still waiting on inputs
pub struct TaskQueue {
    ready: Mutex<ReadyQueue>,
    ready_cond: Condvar,
    pending: Mutex<Vec<QueuedTask>>,

    /// Mirror of `pending.len()` the worker reads under the ready lock alone
    pending_len: AtomicUsize,

    scan_interval: Duration,
}

fn run_graph_ready(queued: &QueuedTask) -> bool {
    match &queued.task {
        Task::RunGraph(run) => run.is_ready(),
        other => unreachable!("{} task in the pending list", other.kind()),
    }
}

impl TaskQueue {
    /// Create a queue whose idle worker rescans the pending list every `scan_interval`
    pub fn new(scan_interval: Duration) -> Self {
        Self {
            ready: Mutex::new(ReadyQueue::default()),
            ready_cond: Condvar::new(),
            pending: Mutex::new(Vec::new()),
            pending_len: AtomicUsize::new(0),
            scan_interval,
        }
    }

    /// Append to the ready queue and wake the worker
    ///
    /// Returns the task back if the queue has been closed.
    pub fn enqueue(&self, task: QueuedTask) -> Result<(), QueuedTask> {
        let mut ready = self.ready.lock();
        if ready.closed {
            return Err(task);
        }
        ready.tasks.push_back(task);
        self.ready_cond.notify_one();
        Ok(())
    }

    /// Queue the Exit task and close the queue to further submissions
    pub fn enqueue_exit(&self, task: QueuedTask) -> Result<(), QueuedTask> {
        debug_assert!(matches!(task.task, Task::Exit));
        let mut ready = self.ready.lock();
        if ready.closed {
            return Err(task);
        }
        ready.closed = true;
        ready.tasks.push_back(task);
        self.ready_cond.notify_one();
        Ok(())
    }

    /// Place a RunGraph task in the ready queue if its inputs are available,
    /// otherwise in the pending list
    ///
    /// The readiness check and the insertion happen under the pending lock
    /// that promotion takes, so a release racing with this call is never
    /// missed. Returns `Ok(true)` when the task went to pending.
    ///
    /// # Panics
    ///
    /// If `task` is not a RunGraph task.
    pub fn enqueue_pending_or_ready(&self, task: QueuedTask) -> Result<bool, QueuedTask> {
        let mut pending = self.pending.lock();
        let is_ready = run_graph_ready(&task);
        let mut ready = self.ready.lock();
        if ready.closed {
            return Err(task);
        }
        if is_ready {
            ready.tasks.push_back(task);
        } else {
            pending.push(task);
            self.pending_len.store(pending.len(), Ordering::Release);
        }
        // Also wakes an idle worker so it starts timed pending scans
        self.ready_cond.notify_one();
        Ok(!is_ready)
    }

    /// Blocking pop for the worker thread
    ///
    /// While the pending list is non-empty the wait is bounded by the scan
    /// interval, after which pending tasks are promoted.
    pub fn pop_ready(&self) -> QueuedTask {
        loop {
            {
                let mut ready = self.ready.lock();
                if let Some(task) = ready.tasks.pop_front() {
                    return task;
                }
                if self.pending_len.load(Ordering::Acquire) == 0 {
                    self.ready_cond.wait(&mut ready);
                    continue;
                }
                let timed_out = self
                    .ready_cond
                    .wait_for(&mut ready, self.scan_interval)
                    .timed_out();
                if let Some(task) = ready.tasks.pop_front() {
                    return task;
                }
                if !timed_out {
                    continue;
                }
            }
            self.promote_pending_to_ready();
        }
    }

    /// Non-blocking pop
    pub fn try_pop_ready(&self) -> Option<QueuedTask> {
        self.ready.lock().tasks.pop_front()
    }

    /// Move every RunGraph task whose inputs are available from pending to
    /// the back of the ready queue, keeping their relative order
    ///
    /// Returns the number of tasks promoted.
    pub fn promote_pending_to_ready(&self) -> usize {
        let mut pending = self.pending.lock();
        if pending.is_empty() {
            return 0;
        }

        let (promoted, waiting): (Vec<_>, Vec<_>) =
            pending.drain(..).partition(|task| run_graph_ready(task));
        *pending = waiting;
        self.pending_len.store(pending.len(), Ordering::Release);

        if promoted.is_empty() {
            return 0;
        }
        let count = promoted.len();
        let mut ready = self.ready.lock();
        ready.tasks.extend(promoted);
        self.ready_cond.notify_one();
        count
    }

    /// Remove every asynchronous RunGraph task from pending and ready
    pub fn drain_async_run_graphs(&self) -> Vec<QueuedTask> {
        let mut pending = self.pending.lock();
        let mut ready = self.ready.lock();

        let mut drained = Vec::new();
        let mut kept = VecDeque::with_capacity(ready.tasks.len());
        for task in ready.tasks.drain(..) {
            if task.is_async_run_graph() {
                drained.push(task);
            } else {
                kept.push_back(task);
            }
        }
        ready.tasks = kept;

        let (async_pending, sync_pending): (Vec<_>, Vec<_>) =
            pending.drain(..).partition(|task| task.is_async_run_graph());
        *pending = sync_pending;
        self.pending_len.store(pending.len(), Ordering::Release);
        drained.extend(async_pending);
        drained
    }

    /// Take everything still in the pending list
    pub fn drain_pending(&self) -> Vec<QueuedTask> {
        let mut pending = self.pending.lock();
        self.pending_len.store(0, Ordering::Release);
        std::mem::take(&mut *pending)
    }

    pub fn is_closed(&self) -> bool {
        self.ready.lock().closed
    }

    pub fn ready_len(&self) -> usize {
        self.ready.lock().tasks.len()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn pending_ids(&self) -> Vec<TaskId> {
        self.pending.lock().iter().map(|task| task.id).collect()
    }
}
