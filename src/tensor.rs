//! Shared tensor handles
//!
//! The executor never touches tensor data. It only gates *when* a tensor may
//! be consumed, using the `need_wait` flag: a tensor produced by an in-flight
//! graph run (or locked by one) reports `need_wait() == true` until the run
//! that owns it releases it.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Process-unique tensor identity
pub type TensorId = u64;

/// Shared tensor handle
pub type TensorRef = Arc<Tensor>;

static NEXT_TENSOR_ID: AtomicU64 = AtomicU64::new(1);

/// A host-side tensor with a readiness flag
pub struct Tensor {
    id: TensorId,
    shape: Vec<usize>,
    data: Mutex<Vec<f32>>,
    need_wait: Mutex<bool>,
    ready_cond: Condvar,
    graph_output: AtomicBool,
}

impl Tensor {
    /// Create a ready tensor holding `data`
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> TensorRef {
        Arc::new(Self {
            id: NEXT_TENSOR_ID.fetch_add(1, Ordering::Relaxed),
            shape,
            data: Mutex::new(data),
            need_wait: Mutex::new(false),
            ready_cond: Condvar::new(),
            graph_output: AtomicBool::new(false),
        })
    }

    /// Create a zero-filled placeholder, typically a graph output slot
    pub fn placeholder(shape: Vec<usize>) -> TensorRef {
        let len = shape.iter().product();
        Self::new(shape, vec![0.0; len])
    }

    /// Create a one-element tensor
    pub fn scalar(value: f32) -> TensorRef {
        Self::new(vec![1], vec![value])
    }

    pub fn id(&self) -> TensorId {
        self.id
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Copy of the current host data
    pub fn data(&self) -> Vec<f32> {
        self.data.lock().clone()
    }

    /// Overwrite the host data in place
    pub fn set_data(&self, data: Vec<f32>) {
        *self.data.lock() = data;
    }

    /// Whether a computation still owns this tensor
    pub fn need_wait(&self) -> bool {
        *self.need_wait.lock()
    }

    /// Set the readiness flag; clearing it wakes every thread blocked in [`wait`](Self::wait)
    pub fn set_need_wait(&self, need_wait: bool) {
        let mut flag = self.need_wait.lock();
        *flag = need_wait;
        if !need_wait {
            self.ready_cond.notify_all();
        }
    }

    /// Block until `need_wait()` is false
    pub fn wait(&self) {
        let mut flag = self.need_wait.lock();
        self.ready_cond.wait_while(&mut flag, |need_wait| *need_wait);
    }

    /// Block until `need_wait()` is false or the timeout elapses; returns readiness
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut flag = self.need_wait.lock();
        let _ = self
            .ready_cond
            .wait_while_for(&mut flag, |need_wait| *need_wait, timeout);
        !*flag
    }

    /// Whether this tensor is the output of a graph run
    pub fn is_graph_output(&self) -> bool {
        self.graph_output.load(Ordering::Acquire)
    }

    pub fn set_graph_output(&self, graph_output: bool) {
        self.graph_output.store(graph_output, Ordering::Release);
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("id", &self.id)
            .field("shape", &self.shape)
            .field("need_wait", &self.need_wait())
            .field("graph_output", &self.is_graph_output())
            .finish()
    }
}
