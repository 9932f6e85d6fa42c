//! Executor registry
//!
//! Routes `(device_name, device_id)` to one shared executor.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::comm::{CommManager, LocalCommManager};
use crate::error::Result;

use super::runner::{Executor, ExecutorConfig, ExecutorEvent};

/// Owns one executor per device
pub struct ExecutorManager {
    executors: Mutex<HashMap<String, Arc<Executor>>>,
    comm: Arc<dyn CommManager>,
}

impl ExecutorManager {
    /// Create a manager whose executors share `comm`
    pub fn new(comm: Arc<dyn CommManager>) -> Self {
        Self {
            executors: Mutex::new(HashMap::new()),
            comm,
        }
    }

    /// Get the executor for a device, creating it on first use
    ///
    /// `config` only applies when the executor is created.
    pub fn get_executor(
        &self,
        device_name: &str,
        device_id: u32,
        config: &ExecutorConfig,
    ) -> Result<Arc<Executor>> {
        let key = format!("{}_{}", device_name, device_id);
        let mut executors = self.executors.lock();
        if let Some(executor) = executors.get(&key) {
            return Ok(executor.clone());
        }

        let executor = Arc::new(Executor::with_config(
            device_name,
            device_id,
            config.clone(),
            self.comm.clone(),
        )?);
        executors.insert(key, executor.clone());
        Ok(executor)
    }

    /// Deliver `event` to every executor
    pub fn on_event(&self, event: ExecutorEvent) {
        let executors: Vec<_> = self.executors.lock().values().cloned().collect();
        for executor in executors {
            executor.on_event(event);
        }
    }

    /// Join every worker and forget the executors
    pub fn clear(&self) {
        let executors: Vec<_> = self.executors.lock().drain().map(|(_, e)| e).collect();
        if executors.is_empty() {
            return;
        }
        let count = executors.len();
        for executor in executors {
            executor.worker_join();
        }
        info!(count, "All executors joined");
    }

    pub fn len(&self) -> usize {
        self.executors.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ExecutorManager {
    fn default() -> Self {
        Self::new(Arc::new(LocalCommManager::new()))
    }
}

impl Drop for ExecutorManager {
    fn drop(&mut self) {
        self.clear();
    }
}
