//! Simulated workload driver
//!
//! Drives an executor backed by [`MockSession`] through a compile, build and
//! run cycle. Every step feeds a scalar through the whole chain of graphs, so
//! asynchronous runs exercise pending-list gating and promotion.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};

use crate::comm::LocalCommManager;
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::executor::{Executor, ExecutorConfig, ExecutorStats};
use crate::session::{FuncGraph, GraphId, MockConfig, MockSession, SessionRef};
use crate::tensor::{Tensor, TensorRef};

/// Communication group spanning the whole simulated world
pub const WORLD_GROUP: &str = "world_group";

/// Summary of a workload run
#[derive(Debug, Clone, Serialize)]
pub struct WorkloadReport {
    pub device: String,
    pub graphs: Vec<GraphId>,
    pub steps: usize,
    pub async_runs: bool,
    pub runs_submitted: usize,
    pub comm_group_created: bool,
    pub comm_group_destroyed: bool,

    /// Final chain output of every step
    pub step_outputs: Vec<f32>,

    pub elapsed_ms: u64,
    pub stats: ExecutorStats,
}

/// Run the configured workload to completion and join the executor
pub fn run_workload(config: &AppConfig) -> Result<WorkloadReport> {
    let settings = &config.workload;
    if settings.graphs == 0 {
        return Err(Error::config_field_invalid("workload.graphs", "graphs must be greater than 0"));
    }

    let started = Instant::now();
    let comm = Arc::new(LocalCommManager::with_world_size(settings.world_size));
    let executor = Executor::with_config(
        config.executor.device_name.clone(),
        config.executor.device_id,
        ExecutorConfig::from(&config.executor),
        comm,
    )?;
    let session: SessionRef = Arc::new(MockSession::with_config(
        format!("{}_session", config.executor.device_name),
        MockConfig {
            run_latency: Duration::from_millis(settings.run_latency_ms),
            ..Default::default()
        },
        Default::default(),
    ));

    let ranks: Vec<u32> = (0..settings.world_size).collect();
    let comm_group_created = executor.create_comm_group(WORLD_GROUP, &ranks)?;

    let mut graphs = Vec::with_capacity(settings.graphs);
    for i in 0..settings.graphs {
        let func_graph = FuncGraph::chain(format!("net_{}", i), &["MatMul", "BiasAdd", "ReLU"]);
        let graph_id = executor.compile_graph(&session, &func_graph)?;
        executor.build_graph(&session, graph_id)?;
        graphs.push(graph_id);
    }
    info!(graphs = ?graphs, "Graphs compiled and built");

    let mut runs_submitted = 0;
    let mut step_results: Vec<TensorRef> = Vec::with_capacity(settings.steps);
    for step in 0..settings.steps {
        let mut current = Tensor::scalar(1.0);
        for &graph_id in &graphs {
            let mut outputs = Vec::new();
            if settings.async_runs {
                executor.run_graph_async(&session, graph_id, &[current], &mut outputs)?;
            } else {
                executor.run_graph(&session, graph_id, &[current], &mut outputs)?;
            }
            runs_submitted += 1;
            current = outputs
                .into_iter()
                .next()
                .ok_or_else(|| Error::Internal(format!("graph {} produced no outputs", graph_id)))?;
        }
        debug!(step, "Step submitted");
        step_results.push(current);
    }

    // Comm-group destruction is queued behind every run above
    let comm_group_destroyed = executor.destroy_comm_group(WORLD_GROUP)?;
    let step_outputs = step_results
        .iter()
        .map(|tensor| {
            tensor.wait();
            tensor.data().first().copied().unwrap_or_default()
        })
        .collect();

    executor.worker_join();
    let stats = executor.stats();
    let elapsed_ms = started.elapsed().as_millis() as u64;
    info!(runs = runs_submitted, elapsed_ms, "Workload finished");

    Ok(WorkloadReport {
        device: format!("{}-{}", executor.device_name(), executor.device_id()),
        graphs,
        steps: settings.steps,
        async_runs: settings.async_runs,
        runs_submitted,
        comm_group_created,
        comm_group_destroyed,
        step_outputs,
        elapsed_ms,
        stats,
    })
}
