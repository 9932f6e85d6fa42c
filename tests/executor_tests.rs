//! Executor behaviour tests
//!
//! Drives executors with `MockSession` from one or more caller threads.

mod common;

use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use ms_session_executor::comm::LocalCommManager;
use ms_session_executor::executor::{
    Executor, ExecutorConfig, ExecutorEvent, ExecutorManager, TaskKind, TaskOutcome, WorkerState,
};
use ms_session_executor::session::{
    ConcurrencyProbe, FuncGraph, GraphId, GraphSegment, MockConfig, MockSession, SessionCall,
    SessionRef,
};
use ms_session_executor::tensor::{Tensor, TensorRef};
use ms_session_executor::Error;

use common::{fast_config, test_executor};

fn mock_session(config: MockConfig) -> (Arc<MockSession>, SessionRef) {
    let mock = Arc::new(MockSession::with_config("mock", config, ConcurrencyProbe::new()));
    let session: SessionRef = mock.clone();
    (mock, session)
}

fn with_latency(ms: u64) -> MockConfig {
    MockConfig {
        run_latency: Duration::from_millis(ms),
        ..Default::default()
    }
}

fn build_graph(executor: &Executor, session: &SessionRef, name: &str) -> GraphId {
    let graph_id = executor
        .compile_graph(session, &FuncGraph::chain(name, &["MatMul", "ReLU"]))
        .unwrap();
    executor.build_graph(session, graph_id).unwrap();
    graph_id
}

/// A tensor owned by something outside the executor, e.g. a device stream
fn external_output() -> TensorRef {
    let tensor = Tensor::scalar(5.0);
    tensor.set_graph_output(true);
    tensor.set_need_wait(true);
    tensor
}

// ─────────────────────────────────────────────────────────────────
// Ordering & Exclusion
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_tasks_run_in_submission_order() {
    let (executor, _) = test_executor(fast_config());
    let (mock, session) = mock_session(MockConfig::default());

    let first = build_graph(&executor, &session, "first");
    let second = build_graph(&executor, &session, "second");

    let mut outputs = Vec::new();
    for graph_id in [second, first, second] {
        executor
            .run_graph_async(&session, graph_id, &[Tensor::scalar(0.0)], &mut outputs)
            .unwrap();
    }
    executor.run_graph(&session, first, &[], &mut outputs).unwrap();

    assert_eq!(
        mock.calls(),
        vec![
            SessionCall::CompileGraph(first),
            SessionCall::BuildGraph(first),
            SessionCall::CompileGraph(second),
            SessionCall::BuildGraph(second),
            SessionCall::RunGraph(second),
            SessionCall::RunGraph(first),
            SessionCall::RunGraph(second),
            SessionCall::RunGraph(first),
        ]
    );
}

#[test]
fn test_session_calls_never_overlap() {
    let (executor, _) = test_executor(fast_config());
    let executor = Arc::new(executor);
    let probe = ConcurrencyProbe::new();

    let callers: Vec<_> = (0..4)
        .map(|i| {
            let executor = executor.clone();
            let probe = probe.clone();
            thread::spawn(move || {
                let session: SessionRef = Arc::new(MockSession::with_config(
                    format!("session_{}", i),
                    with_latency(2),
                    probe,
                ));
                let graph_id = build_graph(&executor, &session, "net");
                for step in 0..5 {
                    let mut outputs = Vec::new();
                    let input = Tensor::scalar(step as f32);
                    if step % 2 == 0 {
                        executor
                            .run_graph_async(&session, graph_id, &[input], &mut outputs)
                            .unwrap();
                    } else {
                        executor.run_graph(&session, graph_id, &[input], &mut outputs).unwrap();
                    }
                }
            })
        })
        .collect();

    for caller in callers {
        caller.join().unwrap();
    }
    executor.worker_join();

    assert_eq!(probe.max_active(), 1);
    assert_eq!(executor.stats().failed, 0);
}

// ─────────────────────────────────────────────────────────────────
// Pending List & Promotion
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_consumer_waits_for_producer() {
    let (executor, _) = test_executor(fast_config());
    let (mock, session) = mock_session(with_latency(20));
    let producer = build_graph(&executor, &session, "producer");
    let consumer = build_graph(&executor, &session, "consumer");

    let mut produced = Vec::new();
    executor
        .run_graph_async(&session, producer, &[Tensor::scalar(1.0)], &mut produced)
        .unwrap();
    let mut consumed = Vec::new();
    executor
        .run_graph_async(&session, consumer, &[produced[0].clone()], &mut consumed)
        .unwrap();

    consumed[0].wait();
    assert_eq!(consumed[0].data(), vec![1.0 + producer as f32 + consumer as f32]);
    assert_eq!(mock.run_order(), vec![producer, consumer]);
}

#[test]
fn test_background_scan_promotes_external_release() {
    let (executor, _) = test_executor(fast_config());
    let (_mock, session) = mock_session(MockConfig::default());
    let graph_id = build_graph(&executor, &session, "net");

    let gate = external_output();
    let mut outputs = Vec::new();
    executor
        .run_graph_async(&session, graph_id, &[gate.clone()], &mut outputs)
        .unwrap();

    assert_eq!(executor.pending_task_ids().len(), 1);
    assert!(!outputs[0].wait_timeout(Duration::from_millis(30)));

    // No event is raised; the idle worker's scan must notice the release
    gate.set_need_wait(false);
    assert!(outputs[0].wait_timeout(Duration::from_secs(5)));
    assert_eq!(outputs[0].data(), vec![5.0 + graph_id as f32]);
    assert!(executor.pending_task_ids().is_empty());
}

#[test]
fn test_run_graph_finished_event_promotes() {
    let config = ExecutorConfig {
        pending_scan_interval: Duration::from_secs(30),
        ..fast_config()
    };
    let (executor, _) = test_executor(config);
    let (_mock, session) = mock_session(MockConfig::default());
    let graph_id = build_graph(&executor, &session, "net");

    let gate = external_output();
    let mut outputs = Vec::new();
    executor
        .run_graph_async(&session, graph_id, &[gate.clone()], &mut outputs)
        .unwrap();

    gate.set_need_wait(false);
    executor.on_event(ExecutorEvent::RunGraphFinished);
    assert!(outputs[0].wait_timeout(Duration::from_secs(5)));
}

#[test]
fn test_sync_run_waits_for_async_producer() {
    let (executor, _) = test_executor(fast_config());
    let (_mock, session) = mock_session(with_latency(20));
    let producer = build_graph(&executor, &session, "producer");
    let consumer = build_graph(&executor, &session, "consumer");

    let gate = external_output();
    let mut produced = Vec::new();
    executor
        .run_graph_async(&session, producer, &[gate.clone()], &mut produced)
        .unwrap();

    let releaser = {
        let gate = gate.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            gate.set_need_wait(false);
        })
    };

    let mut consumed = Vec::new();
    executor
        .run_graph(&session, consumer, &[produced[0].clone()], &mut consumed)
        .unwrap();
    releaser.join().unwrap();

    assert_eq!(
        consumed[0].data(),
        vec![5.0 + producer as f32 + consumer as f32]
    );
}

#[test]
fn test_no_output_async_run_waits_for_producer() {
    let (executor, _) = test_executor(fast_config());
    let (producer_mock, producer_session) = mock_session(MockConfig::default());
    let (sink_mock, sink_session) = mock_session(MockConfig {
        outputs_per_graph: 0,
        ..Default::default()
    });
    let producer = build_graph(&executor, &producer_session, "producer");
    let sink = build_graph(&executor, &sink_session, "sink");

    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    for (mock, label) in [(&producer_mock, "producer"), (&sink_mock, "sink")] {
        let order = order.clone();
        mock.set_run_hook(Arc::new(move |_| order.lock().push(label)));
    }

    let gate = external_output();
    let mut produced = Vec::new();
    executor
        .run_graph_async(&producer_session, producer, &[gate.clone()], &mut produced)
        .unwrap();
    assert_eq!(executor.pending_task_ids().len(), 1);

    let releaser = {
        let gate = gate.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            gate.set_need_wait(false);
        })
    };

    let mut sunk = Vec::new();
    executor
        .run_graph_async(&sink_session, sink, &[produced[0].clone()], &mut sunk)
        .unwrap();
    releaser.join().unwrap();

    // Without outputs the call is synchronous, so the sink has already run
    assert!(sunk.is_empty());
    assert!(!produced[0].need_wait());
    assert_eq!(*order.lock(), vec!["producer", "sink"]);
    assert_eq!(sink_mock.run_order(), vec![sink]);
}

#[test]
fn test_locked_parameter_serializes_submitters() {
    let config = MockConfig {
        run_latency: Duration::from_millis(50),
        lock_inputs: true,
        ..Default::default()
    };
    let (executor, _) = test_executor(fast_config());
    let (mock, session) = mock_session(config);
    let graph_id = build_graph(&executor, &session, "optimizer");

    let parameter = Tensor::scalar(1.0);
    let mut outputs = Vec::new();
    executor
        .run_graph_async(&session, graph_id, &[parameter.clone()], &mut outputs)
        .unwrap();
    assert!(parameter.need_wait());

    let started = Instant::now();
    executor
        .run_graph_async(&session, graph_id, &[parameter.clone()], &mut outputs)
        .unwrap();
    assert!(started.elapsed() >= Duration::from_millis(25));

    executor.worker_join();
    assert!(!parameter.need_wait());
    assert_eq!(mock.run_order(), vec![graph_id, graph_id]);
}

// ─────────────────────────────────────────────────────────────────
// Shutdown
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_join_drains_backlog() {
    let (executor, _) = test_executor(fast_config());
    let (mock, session) = mock_session(with_latency(5));
    let graph_id = build_graph(&executor, &session, "net");

    let mut outputs = Vec::new();
    for i in 0..8 {
        executor
            .run_graph_async(&session, graph_id, &[Tensor::scalar(i as f32)], &mut outputs)
            .unwrap();
    }
    executor.worker_join();

    assert_eq!(executor.worker_state(), WorkerState::Terminated);
    assert_eq!(mock.run_order().len(), 8);
    for (i, output) in outputs.iter().enumerate() {
        assert!(!output.need_wait());
        assert_eq!(output.data(), vec![i as f32 + graph_id as f32]);
    }

    let done = executor.done_tasks();
    assert_eq!(done.last().map(|t| t.kind), Some(TaskKind::Exit));
    assert_eq!(
        done.iter().filter(|t| t.kind == TaskKind::RunGraph).count(),
        8
    );
}

#[test]
fn test_join_skips_runs_that_can_never_start() {
    let (executor, _) = test_executor(fast_config());
    let (mock, session) = mock_session(MockConfig::default());
    let graph_id = build_graph(&executor, &session, "net");

    let gate = external_output();
    let mut outputs = Vec::new();
    executor
        .run_graph_async(&session, graph_id, &[gate], &mut outputs)
        .unwrap();
    executor.worker_join();

    assert!(mock.run_order().is_empty());
    assert!(!outputs[0].need_wait());
    let skipped: Vec<_> = executor
        .done_tasks()
        .into_iter()
        .filter(|t| t.outcome == TaskOutcome::Skipped)
        .collect();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].graph_id, Some(graph_id));
    assert_eq!(executor.stats().inflight_async_runs, 0);
}

#[test]
fn test_submissions_after_join_fail() {
    let (executor, _) = test_executor(fast_config());
    let (_mock, session) = mock_session(MockConfig::default());
    executor.worker_join();

    let mut outputs = Vec::new();
    let err = executor
        .run_graph_async(&session, 1, &[], &mut outputs)
        .unwrap_err();
    assert!(matches!(err, Error::ExecutorTerminated { .. }));
    assert!(outputs.is_empty());
}

// ─────────────────────────────────────────────────────────────────
// Failures
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_async_failure_surfaces_on_next_sync_call() {
    let (executor, _) = test_executor(fast_config());
    let (mock, session) = mock_session(MockConfig::default());
    let graph_id = build_graph(&executor, &session, "net");
    mock.fail_graph(graph_id);

    let mut outputs = Vec::new();
    executor
        .run_graph_async(&session, graph_id, &[], &mut outputs)
        .unwrap();
    outputs[0].wait();

    let err = executor
        .compile_graph(&session, &FuncGraph::chain("next", &["Add"]))
        .unwrap_err();
    assert!(matches!(err, Error::ExecutionFailed { .. }));
    assert!(err.to_string().contains("injected failure"));

    // The error is reported once
    assert!(executor
        .compile_graph(&session, &FuncGraph::chain("again", &["Add"]))
        .is_ok());
}

#[test]
fn test_failed_run_skips_dependent_runs() {
    let (executor, _) = test_executor(fast_config());
    let (mock, session) = mock_session(with_latency(10));
    let producer = build_graph(&executor, &session, "producer");
    let consumer = build_graph(&executor, &session, "consumer");
    mock.fail_graph(producer);

    let mut produced = Vec::new();
    executor
        .run_graph_async(&session, producer, &[], &mut produced)
        .unwrap();
    let mut consumed = Vec::new();
    executor
        .run_graph_async(&session, consumer, &[produced[0].clone()], &mut consumed)
        .unwrap();
    consumed[0].wait();

    assert_eq!(mock.run_order(), vec![producer]);
    assert!(executor.build_graph(&session, consumer).is_err());
    let stats = executor.stats();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.skipped, 1);
}

#[test]
fn test_failed_comm_group_keeps_async_runs_queued() {
    let (executor, _) = test_executor(fast_config());
    let (mock, session) = mock_session(MockConfig::default());
    let graph_id = build_graph(&executor, &session, "gated");

    let gate = external_output();
    let mut outputs = Vec::new();
    executor
        .run_graph_async(&session, graph_id, &[gate.clone()], &mut outputs)
        .unwrap();

    assert!(executor.create_comm_group("bad", &[1, 1]).is_err());
    assert_eq!(executor.pending_task_ids().len(), 1);

    gate.set_need_wait(false);
    assert!(outputs[0].wait_timeout(Duration::from_secs(5)));
    assert_eq!(mock.run_order(), vec![graph_id]);
    assert_eq!(executor.stats().skipped, 0);
}

#[test]
fn test_exception_event_skips_async_runs() {
    let (executor, _) = test_executor(fast_config());
    let (mock, session) = mock_session(MockConfig::default());
    let graph_id = build_graph(&executor, &session, "net");

    let gate = external_output();
    let mut outputs = Vec::new();
    executor
        .run_graph_async(&session, graph_id, &[gate], &mut outputs)
        .unwrap();
    assert_eq!(executor.pending_task_ids().len(), 1);

    executor.on_event(ExecutorEvent::Exception);
    assert!(executor.pending_task_ids().is_empty());
    assert!(!outputs[0].need_wait());

    let err = executor.build_graph(&session, graph_id).unwrap_err();
    assert!(matches!(err, Error::DeviceException { .. }));
    assert!(executor.build_graph(&session, graph_id).is_ok());
    assert!(mock.run_order().is_empty());
}

#[test]
fn test_panicking_session_does_not_kill_worker() {
    let (executor, _) = test_executor(fast_config());
    let (mock, session) = mock_session(MockConfig::default());
    let graph_id = build_graph(&executor, &session, "net");
    mock.panic_graph(graph_id);

    let mut outputs = Vec::new();
    let err = executor
        .run_graph(&session, graph_id, &[], &mut outputs)
        .unwrap_err();
    assert!(matches!(err, Error::TaskPanicked { .. }));
    assert!(!outputs[0].need_wait());

    assert_ne!(executor.worker_state(), WorkerState::Terminated);
    assert!(build_graph(&executor, &session, "after") > 0);
}

// ─────────────────────────────────────────────────────────────────
// Done List
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_compile_result_is_recorded() {
    let (executor, _) = test_executor(fast_config());
    let (_mock, session) = mock_session(MockConfig::default());

    let nodes = FuncGraph::chain("segment", &["Conv2D", "ReLU"]).nodes;
    let outputs = vec![nodes[1].clone()];
    let graph_id = executor
        .compile_nodes(&session, &GraphSegment::new(nodes), &outputs)
        .unwrap();
    assert!(graph_id > 0);

    let done = executor.done_tasks();
    assert_eq!(done.len(), 1);
    assert_eq!(done[0].kind, TaskKind::CompileNodes);
    assert_eq!(done[0].outcome, TaskOutcome::GraphId(graph_id));
    assert!(done[0].sync_run);
}

#[test]
fn test_clear_done_tasks_is_idempotent() {
    let (executor, _) = test_executor(fast_config());
    let (_mock, session) = mock_session(MockConfig::default());
    build_graph(&executor, &session, "net");
    assert_eq!(executor.done_tasks().len(), 2);

    executor.clear_done_tasks();
    assert!(executor.done_tasks().is_empty());
    executor.clear_done_tasks();
    executor.on_event(ExecutorEvent::Clear);
    assert!(executor.done_tasks().is_empty());
    assert_eq!(executor.stats().completed, 2);
}

#[test]
fn test_done_list_retention_cap() {
    let config = ExecutorConfig {
        done_tasks_retained: 3,
        ..fast_config()
    };
    let (executor, _) = test_executor(config);
    let (_mock, session) = mock_session(MockConfig::default());
    for i in 0..4 {
        build_graph(&executor, &session, &format!("net_{}", i));
    }
    assert_eq!(executor.done_tasks().len(), 3);
    assert_eq!(executor.stats().completed, 8);
}

// ─────────────────────────────────────────────────────────────────
// Communication Groups
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_comm_groups_are_ordered_with_graph_work() {
    let (executor, comm) = test_executor(fast_config());
    let (_mock, session) = mock_session(with_latency(5));
    let graph_id = build_graph(&executor, &session, "net");

    assert!(executor.create_comm_group("dp_group", &[0, 1, 2, 3]).unwrap());
    let mut outputs = Vec::new();
    for _ in 0..3 {
        executor
            .run_graph_async(&session, graph_id, &[], &mut outputs)
            .unwrap();
    }
    assert!(executor.destroy_comm_group("dp_group").unwrap());
    assert!(!comm.has_group("dp_group"));

    // Destruction ran after every run queued before it
    for output in &outputs {
        assert!(!output.need_wait());
    }
    let kinds: Vec<_> = executor.done_tasks().iter().map(|t| t.kind).collect();
    assert_eq!(
        kinds[2..],
        [
            TaskKind::CreateCommGroup,
            TaskKind::RunGraph,
            TaskKind::RunGraph,
            TaskKind::RunGraph,
            TaskKind::DestroyCommGroup,
        ]
    );

    assert!(!executor.destroy_comm_group("dp_group").unwrap());
    assert!(executor.create_comm_group("dp_group", &[0, 1]).unwrap());
}

#[test]
fn test_comm_group_errors_reach_caller() {
    let (executor, comm) = test_executor(fast_config());
    let err = executor.create_comm_group("bad", &[1, 1]).unwrap_err();
    assert!(matches!(err, Error::CommGroup { .. }));
    assert_eq!(comm.group_count(), 0);
}

// ─────────────────────────────────────────────────────────────────
// Backpressure & Re-entrancy
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_inflight_async_runs_are_bounded() {
    let config = ExecutorConfig {
        max_inflight_async_runs: 2,
        ..fast_config()
    };
    let (executor, _) = test_executor(config);
    let (_mock, session) = mock_session(with_latency(20));
    let graph_id = build_graph(&executor, &session, "net");

    let started = Instant::now();
    let mut outputs = Vec::new();
    for _ in 0..5 {
        executor
            .run_graph_async(&session, graph_id, &[], &mut outputs)
            .unwrap();
        assert!(executor.stats().inflight_async_runs <= 2);
    }
    // The third submission had to wait for the first run
    assert!(started.elapsed() >= Duration::from_millis(20));

    executor.worker_join();
    assert_eq!(executor.stats().inflight_async_runs, 0);
}

#[test]
fn test_worker_thread_calls_run_inline() {
    let (executor, _) = test_executor(fast_config());
    let executor = Arc::new(executor);
    let (mock, session) = mock_session(MockConfig::default());
    let graph_id = build_graph(&executor, &session, "outer");

    let nested: Arc<Mutex<Option<Result<GraphId, String>>>> = Arc::new(Mutex::new(None));
    {
        let weak: Weak<Executor> = Arc::downgrade(&executor);
        let session = session.clone();
        let nested = nested.clone();
        mock.set_run_hook(Arc::new(move |_| {
            if nested.lock().is_some() {
                return;
            }
            if let Some(executor) = weak.upgrade() {
                assert!(executor.is_worker_thread());
                let result = executor
                    .compile_graph(&session, &FuncGraph::chain("inner", &["Add"]))
                    .map_err(|e| e.to_string());
                *nested.lock() = Some(result);
            }
        }));
    }

    let mut outputs = Vec::new();
    executor.run_graph(&session, graph_id, &[], &mut outputs).unwrap();

    let inner = nested.lock().clone().unwrap().unwrap();
    assert!(inner > graph_id);
    executor.worker_join();
}

#[test]
fn test_worker_thread_run_rejects_unreleased_input() {
    let (executor, _) = test_executor(fast_config());
    let executor = Arc::new(executor);
    let (mock, session) = mock_session(MockConfig::default());
    let outer = build_graph(&executor, &session, "outer");
    let inner = build_graph(&executor, &session, "inner");
    let gate = external_output();

    let nested: Arc<Mutex<Option<Result<(), String>>>> = Arc::new(Mutex::new(None));
    {
        let weak: Weak<Executor> = Arc::downgrade(&executor);
        let session = session.clone();
        let nested = nested.clone();
        let gate = gate.clone();
        mock.set_run_hook(Arc::new(move |graph_id| {
            if graph_id != outer || nested.lock().is_some() {
                return;
            }
            if let Some(executor) = weak.upgrade() {
                let mut outputs = Vec::new();
                let result = executor
                    .run_graph(&session, inner, &[gate.clone()], &mut outputs)
                    .map_err(|e| e.to_string());
                *nested.lock() = Some(result);
            }
        }));
    }

    let mut outputs = Vec::new();
    executor.run_graph(&session, outer, &[], &mut outputs).unwrap();

    let err = nested.lock().clone().unwrap().unwrap_err();
    assert!(err.contains("cannot be waited on from the worker thread"));
    assert_eq!(mock.run_order(), vec![outer]);
    assert!(gate.need_wait());
    executor.worker_join();
}

#[test]
fn test_worker_thread_no_output_run_is_queued() {
    let (executor, _) = test_executor(fast_config());
    let executor = Arc::new(executor);
    let (mock, session) = mock_session(MockConfig::default());
    let (sink_mock, sink_session) = mock_session(MockConfig {
        outputs_per_graph: 0,
        ..Default::default()
    });
    let outer = build_graph(&executor, &session, "outer");
    let sink = build_graph(&executor, &sink_session, "sink");
    let gate = external_output();

    let released_when_run: Arc<Mutex<Option<bool>>> = Arc::new(Mutex::new(None));
    {
        let released_when_run = released_when_run.clone();
        let gate = gate.clone();
        sink_mock.set_run_hook(Arc::new(move |_| {
            *released_when_run.lock() = Some(!gate.need_wait());
        }));
    }

    let submitted: Arc<Mutex<Option<Result<(), String>>>> = Arc::new(Mutex::new(None));
    {
        let weak: Weak<Executor> = Arc::downgrade(&executor);
        let submitted = submitted.clone();
        let gate = gate.clone();
        mock.set_run_hook(Arc::new(move |_| {
            if submitted.lock().is_some() {
                return;
            }
            if let Some(executor) = weak.upgrade() {
                let result = executor
                    .run_graph_async(&sink_session, sink, &[gate.clone()], &mut Vec::new())
                    .map_err(|e| e.to_string());
                *submitted.lock() = Some(result);
            }
        }));
    }

    let mut outputs = Vec::new();
    executor.run_graph(&session, outer, &[], &mut outputs).unwrap();

    assert_eq!(submitted.lock().clone(), Some(Ok(())));
    assert_eq!(executor.pending_task_ids().len(), 1);
    assert!(sink_mock.run_order().is_empty());

    gate.set_need_wait(false);
    executor.worker_join();

    assert_eq!(sink_mock.run_order(), vec![sink]);
    assert_eq!(*released_when_run.lock(), Some(true));
}

// ─────────────────────────────────────────────────────────────────
// Executor Manager
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_manager_broadcasts_events() {
    let manager = ExecutorManager::new(Arc::new(LocalCommManager::new()));
    let cpu = manager.get_executor("CPU", 0, &fast_config()).unwrap();
    let gpu = manager.get_executor("GPU", 0, &fast_config()).unwrap();
    assert!(Arc::ptr_eq(
        &cpu,
        &manager.get_executor("CPU", 0, &fast_config()).unwrap()
    ));

    let (_mock, session) = mock_session(MockConfig::default());
    manager.on_event(ExecutorEvent::Exception);
    for executor in [&cpu, &gpu] {
        let err = executor
            .compile_graph(&session, &FuncGraph::chain("net", &["Add"]))
            .unwrap_err();
        assert!(matches!(err, Error::DeviceException { .. }));
    }

    manager.clear();
    assert!(manager.is_empty());
    assert_eq!(cpu.worker_state(), WorkerState::Terminated);
    assert_eq!(gpu.worker_state(), WorkerState::Terminated);
}
