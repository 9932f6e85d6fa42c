//! Session executor
//!
//! A single-worker-thread task queue that serializes graph compilation,
//! building, execution and communication-group lifecycle requests coming from
//! many caller threads, with asynchronous run-ahead gated on tensor readiness.

pub mod comm;
pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod session;
pub mod tensor;
pub mod version;
pub mod workload;

pub use error::{Error, ErrorCode, Result};
pub use executor::{Executor, ExecutorConfig, ExecutorEvent, ExecutorManager};
