//! Session task executor
//!
//! Handles the lifecycle of session work for one device:
//! - Serializing compile, build, run and comm-group requests onto one worker thread
//! - Holding asynchronous graph runs until their inputs are released
//! - Surfacing worker-side failures to synchronous callers
//! - Draining the backlog on shutdown

mod manager;
mod queue;
mod runner;
mod state;
mod task;
mod worker;

pub use manager::*;
pub use queue::*;
pub use runner::*;
pub use state::*;
pub use task::*;
