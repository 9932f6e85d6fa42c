//! Common test utilities and fixtures
//!
//! This module provides shared test infrastructure

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ms_session_executor::comm::LocalCommManager;
use ms_session_executor::executor::{Executor, ExecutorConfig};

/// Get the path to the test fixtures directory
pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

/// Get a path to a specific fixture file
pub fn fixture_path(name: &str) -> PathBuf {
    fixtures_dir().join(name)
}

/// Get the valid config fixture path
pub fn valid_config_fixture() -> PathBuf {
    fixture_path("valid_config.toml")
}

/// Get the invalid config fixture path
pub fn invalid_config_fixture() -> PathBuf {
    fixture_path("invalid_config.toml")
}

/// Executor configuration with short scan and report intervals
pub fn fast_config() -> ExecutorConfig {
    ExecutorConfig {
        pending_scan_interval: Duration::from_millis(5),
        long_run_report_interval: Duration::from_millis(50),
        ..Default::default()
    }
}

/// Executor on a fresh local comm manager
pub fn test_executor(config: ExecutorConfig) -> (Executor, Arc<LocalCommManager>) {
    let comm = Arc::new(LocalCommManager::new());
    let executor = Executor::with_config("CPU", 0, config, comm.clone()).unwrap();
    (executor, comm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config_exists() {
        assert!(
            valid_config_fixture().exists(),
            "Valid config fixture should exist"
        );
    }

    #[test]
    fn test_invalid_config_exists() {
        assert!(
            invalid_config_fixture().exists(),
            "Invalid config fixture should exist"
        );
    }
}
