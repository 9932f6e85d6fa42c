//! Configuration system for the session executor
//!
//! Supports multiple configuration sources with the following precedence (highest to lowest):
//! 1. CLI arguments
//! 2. Environment variables (MSEXEC_* prefix)
//! 3. Configuration file (TOML)
//! 4. Default values

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Executor identity and queue tuning
    pub executor: ExecutorSettings,

    /// Simulated workload driven by `ms-executor run`
    pub workload: WorkloadSettings,

    /// Logging configuration
    pub logging: LoggingSettings,
}

/// Executor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSettings {
    /// Device the executor serves, e.g. "CPU", "GPU", "Ascend"
    pub device_name: String,

    /// Device ordinal
    pub device_id: u32,

    /// Async graph runs allowed in flight before submitters block (0 = unbounded)
    pub max_inflight_async_runs: usize,

    /// Pending list rescan interval while the worker is idle
    pub pending_scan_interval_ms: u64,

    /// Progress report interval for callers blocked on long runs
    pub long_run_report_interval_ms: u64,

    /// Done-list entries kept for inspection (0 = unbounded)
    pub done_tasks_retained: usize,
}

/// Workload driver settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadSettings {
    /// Number of graphs to compile and build
    pub graphs: usize,

    /// Steps per graph; each step runs the whole graph chain once
    pub steps: usize,

    /// Submit runs asynchronously
    pub async_runs: bool,

    /// Simulated device time per run
    pub run_latency_ms: u64,

    /// Ranks in the simulated communication world
    pub world_size: u32,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Log file path (empty = no file logging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Maximum log file size in MB before rotation
    pub max_file_size_mb: u64,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Enable JSON formatted logging
    pub json_format: bool,
}

// ─────────────────────────────────────────────────────────────────
// Default Implementations
// ─────────────────────────────────────────────────────────────────

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            device_name: "CPU".to_string(),
            device_id: 0,
            max_inflight_async_runs: 64,
            pending_scan_interval_ms: 20,
            long_run_report_interval_ms: 60_000,
            done_tasks_retained: 4096,
        }
    }
}

impl Default for WorkloadSettings {
    fn default() -> Self {
        Self {
            graphs: 4,
            steps: 8,
            async_runs: true,
            run_latency_ms: 1,
            world_size: 8,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            max_file_size_mb: 100,
            max_files: 5,
            json_format: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Self::default();

        // 1. Load from config file if it exists
        let config_file = Self::find_config_file(config_path)?;
        if let Some(path) = config_file {
            debug!(path = %path.display(), "Loading configuration file");
            let content = fs::read_to_string(&path).map_err(|e| Error::ConfigNotFound {
                path: path.clone(),
                source: Some(e),
            })?;
            config = Self::parse(&content)?;
            info!(path = %path.display(), "Configuration loaded from file");
        }

        // 2. Apply environment variable overrides
        config.apply_env_overrides();

        // 3. Expand paths
        config.expand_paths();

        // 4. Validate
        config.validate()?;

        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ConfigParse {
            message: e.to_string(),
            source: Some(e),
        })
    }

    /// Find the configuration file to use
    fn find_config_file(explicit_path: Option<&str>) -> Result<Option<PathBuf>> {
        // If explicit path provided, use it (error if not found)
        if let Some(path) = explicit_path {
            let path = PathBuf::from(expand_path(path));
            if path.exists() {
                return Ok(Some(path));
            }
            return Err(Error::config_not_found(path));
        }

        // Search in standard locations
        let search_paths = [
            // Current directory
            PathBuf::from("ms-executor.toml"),
            // User config directory
            dirs::config_dir()
                .map(|p| p.join("ms-executor").join("config.toml"))
                .unwrap_or_default(),
            // Home directory
            dirs::home_dir()
                .map(|p| p.join(".ms-executor").join("config.toml"))
                .unwrap_or_default(),
        ];

        for path in &search_paths {
            if !path.as_os_str().is_empty() && path.exists() {
                debug!(path = %path.display(), "Found configuration file");
                return Ok(Some(path.clone()));
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(None)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // Executor settings
        if let Ok(val) = std::env::var("MSEXEC_DEVICE_NAME") {
            self.executor.device_name = val;
        }
        if let Ok(val) = std::env::var("MSEXEC_DEVICE_ID") {
            if let Ok(n) = val.parse() {
                self.executor.device_id = n;
            }
        }
        if let Ok(val) = std::env::var("MSEXEC_MAX_INFLIGHT_ASYNC_RUNS") {
            if let Ok(n) = val.parse() {
                self.executor.max_inflight_async_runs = n;
            }
        }
        if let Ok(val) = std::env::var("MSEXEC_PENDING_SCAN_INTERVAL_MS") {
            if let Ok(n) = val.parse() {
                self.executor.pending_scan_interval_ms = n;
            }
        }
        if let Ok(val) = std::env::var("MSEXEC_LONG_RUN_REPORT_INTERVAL_MS") {
            if let Ok(n) = val.parse() {
                self.executor.long_run_report_interval_ms = n;
            }
        }
        if let Ok(val) = std::env::var("MSEXEC_DONE_TASKS_RETAINED") {
            if let Ok(n) = val.parse() {
                self.executor.done_tasks_retained = n;
            }
        }

        // Workload settings
        if let Ok(val) = std::env::var("MSEXEC_GRAPHS") {
            if let Ok(n) = val.parse() {
                self.workload.graphs = n;
            }
        }
        if let Ok(val) = std::env::var("MSEXEC_STEPS") {
            if let Ok(n) = val.parse() {
                self.workload.steps = n;
            }
        }

        // Logging settings
        if let Ok(val) = std::env::var("MSEXEC_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("MSEXEC_LOG_FILE") {
            self.logging.file = Some(val);
        }
        if let Ok(val) = std::env::var("MSEXEC_LOG_JSON") {
            self.logging.json_format = val.to_lowercase() == "true" || val == "1";
        }
    }

    /// Expand ~ and other path variables
    fn expand_paths(&mut self) {
        if let Some(ref file) = self.logging.file {
            self.logging.file = Some(expand_path(file));
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.executor.device_name.trim().is_empty() {
            return Err(Error::config_field_invalid(
                "executor.device_name",
                "Device name cannot be empty",
            ));
        }
        if self.executor.pending_scan_interval_ms == 0 {
            return Err(Error::config_field_invalid(
                "executor.pending_scan_interval_ms",
                "pending_scan_interval_ms must be greater than 0",
            ));
        }
        if self.executor.long_run_report_interval_ms == 0 {
            return Err(Error::config_field_invalid(
                "executor.long_run_report_interval_ms",
                "long_run_report_interval_ms must be greater than 0",
            ));
        }
        if self.workload.world_size == 0 {
            return Err(Error::config_field_invalid(
                "workload.world_size",
                "world_size must be greater than 0",
            ));
        }

        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::config_field_invalid(
                "logging.level",
                format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            ));
        }

        Ok(())
    }
}

/// Expand ~ and environment variables in paths
fn expand_path(path: &str) -> String {
    shellexpand::full(path)
        .unwrap_or_else(|_| std::borrow::Cow::Borrowed(path))
        .into_owned()
}

/// Default location for `config init`
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ms-executor")
        .join("config.toml")
}

/// Initialize a new configuration file
pub fn init_config(path: Option<&str>, force: bool) -> Result<PathBuf> {
    let config_path = path
        .map(|p| PathBuf::from(expand_path(p)))
        .unwrap_or_else(default_config_path);

    // Check if file exists
    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Configuration file already exists: {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    // Create parent directories
    if let Some(parent) = config_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| Error::IoWrite {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
    }

    fs::write(&config_path, generate_default_config()).map_err(|e| Error::IoWrite {
        path: config_path.clone(),
        source: e,
    })?;

    Ok(config_path)
}

/// Generate default configuration content with comments
fn generate_default_config() -> String {
    r#"# Session executor configuration

[executor]
# Device the executor serves, e.g. "CPU", "GPU", "Ascend"
device_name = "CPU"

# Device ordinal
device_id = 0

# Asynchronous graph runs allowed in flight before submitters block (0 = unbounded)
max_inflight_async_runs = 64

# How often an idle worker rescans runs waiting on their inputs (milliseconds)
pending_scan_interval_ms = 20

# How often a caller blocked on a long run logs progress (milliseconds)
long_run_report_interval_ms = 60000

# Finished tasks kept for inspection (0 = unbounded)
done_tasks_retained = 4096

[workload]
# Graphs compiled and built by `ms-executor run`
graphs = 4

# Steps per graph
steps = 8

# Submit graph runs asynchronously
async_runs = true

# Simulated device time per run (milliseconds)
run_latency_ms = 1

# Ranks in the simulated communication world
world_size = 8

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log file path (comment out to disable file logging)
# file = "~/.ms-executor/logs/executor.log"

# Maximum log file size in MB before rotation
max_file_size_mb = 100

# Number of rotated log files to keep
max_files = 5

# Enable JSON formatted logging
json_format = false
"#
    .to_string()
}
