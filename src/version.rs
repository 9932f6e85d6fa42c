//! Build identification
//!
//! `build.rs` stamps the git revision and toolchain into the binary. The
//! report also carries the executor defaults compiled into this build, so a
//! trace can be matched to the queue tuning that produced it.

use std::fmt;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::executor::ExecutorConfig;

/// What `ms-executor version` reports
#[derive(Debug, Clone, Serialize)]
pub struct BuildInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub git_hash: &'static str,
    pub git_dirty: bool,
    pub build_timestamp: &'static str,
    pub target: &'static str,
    pub profile: &'static str,
    pub rustc_version: &'static str,
    pub executor_defaults: ExecutorDefaults,
}

/// Queue tuning used when no configuration overrides it
#[derive(Debug, Clone, Serialize)]
pub struct ExecutorDefaults {
    pub max_inflight_async_runs: usize,
    pub pending_scan_interval_ms: u64,
    pub long_run_report_interval_ms: u64,
    pub done_tasks_retained: usize,
}

impl From<&ExecutorConfig> for ExecutorDefaults {
    fn from(config: &ExecutorConfig) -> Self {
        Self {
            max_inflight_async_runs: config.max_inflight_async_runs,
            pending_scan_interval_ms: config.pending_scan_interval.as_millis() as u64,
            long_run_report_interval_ms: config.long_run_report_interval.as_millis() as u64,
            done_tasks_retained: config.done_tasks_retained,
        }
    }
}

impl BuildInfo {
    /// Version with the revision appended, e.g. "0.1.0-1a2b3c4d" or "0.1.0-1a2b3c4d-dirty"
    pub fn full_version(&self) -> String {
        let mut full = format!("{}-{}", self.version, self.git_hash);
        if self.git_dirty {
            full.push_str("-dirty");
        }
        full
    }
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dirty = if self.git_dirty { " (dirty)" } else { "" };
        let defaults = &self.executor_defaults;

        writeln!(f, "{} {}", self.name, self.full_version())?;
        writeln!(f)?;
        writeln!(f, "Build Information:")?;
        writeln!(f, "  Git Hash:   {}{}", self.git_hash, dirty)?;
        writeln!(f, "  Built:      {} ({})", self.build_timestamp, self.profile)?;
        writeln!(f, "  Target:     {}", self.target)?;
        writeln!(f, "  Compiler:   {}", self.rustc_version)?;
        writeln!(f)?;
        writeln!(f, "Executor Defaults:")?;
        writeln!(f, "  Max in-flight async runs: {}", defaults.max_inflight_async_runs)?;
        writeln!(f, "  Pending scan interval:    {} ms", defaults.pending_scan_interval_ms)?;
        writeln!(f, "  Long-run report interval: {} ms", defaults.long_run_report_interval_ms)?;
        writeln!(f, "  Done tasks retained:      {}", defaults.done_tasks_retained)
    }
}

pub fn build_info() -> BuildInfo {
    BuildInfo {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        git_hash: env!("MSEXEC_GIT_HASH"),
        git_dirty: env!("MSEXEC_GIT_DIRTY") == "true",
        build_timestamp: env!("MSEXEC_BUILD_TIMESTAMP"),
        target: env!("MSEXEC_TARGET"),
        profile: env!("MSEXEC_PROFILE"),
        rustc_version: env!("MSEXEC_RUSTC_VERSION"),
        executor_defaults: ExecutorDefaults::from(&ExecutorConfig::default()),
    }
}

/// Print the build report to stdout, as text or pretty JSON
pub fn print_version(json: bool) -> Result<()> {
    let info = build_info();
    if json {
        let rendered = serde_json::to_string_pretty(&info)
            .map_err(|e| Error::Internal(format!("Failed to serialize build info: {}", e)))?;
        println!("{}", rendered);
    } else {
        print!("{}", info);
    }
    Ok(())
}
