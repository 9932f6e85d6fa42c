//! Build script for the session executor
//!
//! Embeds the git revision, build timestamp and target triple so that
//! `ms-executor version` can report which executor build produced a trace.

use std::env;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");

    let git_hash = run_git(&["rev-parse", "--short=8", "HEAD"]);
    let git_dirty = match run_git(&["status", "--porcelain"]).as_str() {
        "unknown" => "unknown",
        "" => "false",
        _ => "true",
    };
    let build_timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();
    let target = env::var("TARGET").unwrap_or_else(|_| "unknown".to_string());
    let profile = env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());
    let rustc_version = Command::new("rustc")
        .arg("--version")
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=MSEXEC_GIT_HASH={}", git_hash);
    println!("cargo:rustc-env=MSEXEC_GIT_DIRTY={}", git_dirty);
    println!("cargo:rustc-env=MSEXEC_BUILD_TIMESTAMP={}", build_timestamp);
    println!("cargo:rustc-env=MSEXEC_TARGET={}", target);
    println!("cargo:rustc-env=MSEXEC_PROFILE={}", profile);
    println!("cargo:rustc-env=MSEXEC_RUSTC_VERSION={}", rustc_version);
}

/// Run a git command, returning trimmed stdout or "unknown" when git is unavailable
fn run_git(args: &[&str]) -> String {
    Command::new("git")
        .args(args)
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
