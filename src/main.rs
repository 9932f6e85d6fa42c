//! ms-executor - session executor command-line driver
//!
//! Loads configuration, initializes logging and drives a simulated workload
//! through an executor.

mod cli;

use clap::Parser;
use tracing::info;

use ms_session_executor::config::{self, AppConfig};
use ms_session_executor::error::{Error, Result};
use ms_session_executor::workload::{self, WorkloadReport};
use ms_session_executor::{logging, version};

use crate::cli::{Cli, Commands, ConfigSubcommand};

fn main() {
    if let Err(e) = run() {
        eprint!("{}", e.format_for_terminal());
        std::process::exit(e.exit_code());
    }
}

fn run() -> Result<()> {
    // Parse CLI arguments first (before logging, so we know verbosity)
    let cli = Cli::parse();

    let (config_path, graphs, steps, async_runs, json) = match cli.command {
        Commands::Version { json } => return version::print_version(json),
        Commands::Config { subcommand } => {
            // Config commands use minimal logging
            logging::init_simple(tracing::Level::WARN)?;
            return handle_config_command(subcommand);
        }
        Commands::Run {
            config,
            graphs,
            steps,
            async_runs,
            json,
        } => (config, graphs, steps, async_runs, json),
    };

    let mut config = AppConfig::load(config_path.as_deref())?;

    // CLI arguments take precedence over file and environment
    if let Some(graphs) = graphs {
        config.workload.graphs = graphs;
    }
    if let Some(steps) = steps {
        config.workload.steps = steps;
    }
    if async_runs {
        config.workload.async_runs = true;
    }

    // The guards must be kept alive for the lifetime of the program
    let _log_guards = logging::init_logging(&config.logging, cli.verbose, cli.quiet)?;

    let build = version::build_info();
    info!(
        version = %build.full_version(),
        target = %build.target,
        profile = %build.profile,
        device = %config.executor.device_name,
        "Starting session executor"
    );

    let report = workload::run_workload(&config)?;
    if json {
        let rendered = serde_json::to_string_pretty(&report)
            .map_err(|e| Error::Internal(format!("Failed to serialize report: {}", e)))?;
        println!("{}", rendered);
    } else if !cli.quiet {
        print_report(&report);
    }

    Ok(())
}

fn print_report(report: &WorkloadReport) {
    let mode = if report.async_runs { "async" } else { "sync" };
    println!("Workload complete on {}", report.device);
    println!("  Graphs:        {:?}", report.graphs);
    println!("  Steps:         {} ({})", report.steps, mode);
    println!("  Runs:          {}", report.runs_submitted);
    println!("  Comm group:    created={} destroyed={}", report.comm_group_created, report.comm_group_destroyed);
    println!("  Tasks:         completed={} failed={} skipped={}", report.stats.completed, report.stats.failed, report.stats.skipped);
    if let Some(last) = report.step_outputs.last() {
        println!("  Final output:  {}", last);
    }
    println!("  Elapsed:       {} ms", report.elapsed_ms);
}

/// Handle configuration subcommands
fn handle_config_command(subcommand: ConfigSubcommand) -> Result<()> {
    match subcommand {
        ConfigSubcommand::Show { config } => {
            let cfg = AppConfig::load(config.as_deref())?;
            println!("{}", toml::to_string_pretty(&cfg)?);
        }
        ConfigSubcommand::Init { path, force } => {
            let created = config::init_config(path.as_deref(), force)?;
            println!("Configuration file created: {}", created.display());
        }
        ConfigSubcommand::Validate { config } => {
            AppConfig::load(config.as_deref())?;
            println!("Configuration is valid.");
        }
    }

    Ok(())
}
