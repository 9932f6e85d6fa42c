//! CLI argument parsing using clap v4
//!
//! Defines the command-line interface for the session executor.

use clap::{Parser, Subcommand};

/// MindSpore session executor
///
/// Serializes graph compile, build and run requests onto a single worker
/// thread per device. `run` drives a simulated workload through it.
#[derive(Parser, Debug)]
#[command(name = "ms-executor")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Drive a simulated compile/build/run workload through an executor
    Run {
        /// Path to configuration file
        #[arg(short, long, env = "MSEXEC_CONFIG")]
        config: Option<String>,

        /// Number of graphs to compile and build
        #[arg(long)]
        graphs: Option<usize>,

        /// Steps to run over the graph chain
        #[arg(long)]
        steps: Option<usize>,

        /// Submit graph runs asynchronously
        #[arg(long = "async")]
        async_runs: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Display version, build information and executor defaults
    Version {
        /// Print the build report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigSubcommand {
    /// Display the current configuration
    Show {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Initialize a new configuration file
    Init {
        /// Path where to create the config file
        #[arg(short, long)]
        path: Option<String>,

        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        config: Option<String>,
    },
}
