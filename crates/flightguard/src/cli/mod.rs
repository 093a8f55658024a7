//! Command-line interface for the `fgmon` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::logging::Verbosity;

pub use commands::{ClassifyCommand, ConfigCommand, LogCommand, ModelCommand, RunCommand};

/// fgmon - onboard flight-safety monitor
///
/// Fuses accelerometer attitude and acoustic level with a learned risk
/// classifier and streams one status record per sampling cycle on stdout.
#[derive(Debug, Parser)]
#[command(name = "fgmon")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the sampling and inference loops
    Run(RunCommand),

    /// Classify a single attitude
    Classify(ClassifyCommand),

    /// Inspect model files
    #[command(subcommand)]
    Model(ModelCommand),

    /// Read the flight log
    #[command(subcommand)]
    Log(LogCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::Trace,
            }
        }
    }
}
