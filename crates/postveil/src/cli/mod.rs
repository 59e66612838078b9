//! Command-line interface for postveil.
//!
//! This module provides the CLI structure for the `postveil` binary, which
//! manages the persisted rule document offline: listing, adding, and
//! removing rules, inspecting audit counters, and editing the viewer
//! settings.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{AuditCommand, ConfigCommand, RulesCommand, SettingsCommand};

use crate::logging::Verbosity;

/// postveil - hide timeline posts that match your blocked phrases
///
/// Manages the rule document used by the in-page engine: blocked phrases,
/// their match options, audit counters, and the viewer's own handle.
#[derive(Debug, Parser)]
#[command(name = "postveil")]
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

impl Cli {
    /// The logging verbosity selected by the `-v`/`-q` flags.
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

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage blocked-phrase rules
    #[command(subcommand)]
    Rules(RulesCommand),

    /// Show per-rule hide counts
    Audit(AuditCommand),

    /// Manage viewer settings
    #[command(subcommand)]
    Settings(SettingsCommand),

    /// View configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}
