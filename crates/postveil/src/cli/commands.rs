//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use clap::{Args, Subcommand};

/// Rule management commands.
#[derive(Debug, Subcommand)]
pub enum RulesCommand {
    /// List all rules in evaluation order
    List {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Add a rule, or replace the rule with the same phrase
    Add(AddRuleCommand),

    /// Remove the rule with the given phrase
    Remove {
        /// The phrase of the rule to remove
        phrase: String,
    },
}

/// Arguments for adding a rule.
#[derive(Debug, Args)]
pub struct AddRuleCommand {
    /// The phrase to block (literal substring, or regex with --regex)
    pub phrase: String,

    /// Interpret the phrase as a regular expression
    #[arg(short, long)]
    pub regex: bool,

    /// Replace matched posts with a reveal-on-click overlay instead of
    /// hiding them entirely
    #[arg(short, long)]
    pub overlay: bool,

    /// Also match the phrase against post author handles
    #[arg(short = 'u', long)]
    pub filter_username: bool,
}

/// Audit command arguments.
#[derive(Debug, Args)]
pub struct AuditCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Viewer settings commands.
#[derive(Debug, Subcommand)]
pub enum SettingsCommand {
    /// Show or set the viewer's own handle
    Username(UsernameCommand),
}

/// Arguments for the username setting.
#[derive(Debug, Args)]
pub struct UsernameCommand {
    /// The handle to set; omit to show the current value
    pub handle: Option<String>,

    /// Clear the stored handle
    #[arg(long, conflicts_with = "handle")]
    pub clear: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Print the paths in use
    Path,
}
