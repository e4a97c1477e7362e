//! CLI module for vpcup
//!
//! This module provides the command-line interface for vpcup,
//! including argument parsing and subcommand handling.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// vpcup - stand up a public web server in its own VPC
///
/// Creates (or reuses, by Name tag) a VPC, subnet, internet gateway,
/// route table and security group, then launches one EC2 instance.
#[derive(Parser, Debug, Clone)]
#[command(name = "vpcup")]
#[command(author = "vpcup Contributors")]
#[command(version)]
#[command(about = "Provision a VPC and a bootstrapped EC2 web server", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short = 'c', long, global = true, env = "VPCUP_CONFIG")]
    pub config: Option<PathBuf>,

    /// AWS region (overrides configuration)
    #[arg(long, global = true)]
    pub region: Option<String>,

    /// Bootstrap script passed as instance user data (overrides configuration)
    #[arg(long, global = true)]
    pub bootstrap_script: Option<PathBuf>,

    /// Control-plane backend
    #[arg(long, global = true, value_enum, default_value = "aws")]
    pub backend: Backend,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "human")]
    pub output: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output with colors
    #[default]
    Human,
    /// JSON report for scripting
    Json,
}

/// Where control-plane calls go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Backend {
    /// The real EC2 API, credentials from the standard AWS chain
    #[default]
    Aws,
    /// A fresh in-process account; nothing leaves the machine
    Memory,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Provision the network and launch an instance
    Up(commands::up::UpArgs),

    /// Show what `up` would reuse or create, without changing anything
    Plan(commands::plan::PlanArgs),

    /// Print the effective configuration as TOML
    #[command(name = "show-config")]
    ShowConfig(commands::show_config::ShowConfigArgs),
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Get the effective verbosity level (0-3)
    pub fn verbosity(&self) -> u8 {
        self.verbose.min(3)
    }

    /// Check if JSON output is requested
    pub fn is_json(&self) -> bool {
        matches!(self.output, OutputFormat::Json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["vpcup", "up"]).unwrap();
        assert!(matches!(cli.command, Commands::Up(_)));
        assert_eq!(cli.backend, Backend::Aws);
        assert_eq!(cli.output, OutputFormat::Human);
    }

    #[test]
    fn test_verbosity() {
        let cli = Cli::try_parse_from(["vpcup", "-vvvv", "plan"]).unwrap();
        assert_eq!(cli.verbosity(), 3);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "vpcup",
            "up",
            "--region",
            "eu-west-1",
            "--backend",
            "memory",
            "--output",
            "json",
            "--bootstrap-script",
            "boot.sh",
        ])
        .unwrap();
        assert_eq!(cli.region.as_deref(), Some("eu-west-1"));
        assert_eq!(cli.backend, Backend::Memory);
        assert!(cli.is_json());
        assert_eq!(cli.bootstrap_script, Some(PathBuf::from("boot.sh")));
    }

    #[test]
    fn test_show_config_name() {
        let cli = Cli::try_parse_from(["vpcup", "show-config"]).unwrap();
        assert!(matches!(cli.command, Commands::ShowConfig(_)));
    }
}
