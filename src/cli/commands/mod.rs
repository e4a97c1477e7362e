//! Subcommands module for vpcup CLI
//!
//! This module contains all the subcommand implementations.

pub mod plan;
pub mod show_config;
pub mod up;

use crate::cli::output::OutputFormatter;
use crate::cli::{Backend, Cli};
use anyhow::Result;
use vpcup::bootstrap::BootstrapScript;
use vpcup::cloud::memory::InMemoryEc2;
use vpcup::cloud::Ec2Api;
use vpcup::config::Config;

/// Common context shared between commands
pub struct CommandContext {
    /// Effective configuration, CLI overrides applied
    pub config: Config,
    /// Output formatter
    pub output: OutputFormatter,
    /// Control-plane backend
    pub backend: Backend,
}

impl CommandContext {
    /// Create a new command context from CLI arguments
    pub fn new(cli: &Cli, mut config: Config) -> Self {
        let output = OutputFormatter::new(!cli.no_color, cli.is_json(), cli.verbosity());

        if let Some(region) = &cli.region {
            config.aws.region = region.clone();
        }
        if let Some(script) = &cli.bootstrap_script {
            config.instance.bootstrap_script = script.clone();
        }

        Self {
            config,
            output,
            backend: cli.backend,
        }
    }

    /// Build the control-plane client for the selected backend
    pub async fn provider(&self) -> vpcup::Result<Box<dyn Ec2Api>> {
        let region = self.config.aws.region.as_str();
        match self.backend {
            Backend::Memory => {
                self.output
                    .debug(&format!("Using in-memory backend in {}", region));
                Ok(Box::new(InMemoryEc2::new(region)))
            }
            #[cfg(feature = "aws")]
            Backend::Aws => {
                self.output.debug(&format!("Connecting to EC2 in {}", region));
                let client = vpcup::cloud::aws::AwsEc2::connect(
                    region,
                    self.config.aws.profile.as_deref(),
                )
                .await;
                Ok(Box::new(client))
            }
            #[cfg(not(feature = "aws"))]
            Backend::Aws => Err(vpcup::Error::BackendUnavailable("aws".to_string())),
        }
    }

    /// Validate the configuration, reporting the failure if any
    pub fn check_config(&self) -> Option<i32> {
        match self.config.validate() {
            Ok(()) => None,
            Err(e) => Some(self.fail(&e)),
        }
    }

    /// Read the bootstrap script named by the configuration
    pub fn load_script(&self) -> std::result::Result<BootstrapScript, i32> {
        let path = &self.config.instance.bootstrap_script;
        self.output
            .debug(&format!("Reading bootstrap script {}", path.display()));
        BootstrapScript::load(path).map_err(|e| self.fail(&e))
    }

    /// Report a library error and return its exit code
    pub fn fail(&self, err: &vpcup::Error) -> i32 {
        self.output.error(&err.to_string());
        err.exit_code()
    }
}

/// Trait for runnable commands
#[async_trait::async_trait]
pub trait Runnable {
    /// Execute the command
    async fn run(&self, ctx: &mut CommandContext) -> Result<i32>;
}
