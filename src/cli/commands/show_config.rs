//! Show-config command
//!
//! Prints the configuration `up` would use, after file, environment and
//! command-line overrides.

use super::{CommandContext, Runnable};
use anyhow::Result;
use clap::Parser;

/// Arguments for the show-config command
#[derive(Parser, Debug, Clone, Default)]
pub struct ShowConfigArgs {
    /// Exit non-zero if the configuration does not validate
    #[arg(long)]
    pub validate: bool,
}

impl ShowConfigArgs {
    /// Execute the show-config command
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        if self.validate {
            if let Some(code) = ctx.check_config() {
                return Ok(code);
            }
        }

        if ctx.output.is_json() {
            println!("{}", serde_json::to_string_pretty(&ctx.config)?);
            return Ok(0);
        }

        print!("{}", ctx.config.to_toml()?);
        ctx.output.flush();
        Ok(0)
    }
}

#[async_trait::async_trait]
impl Runnable for ShowConfigArgs {
    async fn run(&self, ctx: &mut CommandContext) -> Result<i32> {
        self.execute(ctx).await
    }
}
