//! Up command
//!
//! This module implements the `up` subcommand: provision the network and
//! launch one instance.

use super::{CommandContext, Runnable};
use anyhow::Result;
use clap::Parser;
use vpcup::provision::Provisioner;

/// Arguments for the up command
#[derive(Parser, Debug, Clone, Default)]
pub struct UpArgs {}

impl UpArgs {
    /// Execute the up command
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        ctx.output.heading("UP");

        if let Some(code) = ctx.check_config() {
            return Ok(code);
        }

        // Read before any control-plane call
        let script = match ctx.load_script() {
            Ok(script) => script,
            Err(code) => return Ok(code),
        };
        ctx.output.info(&format!(
            "Bootstrap script {} ({} bytes)",
            script.path().display(),
            script.len()
        ));

        let provider = match ctx.provider().await {
            Ok(provider) => provider,
            Err(e) => return Ok(ctx.fail(&e)),
        };

        let provisioner = Provisioner::new(provider.as_ref(), &ctx.config);

        match provisioner.run(&script).await {
            Ok(report) => {
                ctx.output.steps(&report);
                ctx.output.recap(&report);
                ctx.output.flush();
                Ok(0)
            }
            Err(e) => {
                let code = ctx.fail(&e);
                if e.is_provider() {
                    ctx.output.hint(
                        "Resources created before the failure were kept; run `vpcup up` again to resume",
                    );
                }
                Ok(code)
            }
        }
    }
}

#[async_trait::async_trait]
impl Runnable for UpArgs {
    async fn run(&self, ctx: &mut CommandContext) -> Result<i32> {
        self.execute(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_up_args_parsing() {
        assert!(UpArgs::try_parse_from(["up"]).is_ok());
        assert!(UpArgs::try_parse_from(["up", "extra"]).is_err());
    }
}
