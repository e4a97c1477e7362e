//! Plan command - read-only run
//!
//! Looks up every resource `up` would touch and reports whether it would be
//! reused or created. Only `Describe*` calls are made.

use super::{CommandContext, Runnable};
use anyhow::Result;
use clap::Parser;
use vpcup::provision::{Provisioner, StepOutcome};

/// Arguments for the plan command
#[derive(Parser, Debug, Clone, Default)]
pub struct PlanArgs {
    /// Also check that the bootstrap script is readable and within limits
    #[arg(long)]
    pub check_script: bool,
}

impl PlanArgs {
    /// Execute the plan command
    pub async fn execute(&self, ctx: &mut CommandContext) -> Result<i32> {
        ctx.output.heading("PLAN");
        ctx.output
            .warning("Plan mode: no resources will be created or modified");

        if let Some(code) = ctx.check_config() {
            return Ok(code);
        }

        if self.check_script {
            match ctx.load_script() {
                Ok(script) => ctx.output.info(&format!(
                    "Bootstrap script {} is valid ({} bytes)",
                    script.path().display(),
                    script.len()
                )),
                Err(code) => return Ok(code),
            }
        }

        let provider = match ctx.provider().await {
            Ok(provider) => provider,
            Err(e) => return Ok(ctx.fail(&e)),
        };

        let report = match Provisioner::new(provider.as_ref(), &ctx.config).plan().await {
            Ok(report) => report,
            Err(e) => return Ok(ctx.fail(&e)),
        };

        ctx.output.steps(&report);

        ctx.output.heading("CHANGES");
        for step in &report.steps {
            let line = match (step.outcome, &step.id) {
                (StepOutcome::Found, Some(id)) => format!("  = {} '{}' ({})", step.kind, step.name, id),
                (StepOutcome::WouldCreate, Some(id)) => {
                    format!("  ~ {} '{}' ({}) will be configured", step.kind, step.name, id)
                }
                (StepOutcome::WouldLaunch, _) => {
                    format!("  + {} '{}' will be launched", step.kind, step.name)
                }
                _ => format!("  + {} '{}' will be created", step.kind, step.name),
            };
            ctx.output.plan(&line);
        }

        ctx.output.recap(&report);
        ctx.output.flush();
        Ok(0)
    }
}

#[async_trait::async_trait]
impl Runnable for PlanArgs {
    async fn run(&self, ctx: &mut CommandContext) -> Result<i32> {
        self.execute(ctx).await
    }
}
