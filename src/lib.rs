//! # vpcup - stand up a public web server in its own VPC
//!
//! vpcup provisions a small, fixed piece of AWS infrastructure: a VPC with
//! one public subnet, an internet gateway, a default route, a security group
//! allowing SSH from one address and HTTP from anywhere, and an EC2 instance
//! that runs a bootstrap script on first boot.
//!
//! Every network resource is identified by its `Name` tag. A run that finds a
//! tagged resource reuses it, so re-running after a failure picks up where
//! the previous run stopped. A reused internet gateway is not re-attached,
//! and each run launches a new instance.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                CLI (vpcup up)                │
//! └──────────────────────────────────────────────┘
//!                        │
//!                        ▼
//! ┌──────────────────────────────────────────────┐
//! │    Provisioner (fixed get-or-create chain)   │
//! │   Locator: tag + type filter -> Option<id>   │
//! └──────────────────────────────────────────────┘
//!                        │
//!                        ▼
//! ┌──────────────────────────────────────────────┐
//! │               Ec2Api (trait)                 │
//! │       AwsEc2 (SDK)   │   InMemoryEc2         │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use vpcup::prelude::*;
//! use vpcup::cloud::memory::InMemoryEc2;
//!
//! # async fn example() -> vpcup::Result<()> {
//! let config = Config::default();
//! let script = BootstrapScript::load(&config.instance.bootstrap_script)?;
//! let ec2 = InMemoryEc2::new(&config.aws.region);
//!
//! let report = Provisioner::new(&ec2, &config).run(&script).await?;
//! println!("instance {:?}", report.id_of(ResourceKind::Instance));
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

// Re-export commonly used items in prelude
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::bootstrap::BootstrapScript;
    pub use crate::cloud::{Ec2Api, ResourceFilter, ResourceKind};
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::provision::{ProvisionReport, Provisioner, StepOutcome, StepReport};
}

/// Error types and result aliases.
pub mod error;

/// Configuration loading, environment overrides and validation.
pub mod config;

/// The startup script handed to the instance as user data.
pub mod bootstrap;

/// The EC2 control-plane seam and its backends.
pub mod cloud;

/// The provisioning sequence, resource locator and run report.
pub mod provision;

pub use error::{Error, Result};
