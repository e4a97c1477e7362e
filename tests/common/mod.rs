//! Shared test utilities and fixtures for the vpcup test suite.
//!
//! # Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::*;
//! ```

#![allow(dead_code)]

use std::path::PathBuf;

use tempfile::TempDir;
use vpcup::bootstrap::BootstrapScript;
use vpcup::cloud::memory::InMemoryEc2;
use vpcup::config::Config;

/// The web server bootstrap script used across tests.
pub const WEB_SERVER_SCRIPT: &str = "#!/bin/bash
yum update -y
yum install -y httpd
systemctl start httpd
systemctl enable httpd
echo \"<h1>Hello from $(hostname -f)</h1>\" > /var/www/html/index.html
";

/// Default configuration with a test-only tag prefix.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.tags = vpcup::config::TagConfig::with_prefix("it");
    config
}

/// An empty account in the configured region.
pub fn empty_account(config: &Config) -> InMemoryEc2 {
    InMemoryEc2::new(&config.aws.region)
}

pub fn web_server_script() -> BootstrapScript {
    BootstrapScript::from_content("apache-web-server.sh", WEB_SERVER_SCRIPT)
        .expect("fixture script is valid")
}

/// A scratch directory holding a bootstrap script.
pub struct ScriptDir {
    pub dir: TempDir,
    pub script: PathBuf,
}

impl ScriptDir {
    pub fn new() -> Self {
        Self::with_content(WEB_SERVER_SCRIPT)
    }

    pub fn with_content(content: &str) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let script = dir.path().join("apache-web-server.sh");
        std::fs::write(&script, content).expect("write script");
        Self { dir, script }
    }

    /// Write a config file next to the script and return its path.
    pub fn write_config(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, content).expect("write config");
        path
    }
}

impl Default for ScriptDir {
    fn default() -> Self {
        Self::new()
    }
}
