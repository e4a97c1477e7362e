//! Configuration module for vpcup
//!
//! Handles loading configuration from the first source that exists:
//! - An explicit path (`--config`)
//! - `VPCUP_CONFIG`
//! - Project configuration (`./vpcup.toml`, `./.vpcup.toml`)
//! - User configuration (`~/.vpcup.toml`, `~/.config/vpcup/config.toml`)
//!
//! Every section is `#[serde(default)]`, so a file only needs the keys it
//! changes. Environment variables are applied on top.

use crate::error::{Error, Result};
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// AWS account settings
    pub aws: AwsConfig,

    /// Address blocks
    pub network: NetworkConfig,

    /// Security group settings
    pub firewall: FirewallConfig,

    /// Instance launch settings
    pub instance: InstanceConfig,

    /// Name tags identifying each resource
    pub tags: TagConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsConfig {
    pub region: String,

    /// Named profile from the shared AWS config files
    pub profile: Option<String>,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            profile: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// VPC address block
    pub vpc_cidr: String,

    /// Public subnet address block, inside `vpc_cidr`
    pub subnet_cidr: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            vpc_cidr: "10.0.0.0/16".to_string(),
            subnet_cidr: "10.0.0.0/24".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirewallConfig {
    pub group_name: String,
    pub description: String,

    /// Single source allowed administrative (SSH) access
    pub admin_cidr: String,
    pub admin_port: i32,
    pub admin_rule_description: String,

    /// Port opened to everyone
    pub web_port: i32,
}

impl Default for FirewallConfig {
    fn default() -> Self {
        Self {
            group_name: "HTTPandSSHAccess".to_string(),
            description: "Security group for SSH and HTTP access".to_string(),
            admin_cidr: "203.0.113.10/32".to_string(),
            admin_port: 22,
            admin_rule_description: "SSH access from my IP address".to_string(),
            web_port: 80,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    /// Amazon Linux 2 AMI (HVM), SSD volume type
    pub image_id: String,
    pub instance_type: String,
    pub key_name: Option<String>,

    /// Script passed as instance user data
    pub bootstrap_script: PathBuf,

    pub associate_public_ip: bool,
    pub device_name: String,
    pub volume_size_gib: i32,
    pub volume_type: String,
    pub delete_volume_on_termination: bool,
    pub encrypt_volume: bool,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            image_id: "ami-033b95fb8079dc481".to_string(),
            instance_type: "t2.micro".to_string(),
            key_name: Some("my-key-pair".to_string()),
            bootstrap_script: PathBuf::from("apache-web-server.sh"),
            associate_public_ip: true,
            device_name: "/dev/xvda".to_string(),
            volume_size_gib: 10,
            volume_type: "gp2".to_string(),
            delete_volume_on_termination: false,
            encrypt_volume: false,
        }
    }
}

/// Values of the `Name` tag for each managed resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagConfig {
    pub vpc: String,
    pub subnet: String,
    pub internet_gateway: String,
    pub route_table: String,
    pub security_group: String,
    pub instance: String,
    pub volume: String,
}

impl Default for TagConfig {
    fn default() -> Self {
        Self::with_prefix("vpcup")
    }
}

impl TagConfig {
    /// Derive every tag from a common prefix.
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            vpc: format!("{}-vpc", prefix),
            subnet: format!("{}-subnet", prefix),
            internet_gateway: format!("{}-internet-gateway", prefix),
            route_table: format!("{}-route-table", prefix),
            security_group: format!("{}-security-group", prefix),
            instance: format!("{}-instance", prefix),
            volume: format!("{}-volume", prefix),
        }
    }

    fn entries(&self) -> [(&'static str, &str); 7] {
        [
            ("tags.vpc", &self.vpc),
            ("tags.subnet", &self.subnet),
            ("tags.internet_gateway", &self.internet_gateway),
            ("tags.route_table", &self.route_table),
            ("tags.security_group", &self.security_group),
            ("tags.instance", &self.instance),
            ("tags.volume", &self.volume),
        ]
    }
}

impl Config {
    /// Load configuration from the first existing source, then apply
    /// environment overrides.
    ///
    /// An explicit path that does not exist is an error; a missing default
    /// location is not.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            Self::from_file(path)?
        } else {
            match Self::get_config_paths().into_iter().find(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => Config::default(),
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Get the list of default configuration file paths, highest priority first
    fn get_config_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Ok(env_config) = std::env::var("VPCUP_CONFIG") {
            paths.push(PathBuf::from(env_config));
        }

        // Project config (current directory)
        paths.push(PathBuf::from("vpcup.toml"));
        paths.push(PathBuf::from(".vpcup.toml"));

        // User config
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".vpcup.toml"));
            paths.push(home.join(".config/vpcup/config.toml"));
        }

        paths
    }

    /// Parse a configuration file; the format follows the extension
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let config = match extension {
            "yml" | "yaml" => serde_yaml::from_str(&content)?,
            "json" => serde_json::from_str(&content)?,
            _ => toml::from_str(&content)?,
        };

        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // Replaces every tag, so it must run first
        if let Some(prefix) = lookup("VPCUP_TAG_PREFIX") {
            self.tags = TagConfig::with_prefix(&prefix);
        }

        if let Some(region) = lookup("VPCUP_REGION") {
            self.aws.region = region;
        }

        if let Some(profile) = lookup("VPCUP_PROFILE") {
            self.aws.profile = Some(profile);
        }

        if let Some(cidr) = lookup("VPCUP_ADMIN_CIDR") {
            self.firewall.admin_cidr = cidr;
        }

        if let Some(image) = lookup("VPCUP_IMAGE_ID") {
            self.instance.image_id = image;
        }

        if let Some(instance_type) = lookup("VPCUP_INSTANCE_TYPE") {
            self.instance.instance_type = instance_type;
        }

        if let Some(key) = lookup("VPCUP_KEY_NAME") {
            self.instance.key_name = if key.is_empty() { None } else { Some(key) };
        }

        if let Some(script) = lookup("VPCUP_BOOTSTRAP_SCRIPT") {
            self.instance.bootstrap_script = PathBuf::from(script);
        }
    }

    /// Check that the configuration describes something EC2 will accept
    pub fn validate(&self) -> Result<()> {
        if self.aws.region.trim().is_empty() {
            return Err(Error::invalid_config("aws.region", "must not be empty"));
        }

        let vpc = parse_block("network.vpc_cidr", &self.network.vpc_cidr)?;
        let subnet = parse_block("network.subnet_cidr", &self.network.subnet_cidr)?;

        // EC2 accepts VPC and subnet blocks between /16 and /28
        for (key, net) in [("network.vpc_cidr", vpc), ("network.subnet_cidr", subnet)] {
            if !(16..=28).contains(&net.prefix_len()) {
                return Err(Error::invalid_config(
                    key,
                    format!("prefix /{} is outside /16../28", net.prefix_len()),
                ));
            }
        }

        if !vpc.contains(&subnet) {
            return Err(Error::invalid_config(
                "network.subnet_cidr",
                format!("{} is not inside the VPC block {}", subnet, vpc),
            ));
        }

        let admin = parse_block("firewall.admin_cidr", &self.firewall.admin_cidr)?;
        if admin.prefix_len() != 32 {
            return Err(Error::invalid_config(
                "firewall.admin_cidr",
                format!("{} must name a single address (/32)", admin),
            ));
        }

        for (key, port) in [
            ("firewall.admin_port", self.firewall.admin_port),
            ("firewall.web_port", self.firewall.web_port),
        ] {
            if !(0..=65535).contains(&port) {
                return Err(Error::invalid_config(key, format!("{} is not a port", port)));
            }
        }

        if self.firewall.group_name.trim().is_empty() {
            return Err(Error::invalid_config("firewall.group_name", "must not be empty"));
        }

        if self.instance.image_id.trim().is_empty() {
            return Err(Error::invalid_config("instance.image_id", "must not be empty"));
        }

        if self.instance.instance_type.trim().is_empty() {
            return Err(Error::invalid_config(
                "instance.instance_type",
                "must not be empty",
            ));
        }

        if !(1..=16384).contains(&self.instance.volume_size_gib) {
            return Err(Error::invalid_config(
                "instance.volume_size_gib",
                format!("{} GiB is outside 1..=16384", self.instance.volume_size_gib),
            ));
        }

        for (key, value) in self.tags.entries() {
            if value.trim().is_empty() {
                return Err(Error::invalid_config(key, "must not be empty"));
            }
        }

        Ok(())
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

fn parse_block(key: &str, value: &str) -> Result<Ipv4Net> {
    value
        .parse::<Ipv4Net>()
        .map_err(|e| Error::invalid_config(key, format!("'{}': {}", value, e)))
}
