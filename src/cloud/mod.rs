//! Control-plane abstraction for the EC2 resources vpcup manages.
//!
//! The provisioning sequence talks to the cloud through the [`Ec2Api`] trait.
//! Two backends implement it:
//!
//! - [`aws::AwsEc2`]: the real EC2 API via the official AWS SDK (feature `aws`)
//! - [`memory::InMemoryEc2`]: an in-process account used by tests and the
//!   `--backend memory` simulation
//!
//! Lookups go through a single [`Ec2Api::describe`] call that takes the same
//! filter names the EC2 `Describe*` APIs accept (`tag:Name`, `vpc-id`, ...),
//! so the locator can express "tag plus type-specific filter" uniformly.

#[cfg(feature = "aws")]
pub mod aws;
pub mod memory;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tag key used as the natural key for every managed resource.
pub const NAME_TAG: &str = "Name";

/// Destination block of the default route.
pub const DEFAULT_ROUTE_CIDR: &str = "0.0.0.0/0";

/// Resource types managed by vpcup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Vpc,
    Subnet,
    InternetGateway,
    RouteTable,
    SecurityGroup,
    Instance,
    Volume,
}

impl ResourceKind {
    /// EC2 resource type string, as used in tag specifications.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Vpc => "vpc",
            ResourceKind::Subnet => "subnet",
            ResourceKind::InternetGateway => "internet-gateway",
            ResourceKind::RouteTable => "route-table",
            ResourceKind::SecurityGroup => "security-group",
            ResourceKind::Instance => "instance",
            ResourceKind::Volume => "volume",
        }
    }

    /// Prefix of identifiers assigned to this kind of resource.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            ResourceKind::Vpc => "vpc",
            ResourceKind::Subnet => "subnet",
            ResourceKind::InternetGateway => "igw",
            ResourceKind::RouteTable => "rtb",
            ResourceKind::SecurityGroup => "sg",
            ResourceKind::Instance => "i",
            ResourceKind::Volume => "vol",
        }
    }

    /// The `Describe*` operation that lists this kind.
    pub fn describe_operation(&self) -> Operation {
        match self {
            ResourceKind::Vpc => Operation::DescribeVpcs,
            ResourceKind::Subnet => Operation::DescribeSubnets,
            ResourceKind::InternetGateway => Operation::DescribeInternetGateways,
            ResourceKind::RouteTable => Operation::DescribeRouteTables,
            ResourceKind::SecurityGroup => Operation::DescribeSecurityGroups,
            ResourceKind::Instance => Operation::DescribeInstances,
            ResourceKind::Volume => Operation::DescribeVolumes,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Vpc => "VPC",
            ResourceKind::Subnet => "subnet",
            ResourceKind::InternetGateway => "internet gateway",
            ResourceKind::RouteTable => "route table",
            ResourceKind::SecurityGroup => "security group",
            ResourceKind::Instance => "instance",
            ResourceKind::Volume => "volume",
        };
        f.write_str(name)
    }
}

/// Control-plane operations, named after the EC2 API actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    DescribeVpcs,
    DescribeSubnets,
    DescribeInternetGateways,
    DescribeRouteTables,
    DescribeSecurityGroups,
    DescribeInstances,
    DescribeVolumes,
    CreateVpc,
    CreateSubnet,
    CreateInternetGateway,
    AttachInternetGateway,
    CreateRoute,
    AssociateRouteTable,
    CreateTags,
    CreateSecurityGroup,
    AuthorizeSecurityGroupIngress,
    RunInstances,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::DescribeVpcs => "DescribeVpcs",
            Operation::DescribeSubnets => "DescribeSubnets",
            Operation::DescribeInternetGateways => "DescribeInternetGateways",
            Operation::DescribeRouteTables => "DescribeRouteTables",
            Operation::DescribeSecurityGroups => "DescribeSecurityGroups",
            Operation::DescribeInstances => "DescribeInstances",
            Operation::DescribeVolumes => "DescribeVolumes",
            Operation::CreateVpc => "CreateVpc",
            Operation::CreateSubnet => "CreateSubnet",
            Operation::CreateInternetGateway => "CreateInternetGateway",
            Operation::AttachInternetGateway => "AttachInternetGateway",
            Operation::CreateRoute => "CreateRoute",
            Operation::AssociateRouteTable => "AssociateRouteTable",
            Operation::CreateTags => "CreateTags",
            Operation::CreateSecurityGroup => "CreateSecurityGroup",
            Operation::AuthorizeSecurityGroupIngress => "AuthorizeSecurityGroupIngress",
            Operation::RunInstances => "RunInstances",
        }
    }

    /// Whether the operation changes account state.
    pub fn is_mutating(&self) -> bool {
        !self.as_str().starts_with("Describe")
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A describe filter: a filter name and the values any of which may match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceFilter {
    pub name: String,
    pub values: Vec<String>,
}

impl ResourceFilter {
    pub fn new<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// `tag:Name = value`
    pub fn name_tag(value: impl Into<String>) -> Self {
        Self::new(format!("tag:{}", NAME_TAG), [value.into()])
    }

    pub fn vpc_id(vpc_id: impl Into<String>) -> Self {
        Self::new("vpc-id", [vpc_id.into()])
    }

    pub fn cidr_block(cidr: impl Into<String>) -> Self {
        Self::new("cidr-block-association.cidr-block", [cidr.into()])
    }

    /// Selects the main route table of a VPC.
    pub fn main_route_table() -> Self {
        Self::new("association.main", ["true"])
    }

    /// Instances that have not been terminated.
    pub fn live_instances() -> Self {
        Self::new(
            "instance-state-name",
            ["pending", "running", "stopping", "stopped"],
        )
    }

    /// The tag key this filter selects on, if it is a `tag:<key>` filter.
    pub fn tag_key(&self) -> Option<&str> {
        self.name.strip_prefix("tag:")
    }

    pub fn matches(&self, value: &str) -> bool {
        self.values.iter().any(|v| v == value)
    }
}

/// Parameters for `CreateVpc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VpcRequest {
    pub cidr_block: String,
    pub name: String,
}

/// Parameters for `CreateSubnet`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetRequest {
    pub vpc_id: String,
    pub cidr_block: String,
    pub name: String,
}

/// Parameters for `CreateSecurityGroup`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityGroupRequest {
    pub vpc_id: String,
    pub group_name: String,
    pub description: String,
    pub name: String,
}

/// One inbound allow-rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressRule {
    /// IP protocol: tcp, udp, icmp, -1 (all)
    pub protocol: String,
    pub from_port: i32,
    pub to_port: i32,
    /// Source IPv4 block
    pub cidr_ip: String,
    pub description: Option<String>,
}

impl IngressRule {
    /// Single-port TCP rule from one source block.
    pub fn tcp(port: i32, cidr_ip: impl Into<String>) -> Self {
        Self {
            protocol: "tcp".to_string(),
            from_port: port,
            to_port: port,
            cidr_ip: cidr_ip.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_open_to_world(&self) -> bool {
        self.cidr_ip == DEFAULT_ROUTE_CIDR
    }

    pub fn covers_port(&self, port: i32) -> bool {
        self.from_port <= port && port <= self.to_port
    }
}

/// The root EBS volume attached at launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeSpec {
    pub device_name: String,
    pub size_gib: i32,
    pub volume_type: String,
    pub delete_on_termination: bool,
    pub encrypted: bool,
    pub name: String,
}

/// Parameters for `RunInstances` (always exactly one instance).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRequest {
    pub image_id: String,
    pub instance_type: String,
    pub key_name: Option<String>,
    pub subnet_id: String,
    pub security_group_ids: Vec<String>,
    pub associate_public_ip: bool,
    /// Base64-encoded startup payload
    pub user_data: String,
    pub volume: VolumeSpec,
    pub name: String,
}

/// EC2 control-plane calls used by the provisioning sequence.
///
/// Every call maps to exactly one EC2 API action; implementations do not
/// retry.
#[async_trait]
pub trait Ec2Api: Send + Sync {
    /// Short backend name for logs and reports.
    fn backend(&self) -> &'static str;

    /// Region the backend talks to.
    fn region(&self) -> &str;

    /// IDs of all resources of `kind` matching every filter.
    async fn describe(&self, kind: ResourceKind, filters: &[ResourceFilter])
        -> Result<Vec<String>>;

    async fn create_vpc(&self, request: &VpcRequest) -> Result<String>;

    async fn create_subnet(&self, request: &SubnetRequest) -> Result<String>;

    async fn create_internet_gateway(&self, name: &str) -> Result<String>;

    async fn attach_internet_gateway(&self, gateway_id: &str, vpc_id: &str) -> Result<()>;

    async fn create_route(
        &self,
        route_table_id: &str,
        destination_cidr: &str,
        gateway_id: &str,
    ) -> Result<()>;

    /// Returns the association ID.
    async fn associate_route_table(&self, route_table_id: &str, subnet_id: &str)
        -> Result<String>;

    /// Sets the `Name` tag on an existing resource.
    async fn tag_resource(&self, resource_id: &str, name: &str) -> Result<()>;

    async fn create_security_group(&self, request: &SecurityGroupRequest) -> Result<String>;

    async fn authorize_ingress(&self, group_id: &str, rules: &[IngressRule]) -> Result<()>;

    /// Launches one instance and returns its ID.
    async fn run_instance(&self, request: &InstanceRequest) -> Result<String>;
}
