//! AWS EC2 backend.
//!
//! Thin mapping from [`Ec2Api`] onto the official AWS SDK for Rust. Every
//! method issues exactly one API call; errors are converted into
//! [`Error::Provider`] carrying the EC2 action name.
//!
//! ## Authentication
//!
//! AWS credentials are loaded from the standard AWS credential chain:
//!
//! 1. Environment variables (`AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`)
//! 2. AWS credentials file (`~/.aws/credentials`)
//! 3. IAM instance profile (when running on EC2)
//! 4. ECS task role (when running in ECS)

use super::{
    Ec2Api, IngressRule, InstanceRequest, Operation, ResourceFilter, ResourceKind,
    SecurityGroupRequest, SubnetRequest, VolumeSpec, VpcRequest, NAME_TAG,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_ec2::error::DisplayErrorContext;
use aws_sdk_ec2::types::{
    BlockDeviceMapping, EbsBlockDevice, Filter, InstanceNetworkInterfaceSpecification,
    InstanceType, IpPermission, IpRange, ResourceType, Tag, TagSpecification, Tenancy,
    VolumeType,
};
use aws_sdk_ec2::Client;

/// EC2 control plane reached through the AWS SDK.
pub struct AwsEc2 {
    client: Client,
    region: String,
}

impl AwsEc2 {
    /// Create a client for `region`, optionally using a named profile.
    pub async fn connect(region: &str, profile: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_sdk_ec2::config::Region::new(region.to_string()));
        if let Some(profile) = profile {
            loader = loader.profile_name(profile);
        }
        let config = loader.load().await;

        tracing::debug!(region, profile, "Created EC2 client");

        Self {
            client: Client::new(&config),
            region: region.to_string(),
        }
    }
}

fn sdk_error<E>(operation: Operation) -> impl FnOnce(E) -> Error
where
    E: std::error::Error,
{
    move |e| Error::provider(operation.as_str(), DisplayErrorContext(&e))
}

fn sdk_filters(filters: &[ResourceFilter]) -> Vec<Filter> {
    filters
        .iter()
        .map(|f| {
            Filter::builder()
                .name(&f.name)
                .set_values(Some(f.values.clone()))
                .build()
        })
        .collect()
}

fn name_tag_spec(kind: ResourceKind, name: &str) -> TagSpecification {
    TagSpecification::builder()
        .resource_type(ResourceType::from(kind.as_str()))
        .tags(Tag::builder().key(NAME_TAG).value(name).build())
        .build()
}

fn to_ip_permission(rule: &IngressRule) -> IpPermission {
    let mut ip_range = IpRange::builder().cidr_ip(&rule.cidr_ip);
    if let Some(ref desc) = rule.description {
        ip_range = ip_range.description(desc);
    }

    IpPermission::builder()
        .ip_protocol(&rule.protocol)
        .from_port(rule.from_port)
        .to_port(rule.to_port)
        .ip_ranges(ip_range.build())
        .build()
}

fn to_block_device_mapping(volume: &VolumeSpec) -> BlockDeviceMapping {
    let ebs = EbsBlockDevice::builder()
        .volume_size(volume.size_gib)
        .volume_type(VolumeType::from(volume.volume_type.as_str()))
        .delete_on_termination(volume.delete_on_termination)
        .encrypted(volume.encrypted)
        .build();

    BlockDeviceMapping::builder()
        .device_name(&volume.device_name)
        .ebs(ebs)
        .build()
}

fn to_network_interface(request: &InstanceRequest) -> InstanceNetworkInterfaceSpecification {
    let mut builder = InstanceNetworkInterfaceSpecification::builder()
        .device_index(0)
        .subnet_id(&request.subnet_id)
        .associate_public_ip_address(request.associate_public_ip)
        .delete_on_termination(true);

    for group in &request.security_group_ids {
        builder = builder.groups(group);
    }

    builder.build()
}

#[async_trait]
impl Ec2Api for AwsEc2 {
    fn backend(&self) -> &'static str {
        "aws"
    }

    fn region(&self) -> &str {
        &self.region
    }

    async fn describe(
        &self,
        kind: ResourceKind,
        filters: &[ResourceFilter],
    ) -> Result<Vec<String>> {
        let op = kind.describe_operation();
        let filters = Some(sdk_filters(filters));

        let ids = match kind {
            ResourceKind::Vpc => self
                .client
                .describe_vpcs()
                .set_filters(filters)
                .send()
                .await
                .map_err(sdk_error(op))?
                .vpcs()
                .iter()
                .filter_map(|v| v.vpc_id().map(String::from))
                .collect(),
            ResourceKind::Subnet => self
                .client
                .describe_subnets()
                .set_filters(filters)
                .send()
                .await
                .map_err(sdk_error(op))?
                .subnets()
                .iter()
                .filter_map(|s| s.subnet_id().map(String::from))
                .collect(),
            ResourceKind::InternetGateway => self
                .client
                .describe_internet_gateways()
                .set_filters(filters)
                .send()
                .await
                .map_err(sdk_error(op))?
                .internet_gateways()
                .iter()
                .filter_map(|g| g.internet_gateway_id().map(String::from))
                .collect(),
            ResourceKind::RouteTable => self
                .client
                .describe_route_tables()
                .set_filters(filters)
                .send()
                .await
                .map_err(sdk_error(op))?
                .route_tables()
                .iter()
                .filter_map(|r| r.route_table_id().map(String::from))
                .collect(),
            ResourceKind::SecurityGroup => self
                .client
                .describe_security_groups()
                .set_filters(filters)
                .send()
                .await
                .map_err(sdk_error(op))?
                .security_groups()
                .iter()
                .filter_map(|g| g.group_id().map(String::from))
                .collect(),
            ResourceKind::Instance => self
                .client
                .describe_instances()
                .set_filters(filters)
                .send()
                .await
                .map_err(sdk_error(op))?
                .reservations()
                .iter()
                .flat_map(|r| r.instances())
                .filter_map(|i| i.instance_id().map(String::from))
                .collect(),
            ResourceKind::Volume => self
                .client
                .describe_volumes()
                .set_filters(filters)
                .send()
                .await
                .map_err(sdk_error(op))?
                .volumes()
                .iter()
                .filter_map(|v| v.volume_id().map(String::from))
                .collect(),
        };

        Ok(ids)
    }

    async fn create_vpc(&self, request: &VpcRequest) -> Result<String> {
        let op = Operation::CreateVpc;
        let resp = self
            .client
            .create_vpc()
            .cidr_block(&request.cidr_block)
            .instance_tenancy(Tenancy::Default)
            .tag_specifications(name_tag_spec(ResourceKind::Vpc, &request.name))
            .send()
            .await
            .map_err(sdk_error(op))?;

        resp.vpc()
            .and_then(|v| v.vpc_id())
            .map(String::from)
            .ok_or_else(|| Error::missing_field(op.as_str(), "VpcId"))
    }

    async fn create_subnet(&self, request: &SubnetRequest) -> Result<String> {
        let op = Operation::CreateSubnet;
        let resp = self
            .client
            .create_subnet()
            .vpc_id(&request.vpc_id)
            .cidr_block(&request.cidr_block)
            .tag_specifications(name_tag_spec(ResourceKind::Subnet, &request.name))
            .send()
            .await
            .map_err(sdk_error(op))?;

        resp.subnet()
            .and_then(|s| s.subnet_id())
            .map(String::from)
            .ok_or_else(|| Error::missing_field(op.as_str(), "SubnetId"))
    }

    async fn create_internet_gateway(&self, name: &str) -> Result<String> {
        let op = Operation::CreateInternetGateway;
        let resp = self
            .client
            .create_internet_gateway()
            .tag_specifications(name_tag_spec(ResourceKind::InternetGateway, name))
            .send()
            .await
            .map_err(sdk_error(op))?;

        resp.internet_gateway()
            .and_then(|g| g.internet_gateway_id())
            .map(String::from)
            .ok_or_else(|| Error::missing_field(op.as_str(), "InternetGatewayId"))
    }

    async fn attach_internet_gateway(&self, gateway_id: &str, vpc_id: &str) -> Result<()> {
        self.client
            .attach_internet_gateway()
            .internet_gateway_id(gateway_id)
            .vpc_id(vpc_id)
            .send()
            .await
            .map_err(sdk_error(Operation::AttachInternetGateway))?;
        Ok(())
    }

    async fn create_route(
        &self,
        route_table_id: &str,
        destination_cidr: &str,
        gateway_id: &str,
    ) -> Result<()> {
        let op = Operation::CreateRoute;
        let resp = self
            .client
            .create_route()
            .route_table_id(route_table_id)
            .destination_cidr_block(destination_cidr)
            .gateway_id(gateway_id)
            .send()
            .await
            .map_err(sdk_error(op))?;

        if resp.r#return() == Some(false) {
            return Err(Error::provider(op.as_str(), "request was not applied"));
        }
        Ok(())
    }

    async fn associate_route_table(
        &self,
        route_table_id: &str,
        subnet_id: &str,
    ) -> Result<String> {
        let op = Operation::AssociateRouteTable;
        let resp = self
            .client
            .associate_route_table()
            .route_table_id(route_table_id)
            .subnet_id(subnet_id)
            .send()
            .await
            .map_err(sdk_error(op))?;

        resp.association_id()
            .map(String::from)
            .ok_or_else(|| Error::missing_field(op.as_str(), "AssociationId"))
    }

    async fn tag_resource(&self, resource_id: &str, name: &str) -> Result<()> {
        self.client
            .create_tags()
            .resources(resource_id)
            .tags(Tag::builder().key(NAME_TAG).value(name).build())
            .send()
            .await
            .map_err(sdk_error(Operation::CreateTags))?;
        Ok(())
    }

    async fn create_security_group(&self, request: &SecurityGroupRequest) -> Result<String> {
        let op = Operation::CreateSecurityGroup;
        let resp = self
            .client
            .create_security_group()
            .group_name(&request.group_name)
            .description(&request.description)
            .vpc_id(&request.vpc_id)
            .tag_specifications(name_tag_spec(ResourceKind::SecurityGroup, &request.name))
            .send()
            .await
            .map_err(sdk_error(op))?;

        resp.group_id()
            .map(String::from)
            .ok_or_else(|| Error::missing_field(op.as_str(), "GroupId"))
    }

    async fn authorize_ingress(&self, group_id: &str, rules: &[IngressRule]) -> Result<()> {
        let permissions: Vec<IpPermission> = rules.iter().map(to_ip_permission).collect();

        self.client
            .authorize_security_group_ingress()
            .group_id(group_id)
            .set_ip_permissions(Some(permissions))
            .send()
            .await
            .map_err(sdk_error(Operation::AuthorizeSecurityGroupIngress))?;
        Ok(())
    }

    async fn run_instance(&self, request: &InstanceRequest) -> Result<String> {
        let op = Operation::RunInstances;

        let mut run_instances = self
            .client
            .run_instances()
            .image_id(&request.image_id)
            .instance_type(InstanceType::from(request.instance_type.as_str()))
            .min_count(1)
            .max_count(1)
            .user_data(&request.user_data)
            .block_device_mappings(to_block_device_mapping(&request.volume))
            .network_interfaces(to_network_interface(request))
            .tag_specifications(name_tag_spec(ResourceKind::Volume, &request.volume.name))
            .tag_specifications(name_tag_spec(ResourceKind::Instance, &request.name));

        if let Some(ref key_name) = request.key_name {
            run_instances = run_instances.key_name(key_name);
        }

        let resp = run_instances.send().await.map_err(sdk_error(op))?;

        resp.instances()
            .first()
            .and_then(|i| i.instance_id())
            .map(String::from)
            .ok_or_else(|| Error::missing_field(op.as_str(), "InstanceId"))
    }
}
