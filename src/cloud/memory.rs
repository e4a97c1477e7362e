//! In-process EC2 account.
//!
//! [`InMemoryEc2`] keeps every resource it creates in memory and answers
//! `describe` calls by evaluating EC2 filter names against each record. It
//! mirrors the EC2 behaviors the provisioning sequence depends on:
//!
//! - every new VPC gets an untagged main route table
//! - a route to an existing destination fails with `RouteAlreadyExists`
//! - a subnet can be explicitly associated with one route table only
//! - a security group name is unique per VPC
//! - `RunInstances` creates a running instance plus its tagged root volume
//!
//! Any operation can be made to fail with [`InMemoryEc2::fail_on`], and every
//! call is recorded so tests can assert on ordering.

use super::{
    Ec2Api, IngressRule, InstanceRequest, Operation, ResourceFilter, ResourceKind,
    SecurityGroupRequest, SubnetRequest, VpcRequest, NAME_TAG,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

/// A resource as seen through `Describe*` filters.
#[derive(Debug, Clone)]
struct Record {
    id: String,
    kind: ResourceKind,
    tags: HashMap<String, String>,
    /// Filterable attributes, keyed by EC2 filter name
    attrs: HashMap<&'static str, Vec<String>>,
}

impl Record {
    fn new(kind: ResourceKind, id: String, name: Option<&str>) -> Self {
        let mut tags = HashMap::new();
        if let Some(name) = name {
            tags.insert(NAME_TAG.to_string(), name.to_string());
        }
        Self {
            id,
            kind,
            tags,
            attrs: HashMap::new(),
        }
    }

    fn attr(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.attrs.entry(name).or_default().push(value.into());
        self
    }

    fn first_attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .get(name)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    fn matches(&self, filter: &ResourceFilter) -> bool {
        if let Some(key) = filter.tag_key() {
            return self.tags.get(key).is_some_and(|v| filter.matches(v));
        }
        self.attrs
            .get(filter.name.as_str())
            .is_some_and(|values| values.iter().any(|v| filter.matches(v)))
    }
}

/// A route entry in a route table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub route_table_id: String,
    pub destination_cidr: String,
    pub gateway_id: String,
}

/// An explicit route table to subnet association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    pub association_id: String,
    pub route_table_id: String,
    pub subnet_id: String,
}

/// An instance launched through `RunInstances`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchedInstance {
    pub instance_id: String,
    pub volume_id: String,
    pub request: InstanceRequest,
}

#[derive(Debug, Default)]
struct State {
    records: Vec<Record>,
    routes: Vec<Route>,
    associations: Vec<Association>,
    /// gateway id -> vpc id
    attachments: HashMap<String, String>,
    ingress: HashMap<String, Vec<IngressRule>>,
    instances: Vec<LaunchedInstance>,
    calls: Vec<Operation>,
    failures: HashSet<Operation>,
    next_id: u64,
}

impl State {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{:017x}", prefix, self.next_id)
    }

    fn record(&self, kind: ResourceKind, id: &str) -> Option<&Record> {
        self.records.iter().find(|r| r.kind == kind && r.id == id)
    }

    fn require(&self, kind: ResourceKind, id: &str, code: &str) -> Result<&Record> {
        self.record(kind, id)
            .ok_or_else(|| Error::provider(code, format!("The {} ID '{}' does not exist", kind, id)))
    }

    /// Records the call and returns the injected failure, if any.
    fn enter(&mut self, op: Operation) -> Result<()> {
        self.calls.push(op);
        if self.failures.contains(&op) {
            return Err(Error::provider(op.as_str(), "injected failure"));
        }
        Ok(())
    }
}

/// In-memory EC2 control plane.
#[derive(Debug)]
pub struct InMemoryEc2 {
    region: String,
    state: Mutex<State>,
}

impl Default for InMemoryEc2 {
    fn default() -> Self {
        Self::new("us-east-1")
    }
}

impl InMemoryEc2 {
    /// Create an empty account in `region`.
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            state: Mutex::new(State::default()),
        }
    }

    /// Make every future call of `op` fail.
    pub fn fail_on(&self, op: Operation) {
        self.state.lock().failures.insert(op);
    }

    /// Stop injecting failures into `op`.
    pub fn clear_failure(&self, op: Operation) {
        self.state.lock().failures.remove(&op);
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<Operation> {
        self.state.lock().calls.clone()
    }

    /// Calls that changed account state, in order.
    pub fn mutating_calls(&self) -> Vec<Operation> {
        self.calls().into_iter().filter(|op| op.is_mutating()).collect()
    }

    /// IDs of every resource of `kind`, in creation order.
    pub fn ids(&self, kind: ResourceKind) -> Vec<String> {
        self.state
            .lock()
            .records
            .iter()
            .filter(|r| r.kind == kind)
            .map(|r| r.id.clone())
            .collect()
    }

    pub fn count(&self, kind: ResourceKind) -> usize {
        self.ids(kind).len()
    }

    /// The `Name` tag of a resource.
    pub fn name_of(&self, id: &str) -> Option<String> {
        self.state
            .lock()
            .records
            .iter()
            .find(|r| r.id == id)
            .and_then(|r| r.tags.get(NAME_TAG).cloned())
    }

    /// VPC a subnet, route table or security group belongs to.
    pub fn vpc_of(&self, id: &str) -> Option<String> {
        self.state
            .lock()
            .records
            .iter()
            .find(|r| r.id == id)
            .and_then(|r| r.first_attr("vpc-id").map(String::from))
    }

    /// CIDR block of a VPC or subnet.
    pub fn cidr_of(&self, id: &str) -> Option<String> {
        let state = self.state.lock();
        let record = state.records.iter().find(|r| r.id == id)?;
        record
            .first_attr("cidr-block-association.cidr-block")
            .or_else(|| record.first_attr("cidr-block"))
            .map(String::from)
    }

    /// Main route table of a VPC.
    pub fn main_route_table(&self, vpc_id: &str) -> Option<String> {
        self.state
            .lock()
            .records
            .iter()
            .find(|r| {
                r.kind == ResourceKind::RouteTable
                    && r.first_attr("vpc-id") == Some(vpc_id)
                    && r.first_attr("association.main") == Some("true")
            })
            .map(|r| r.id.clone())
    }

    /// VPC a gateway is attached to.
    pub fn attachment(&self, gateway_id: &str) -> Option<String> {
        self.state.lock().attachments.get(gateway_id).cloned()
    }

    pub fn routes(&self, route_table_id: &str) -> Vec<Route> {
        self.state
            .lock()
            .routes
            .iter()
            .filter(|r| r.route_table_id == route_table_id)
            .cloned()
            .collect()
    }

    pub fn associations(&self) -> Vec<Association> {
        self.state.lock().associations.clone()
    }

    pub fn ingress_rules(&self, group_id: &str) -> Vec<IngressRule> {
        self.state
            .lock()
            .ingress
            .get(group_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn instances(&self) -> Vec<LaunchedInstance> {
        self.state.lock().instances.clone()
    }
}

#[async_trait]
impl Ec2Api for InMemoryEc2 {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn region(&self) -> &str {
        &self.region
    }

    async fn describe(
        &self,
        kind: ResourceKind,
        filters: &[ResourceFilter],
    ) -> Result<Vec<String>> {
        let mut state = self.state.lock();
        state.enter(kind.describe_operation())?;

        Ok(state
            .records
            .iter()
            .filter(|r| r.kind == kind && filters.iter().all(|f| r.matches(f)))
            .map(|r| r.id.clone())
            .collect())
    }

    async fn create_vpc(&self, request: &VpcRequest) -> Result<String> {
        let mut state = self.state.lock();
        state.enter(Operation::CreateVpc)?;

        let vpc_id = state.next_id(ResourceKind::Vpc.id_prefix());
        let main_id = state.next_id(ResourceKind::RouteTable.id_prefix());

        state.records.push(
            Record::new(ResourceKind::Vpc, vpc_id.clone(), Some(&request.name))
                .attr("cidr-block-association.cidr-block", &request.cidr_block)
                .attr("state", "available"),
        );
        state.records.push(
            Record::new(ResourceKind::RouteTable, main_id, None)
                .attr("vpc-id", &vpc_id)
                .attr("association.main", "true"),
        );

        Ok(vpc_id)
    }

    async fn create_subnet(&self, request: &SubnetRequest) -> Result<String> {
        let mut state = self.state.lock();
        state.enter(Operation::CreateSubnet)?;
        state.require(ResourceKind::Vpc, &request.vpc_id, "InvalidVpcID.NotFound")?;

        let subnet_id = state.next_id(ResourceKind::Subnet.id_prefix());
        state.records.push(
            Record::new(ResourceKind::Subnet, subnet_id.clone(), Some(&request.name))
                .attr("vpc-id", &request.vpc_id)
                .attr("cidr-block", &request.cidr_block),
        );

        Ok(subnet_id)
    }

    async fn create_internet_gateway(&self, name: &str) -> Result<String> {
        let mut state = self.state.lock();
        state.enter(Operation::CreateInternetGateway)?;

        let gateway_id = state.next_id(ResourceKind::InternetGateway.id_prefix());
        state.records.push(Record::new(
            ResourceKind::InternetGateway,
            gateway_id.clone(),
            Some(name),
        ));

        Ok(gateway_id)
    }

    async fn attach_internet_gateway(&self, gateway_id: &str, vpc_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.enter(Operation::AttachInternetGateway)?;
        state.require(
            ResourceKind::InternetGateway,
            gateway_id,
            "InvalidInternetGatewayID.NotFound",
        )?;
        state.require(ResourceKind::Vpc, vpc_id, "InvalidVpcID.NotFound")?;

        if let Some(existing) = state.attachments.get(gateway_id) {
            return Err(Error::provider(
                "Resource.AlreadyAssociated",
                format!("{} is already attached to {}", gateway_id, existing),
            ));
        }

        state
            .attachments
            .insert(gateway_id.to_string(), vpc_id.to_string());
        if let Some(record) = state.records.iter_mut().find(|r| r.id == gateway_id) {
            record
                .attrs
                .entry("attachment.vpc-id")
                .or_default()
                .push(vpc_id.to_string());
        }

        Ok(())
    }

    async fn create_route(
        &self,
        route_table_id: &str,
        destination_cidr: &str,
        gateway_id: &str,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.enter(Operation::CreateRoute)?;
        state.require(
            ResourceKind::RouteTable,
            route_table_id,
            "InvalidRouteTableID.NotFound",
        )?;

        if state.routes.iter().any(|r| {
            r.route_table_id == route_table_id && r.destination_cidr == destination_cidr
        }) {
            return Err(Error::provider(
                "RouteAlreadyExists",
                format!(
                    "The route identified by {} already exists in {}",
                    destination_cidr, route_table_id
                ),
            ));
        }

        state.routes.push(Route {
            route_table_id: route_table_id.to_string(),
            destination_cidr: destination_cidr.to_string(),
            gateway_id: gateway_id.to_string(),
        });

        Ok(())
    }

    async fn associate_route_table(
        &self,
        route_table_id: &str,
        subnet_id: &str,
    ) -> Result<String> {
        let mut state = self.state.lock();
        state.enter(Operation::AssociateRouteTable)?;
        state.require(
            ResourceKind::RouteTable,
            route_table_id,
            "InvalidRouteTableID.NotFound",
        )?;
        state.require(ResourceKind::Subnet, subnet_id, "InvalidSubnetID.NotFound")?;

        if let Some(existing) = state.associations.iter().find(|a| a.subnet_id == subnet_id) {
            return Err(Error::provider(
                "Resource.AlreadyAssociated",
                format!(
                    "{} is already associated with {}",
                    subnet_id, existing.route_table_id
                ),
            ));
        }

        let association_id = state.next_id("rtbassoc");
        state.associations.push(Association {
            association_id: association_id.clone(),
            route_table_id: route_table_id.to_string(),
            subnet_id: subnet_id.to_string(),
        });

        Ok(association_id)
    }

    async fn tag_resource(&self, resource_id: &str, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.enter(Operation::CreateTags)?;

        let record = state
            .records
            .iter_mut()
            .find(|r| r.id == resource_id)
            .ok_or_else(|| {
                Error::provider(
                    "InvalidID",
                    format!("The ID '{}' is not valid", resource_id),
                )
            })?;
        record.tags.insert(NAME_TAG.to_string(), name.to_string());

        Ok(())
    }

    async fn create_security_group(&self, request: &SecurityGroupRequest) -> Result<String> {
        let mut state = self.state.lock();
        state.enter(Operation::CreateSecurityGroup)?;
        state.require(ResourceKind::Vpc, &request.vpc_id, "InvalidVpcID.NotFound")?;

        let duplicate = state.records.iter().any(|r| {
            r.kind == ResourceKind::SecurityGroup
                && r.first_attr("vpc-id") == Some(request.vpc_id.as_str())
                && r.first_attr("group-name") == Some(request.group_name.as_str())
        });
        if duplicate {
            return Err(Error::provider(
                "InvalidGroup.Duplicate",
                format!(
                    "The security group '{}' already exists for VPC '{}'",
                    request.group_name, request.vpc_id
                ),
            ));
        }

        let group_id = state.next_id(ResourceKind::SecurityGroup.id_prefix());
        state.records.push(
            Record::new(ResourceKind::SecurityGroup, group_id.clone(), Some(&request.name))
                .attr("vpc-id", &request.vpc_id)
                .attr("group-name", &request.group_name)
                .attr("description", &request.description),
        );

        Ok(group_id)
    }

    async fn authorize_ingress(&self, group_id: &str, rules: &[IngressRule]) -> Result<()> {
        let mut state = self.state.lock();
        state.enter(Operation::AuthorizeSecurityGroupIngress)?;
        state.require(ResourceKind::SecurityGroup, group_id, "InvalidGroup.NotFound")?;

        let existing = state.ingress.entry(group_id.to_string()).or_default();
        for rule in rules {
            let duplicate = existing.iter().any(|r| {
                r.protocol == rule.protocol
                    && r.from_port == rule.from_port
                    && r.to_port == rule.to_port
                    && r.cidr_ip == rule.cidr_ip
            });
            if duplicate {
                return Err(Error::provider(
                    "InvalidPermission.Duplicate",
                    format!(
                        "the specified rule \"peer: {}, {}, from port: {}, to port: {}\" already exists",
                        rule.cidr_ip, rule.protocol, rule.from_port, rule.to_port
                    ),
                ));
            }
        }
        existing.extend(rules.iter().cloned());

        Ok(())
    }

    async fn run_instance(&self, request: &InstanceRequest) -> Result<String> {
        let mut state = self.state.lock();
        state.enter(Operation::RunInstances)?;

        let vpc_id = state
            .require(ResourceKind::Subnet, &request.subnet_id, "InvalidSubnetID.NotFound")?
            .first_attr("vpc-id")
            .map(String::from)
            .unwrap_or_default();
        for group in &request.security_group_ids {
            state.require(ResourceKind::SecurityGroup, group, "InvalidGroup.NotFound")?;
        }

        let instance_id = state.next_id(ResourceKind::Instance.id_prefix());
        let volume_id = state.next_id(ResourceKind::Volume.id_prefix());

        state.records.push(
            Record::new(ResourceKind::Instance, instance_id.clone(), Some(&request.name))
                .attr("instance-state-name", "running")
                .attr("subnet-id", &request.subnet_id)
                .attr("vpc-id", vpc_id)
                .attr("image-id", &request.image_id)
                .attr("instance-type", &request.instance_type),
        );
        state.records.push(
            Record::new(ResourceKind::Volume, volume_id.clone(), Some(&request.volume.name))
                .attr("attachment.instance-id", &instance_id)
                .attr("attachment.device", &request.volume.device_name)
                .attr("size", request.volume.size_gib.to_string())
                .attr("volume-type", &request.volume.volume_type),
        );
        state.instances.push(LaunchedInstance {
            instance_id: instance_id.clone(),
            volume_id,
            request: request.clone(),
        });

        Ok(instance_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vpc_request(name: &str) -> VpcRequest {
        VpcRequest {
            cidr_block: "10.0.0.0/16".to_string(),
            name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_vpc_adds_main_route_table() {
        let ec2 = InMemoryEc2::default();
        let vpc_id = ec2.create_vpc(&vpc_request("net")).await.unwrap();

        assert!(vpc_id.starts_with("vpc-"));
        assert_eq!(ec2.name_of(&vpc_id).as_deref(), Some("net"));
        let main = ec2.main_route_table(&vpc_id).unwrap();
        assert_eq!(ec2.name_of(&main), None);

        let found = ec2
            .describe(
                ResourceKind::RouteTable,
                &[
                    ResourceFilter::vpc_id(&vpc_id),
                    ResourceFilter::main_route_table(),
                ],
            )
            .await
            .unwrap();
        assert_eq!(found, vec![main]);
    }

    #[tokio::test]
    async fn test_describe_applies_all_filters() {
        let ec2 = InMemoryEc2::default();
        let vpc_id = ec2.create_vpc(&vpc_request("net")).await.unwrap();

        let by_tag_and_cidr = ec2
            .describe(
                ResourceKind::Vpc,
                &[
                    ResourceFilter::name_tag("net"),
                    ResourceFilter::cidr_block("10.0.0.0/16"),
                ],
            )
            .await
            .unwrap();
        assert_eq!(by_tag_and_cidr, vec![vpc_id]);

        let wrong_cidr = ec2
            .describe(
                ResourceKind::Vpc,
                &[
                    ResourceFilter::name_tag("net"),
                    ResourceFilter::cidr_block("10.1.0.0/16"),
                ],
            )
            .await
            .unwrap();
        assert!(wrong_cidr.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_route_is_rejected() {
        let ec2 = InMemoryEc2::default();
        let vpc_id = ec2.create_vpc(&vpc_request("net")).await.unwrap();
        let rtb = ec2.main_route_table(&vpc_id).unwrap();

        ec2.create_route(&rtb, "0.0.0.0/0", "igw-1").await.unwrap();
        let err = ec2.create_route(&rtb, "0.0.0.0/0", "igw-1").await.unwrap_err();
        assert!(err.to_string().contains("RouteAlreadyExists"));
        assert_eq!(ec2.routes(&rtb).len(), 1);
    }

    #[tokio::test]
    async fn test_injected_failure_is_recorded() {
        let ec2 = InMemoryEc2::default();
        ec2.fail_on(Operation::CreateVpc);

        let err = ec2.create_vpc(&vpc_request("net")).await.unwrap_err();
        assert_eq!(err.to_string(), "CreateVpc failed: injected failure");
        assert_eq!(ec2.calls(), vec![Operation::CreateVpc]);
        assert_eq!(ec2.count(ResourceKind::Vpc), 0);

        ec2.clear_failure(Operation::CreateVpc);
        assert!(ec2.create_vpc(&vpc_request("net")).await.is_ok());
    }

    #[tokio::test]
    async fn test_subnet_requires_existing_vpc() {
        let ec2 = InMemoryEc2::default();
        let err = ec2
            .create_subnet(&SubnetRequest {
                vpc_id: "vpc-missing".to_string(),
                cidr_block: "10.0.0.0/24".to_string(),
                name: "sub".to_string(),
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("InvalidVpcID.NotFound"));
    }

    #[tokio::test]
    async fn test_gateway_attaches_once() {
        let ec2 = InMemoryEc2::default();
        let vpc_id = ec2.create_vpc(&vpc_request("net")).await.unwrap();
        let igw = ec2.create_internet_gateway("gw").await.unwrap();

        ec2.attach_internet_gateway(&igw, &vpc_id).await.unwrap();
        assert_eq!(ec2.attachment(&igw), Some(vpc_id.clone()));
        assert!(ec2.attach_internet_gateway(&igw, &vpc_id).await.is_err());
    }
}
