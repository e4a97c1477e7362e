//! The provisioning sequence.
//!
//! [`Provisioner`] walks a fixed chain of get-or-create steps:
//!
//! 1. VPC (tag plus address block)
//! 2. Subnet inside the VPC
//! 3. Internet gateway, attached to the VPC when created
//! 4. Route table: the VPC's main table gets a default route to the gateway,
//!    is associated with the subnet and tagged
//! 5. Security group with the administrative and web ingress rules
//! 6. One new instance
//!
//! Steps 1-5 reuse any resource already carrying their `Name` tag. Step 6
//! always launches. Every step receives the IDs resolved by the steps before
//! it, so a failure aborts the run and leaves earlier resources in place.

mod locator;
mod report;

pub use locator::Locator;
pub use report::{ProvisionReport, RunMode, StepOutcome, StepReport};

use crate::bootstrap::BootstrapScript;
use crate::cloud::{
    Ec2Api, IngressRule, InstanceRequest, ResourceFilter, ResourceKind, SecurityGroupRequest,
    SubnetRequest, VolumeSpec, VpcRequest, DEFAULT_ROUTE_CIDR,
};
use crate::config::Config;
use crate::error::{Error, Result};
use tracing::{error, info, warn};

/// Logs a failure that aborts the run and hands the error back.
fn log_failure(what: &str, err: Error) -> Error {
    error!(error = %err, "Failed to {}", what);
    err
}

/// Runs the provisioning sequence against one [`Ec2Api`].
pub struct Provisioner<'a, P: Ec2Api + ?Sized> {
    provider: &'a P,
    config: &'a Config,
}

impl<'a, P: Ec2Api + ?Sized> Provisioner<'a, P> {
    pub fn new(provider: &'a P, config: &'a Config) -> Self {
        Self { provider, config }
    }

    fn locator(&self) -> Locator<'a, P> {
        Locator::new(self.provider)
    }

    async fn find(&self, kind: ResourceKind, name: &str) -> Result<Option<String>> {
        let extra = Locator::<P>::identity_filters(kind, self.config);
        self.locator().locate(kind, name, &extra).await
    }

    /// Ingress rules a newly created security group receives.
    pub fn ingress_rules(config: &Config) -> Vec<IngressRule> {
        let firewall = &config.firewall;
        vec![
            IngressRule::tcp(firewall.admin_port, &firewall.admin_cidr)
                .with_description(&firewall.admin_rule_description),
            IngressRule::tcp(firewall.web_port, DEFAULT_ROUTE_CIDR),
        ]
    }

    /// Provision every resource and launch one instance.
    pub async fn run(&self, script: &BootstrapScript) -> Result<ProvisionReport> {
        let mut report = ProvisionReport::new(
            RunMode::Apply,
            self.provider.backend(),
            self.provider.region(),
        );
        info!(
            backend = self.provider.backend(),
            region = self.provider.region(),
            "Starting provisioning"
        );

        let vpc = self.ensure_vpc().await?;
        let vpc_id = vpc.id.clone().unwrap_or_default();
        report.push(vpc);

        let subnet = self.ensure_subnet(&vpc_id).await?;
        let subnet_id = subnet.id.clone().unwrap_or_default();
        report.push(subnet);

        let gateway = self.ensure_internet_gateway(&vpc_id).await?;
        let gateway_id = gateway.id.clone().unwrap_or_default();
        report.push(gateway);

        report.push(
            self.ensure_routing(&vpc_id, &subnet_id, &gateway_id)
                .await?,
        );

        let group = self.ensure_security_group(&vpc_id).await?;
        let group_id = group.id.clone().unwrap_or_default();
        report.push(group);

        let existing = self.count_live_instances().await?;
        report.existing_instances = existing;
        report.push(
            self.launch_instance(&subnet_id, &group_id, script, existing)
                .await?,
        );

        info!(
            changed = report.changed(),
            unchanged = report.unchanged(),
            "Provisioning finished"
        );
        Ok(report)
    }

    /// Resolve every resource without changing anything.
    pub async fn plan(&self) -> Result<ProvisionReport> {
        let mut report = ProvisionReport::new(
            RunMode::Plan,
            self.provider.backend(),
            self.provider.region(),
        );
        let tags = &self.config.tags;

        let vpc_id = self.find(ResourceKind::Vpc, &tags.vpc).await?;
        report.push(plan_step(ResourceKind::Vpc, &tags.vpc, vpc_id.clone()));

        for (kind, name) in [
            (ResourceKind::Subnet, &tags.subnet),
            (ResourceKind::InternetGateway, &tags.internet_gateway),
        ] {
            let id = self.find(kind, name).await?;
            report.push(plan_step(kind, name, id));
        }

        let route_table = match self.find(ResourceKind::RouteTable, &tags.route_table).await? {
            Some(id) => StepReport::found(ResourceKind::RouteTable, &tags.route_table, id),
            None => {
                // The main table would be configured and tagged; report its ID when the VPC exists.
                let main = match &vpc_id {
                    Some(vpc_id) => self.main_route_table(vpc_id).await?,
                    None => None,
                };
                StepReport::new(
                    ResourceKind::RouteTable,
                    &tags.route_table,
                    main,
                    StepOutcome::WouldCreate,
                )
            }
        };
        report.push(route_table);

        let group_id = self
            .find(ResourceKind::SecurityGroup, &tags.security_group)
            .await?;
        report.push(plan_step(
            ResourceKind::SecurityGroup,
            &tags.security_group,
            group_id,
        ));

        let existing = self.count_live_instances().await?;
        report.existing_instances = existing;
        let mut instance = StepReport::new(
            ResourceKind::Instance,
            &tags.instance,
            None,
            StepOutcome::WouldLaunch,
        );
        if existing > 0 {
            instance = instance.with_warning(duplicate_instance_warning(existing, &tags.instance));
        }
        report.push(instance);

        Ok(report)
    }

    async fn ensure_vpc(&self) -> Result<StepReport> {
        let name = &self.config.tags.vpc;
        if let Some(id) = self.find(ResourceKind::Vpc, name).await? {
            return Ok(StepReport::found(ResourceKind::Vpc, name, id));
        }

        let request = VpcRequest {
            cidr_block: self.config.network.vpc_cidr.clone(),
            name: name.clone(),
        };
        let id = self
            .provider
            .create_vpc(&request)
            .await
            .map_err(|e| log_failure("create custom VPC", e))?;

        info!(vpc_id = %id, cidr = %request.cidr_block, "Custom VPC created");
        Ok(StepReport::created(ResourceKind::Vpc, name, id))
    }

    async fn ensure_subnet(&self, vpc_id: &str) -> Result<StepReport> {
        let name = &self.config.tags.subnet;
        if let Some(id) = self.find(ResourceKind::Subnet, name).await? {
            return Ok(StepReport::found(ResourceKind::Subnet, name, id));
        }

        let request = SubnetRequest {
            vpc_id: vpc_id.to_string(),
            cidr_block: self.config.network.subnet_cidr.clone(),
            name: name.clone(),
        };
        let id = self
            .provider
            .create_subnet(&request)
            .await
            .map_err(|e| log_failure("create custom subnet", e))?;

        info!(subnet_id = %id, vpc_id, cidr = %request.cidr_block, "Custom subnet created");
        Ok(StepReport::created(ResourceKind::Subnet, name, id))
    }

    async fn ensure_internet_gateway(&self, vpc_id: &str) -> Result<StepReport> {
        let name = &self.config.tags.internet_gateway;
        if let Some(id) = self.find(ResourceKind::InternetGateway, name).await? {
            return Ok(StepReport::found(ResourceKind::InternetGateway, name, id));
        }

        let id = self
            .provider
            .create_internet_gateway(name)
            .await
            .map_err(|e| log_failure("create internet gateway", e))?;
        info!(gateway_id = %id, "Internet gateway created");

        self.provider
            .attach_internet_gateway(&id, vpc_id)
            .await
            .map_err(|e| log_failure("attach internet gateway", e))?;
        info!(gateway_id = %id, vpc_id, "Internet gateway attached to VPC");

        Ok(StepReport::created(ResourceKind::InternetGateway, name, id))
    }

    async fn main_route_table(&self, vpc_id: &str) -> Result<Option<String>> {
        let filters = [
            ResourceFilter::vpc_id(vpc_id),
            ResourceFilter::main_route_table(),
        ];
        let ids = self
            .provider
            .describe(ResourceKind::RouteTable, &filters)
            .await
            .map_err(|e| log_failure("look up main route table", e))?;
        Ok(ids.into_iter().next())
    }

    async fn ensure_routing(
        &self,
        vpc_id: &str,
        subnet_id: &str,
        gateway_id: &str,
    ) -> Result<StepReport> {
        let name = &self.config.tags.route_table;
        if let Some(id) = self.find(ResourceKind::RouteTable, name).await? {
            return Ok(StepReport::found(ResourceKind::RouteTable, name, id));
        }

        let route_table_id = self.main_route_table(vpc_id).await?.ok_or_else(|| {
            log_failure(
                "find main route table",
                Error::NotFound {
                    kind: ResourceKind::RouteTable.to_string(),
                    detail: format!("no main route table in {}", vpc_id),
                },
            )
        })?;

        let mut step = StepReport::created(ResourceKind::RouteTable, name, route_table_id.clone());

        match self
            .provider
            .create_route(&route_table_id, DEFAULT_ROUTE_CIDR, gateway_id)
            .await
        {
            Ok(()) => info!(
                route_table_id = %route_table_id,
                gateway_id,
                "Default route to internet gateway created"
            ),
            Err(e) => {
                warn!(route_table_id = %route_table_id, error = %e, "Failed to create default route");
                step = step.with_warning(e.to_string());
            }
        }

        match self
            .provider
            .associate_route_table(&route_table_id, subnet_id)
            .await
        {
            Ok(association_id) => info!(
                route_table_id = %route_table_id,
                subnet_id,
                association_id = %association_id,
                "Route table associated with subnet"
            ),
            Err(e) => {
                warn!(route_table_id = %route_table_id, subnet_id, error = %e, "Failed to associate route table");
                step = step.with_warning(e.to_string());
            }
        }

        self.provider
            .tag_resource(&route_table_id, name)
            .await
            .map_err(|e| log_failure("tag route table", e))?;

        Ok(step)
    }

    async fn ensure_security_group(&self, vpc_id: &str) -> Result<StepReport> {
        let name = &self.config.tags.security_group;
        if let Some(id) = self.find(ResourceKind::SecurityGroup, name).await? {
            return Ok(StepReport::found(ResourceKind::SecurityGroup, name, id));
        }

        let firewall = &self.config.firewall;
        let request = SecurityGroupRequest {
            vpc_id: vpc_id.to_string(),
            group_name: firewall.group_name.clone(),
            description: firewall.description.clone(),
            name: name.clone(),
        };
        let id = self
            .provider
            .create_security_group(&request)
            .await
            .map_err(|e| log_failure("create security group", e))?;
        info!(group_id = %id, group_name = %request.group_name, "Security group created");

        let rules = Self::ingress_rules(self.config);
        self.provider
            .authorize_ingress(&id, &rules)
            .await
            .map_err(|e| log_failure("authorize security group ingress", e))?;
        info!(group_id = %id, rules = rules.len(), "Ingress rules added");

        Ok(StepReport::created(ResourceKind::SecurityGroup, name, id))
    }

    async fn count_live_instances(&self) -> Result<usize> {
        let name = &self.config.tags.instance;
        let extra = Locator::<P>::identity_filters(ResourceKind::Instance, self.config);
        let ids = self
            .locator()
            .find_all(ResourceKind::Instance, name, &extra)
            .await?;
        Ok(ids.len())
    }

    async fn launch_instance(
        &self,
        subnet_id: &str,
        group_id: &str,
        script: &BootstrapScript,
        existing: usize,
    ) -> Result<StepReport> {
        let instance = &self.config.instance;
        let tags = &self.config.tags;

        let mut step_warning = None;
        if existing > 0 {
            let message = duplicate_instance_warning(existing, &tags.instance);
            warn!(existing, name = %tags.instance, "{}", message);
            step_warning = Some(message);
        }

        let request = InstanceRequest {
            image_id: instance.image_id.clone(),
            instance_type: instance.instance_type.clone(),
            key_name: instance.key_name.clone(),
            subnet_id: subnet_id.to_string(),
            security_group_ids: vec![group_id.to_string()],
            associate_public_ip: instance.associate_public_ip,
            user_data: script.user_data(),
            volume: VolumeSpec {
                device_name: instance.device_name.clone(),
                size_gib: instance.volume_size_gib,
                volume_type: instance.volume_type.clone(),
                delete_on_termination: instance.delete_volume_on_termination,
                encrypted: instance.encrypt_volume,
                name: tags.volume.clone(),
            },
            name: tags.instance.clone(),
        };

        let id = self
            .provider
            .run_instance(&request)
            .await
            .map_err(|e| log_failure("launch EC2 instance", e))?;
        info!(
            instance_id = %id,
            image_id = %request.image_id,
            instance_type = %request.instance_type,
            "EC2 instance launched"
        );

        let mut step = StepReport::new(
            ResourceKind::Instance,
            &tags.instance,
            Some(id),
            StepOutcome::Launched,
        );
        if let Some(message) = step_warning {
            step = step.with_warning(message);
        }
        Ok(step)
    }
}

fn plan_step(kind: ResourceKind, name: &str, id: Option<String>) -> StepReport {
    match id {
        Some(id) => StepReport::found(kind, name, id),
        None => StepReport::new(kind, name, None, StepOutcome::WouldCreate),
    }
}

fn duplicate_instance_warning(existing: usize, name: &str) -> String {
    format!(
        "{} live instance(s) tagged '{}' already exist; launching another",
        existing, name
    )
}
