//! Integration tests for the provisioning sequence
//!
//! These run the full chain against the in-memory EC2 account:
//! - First run creates one of each resource, in dependency order
//! - Re-runs reuse every network resource but launch another instance
//! - Security group rules
//! - Plan mode
//! - Which failures abort the run and which are only logged

mod common;

use common::*;
use pretty_assertions::assert_eq;
use vpcup::cloud::{Operation, ResourceKind};
use vpcup::provision::{Provisioner, RunMode, StepOutcome};

// ============================================================================
// First Run
// ============================================================================

#[tokio::test]
async fn test_first_run_creates_one_of_each() {
    let config = test_config();
    let ec2 = empty_account(&config);

    let report = Provisioner::new(&ec2, &config)
        .run(&web_server_script())
        .await
        .unwrap();

    for kind in [
        ResourceKind::Vpc,
        ResourceKind::Subnet,
        ResourceKind::InternetGateway,
        ResourceKind::SecurityGroup,
        ResourceKind::Instance,
        ResourceKind::Volume,
    ] {
        assert_eq!(ec2.count(kind), 1, "{} count", kind);
    }
    // The VPC's main table is reused, never a new one
    assert_eq!(ec2.count(ResourceKind::RouteTable), 1);
    assert_eq!(ec2.associations().len(), 1);

    let outcomes: Vec<_> = report.steps.iter().map(|s| s.outcome).collect();
    assert_eq!(
        outcomes,
        vec![
            StepOutcome::Created,
            StepOutcome::Created,
            StepOutcome::Created,
            StepOutcome::Created,
            StepOutcome::Created,
            StepOutcome::Launched,
        ]
    );
}

#[tokio::test]
async fn test_calls_follow_dependency_order() {
    let config = test_config();
    let ec2 = empty_account(&config);

    Provisioner::new(&ec2, &config)
        .run(&web_server_script())
        .await
        .unwrap();

    assert_eq!(
        ec2.mutating_calls(),
        vec![
            Operation::CreateVpc,
            Operation::CreateSubnet,
            Operation::CreateInternetGateway,
            Operation::AttachInternetGateway,
            Operation::CreateRoute,
            Operation::AssociateRouteTable,
            Operation::CreateTags,
            Operation::CreateSecurityGroup,
            Operation::AuthorizeSecurityGroupIngress,
            Operation::RunInstances,
        ]
    );
}

#[tokio::test]
async fn test_each_step_references_previous_ids() {
    let config = test_config();
    let ec2 = empty_account(&config);

    let report = Provisioner::new(&ec2, &config)
        .run(&web_server_script())
        .await
        .unwrap();

    let vpc_id = report.id_of(ResourceKind::Vpc).unwrap();
    let subnet_id = report.id_of(ResourceKind::Subnet).unwrap();
    let gateway_id = report.id_of(ResourceKind::InternetGateway).unwrap();
    let route_table_id = report.id_of(ResourceKind::RouteTable).unwrap();
    let group_id = report.id_of(ResourceKind::SecurityGroup).unwrap();

    assert_eq!(ec2.cidr_of(vpc_id).as_deref(), Some("10.0.0.0/16"));
    assert_eq!(ec2.vpc_of(subnet_id).as_deref(), Some(vpc_id));
    assert_eq!(ec2.cidr_of(subnet_id).as_deref(), Some("10.0.0.0/24"));
    assert_eq!(ec2.attachment(gateway_id).as_deref(), Some(vpc_id));

    assert_eq!(ec2.main_route_table(vpc_id).as_deref(), Some(route_table_id));
    let routes = ec2.routes(route_table_id);
    assert_eq!(routes.len(), 1);
    assert_eq!(routes[0].destination_cidr, "0.0.0.0/0");
    assert_eq!(routes[0].gateway_id, gateway_id);

    let association = &ec2.associations()[0];
    assert_eq!(association.route_table_id, route_table_id);
    assert_eq!(association.subnet_id, subnet_id);

    assert_eq!(ec2.vpc_of(group_id).as_deref(), Some(vpc_id));

    let launched = &ec2.instances()[0];
    assert_eq!(launched.request.subnet_id, subnet_id);
    assert_eq!(launched.request.security_group_ids, vec![group_id.to_string()]);
}

#[tokio::test]
async fn test_resources_carry_configured_tags() {
    let config = test_config();
    let ec2 = empty_account(&config);

    let report = Provisioner::new(&ec2, &config)
        .run(&web_server_script())
        .await
        .unwrap();

    for step in &report.steps {
        let id = step.id.as_deref().unwrap();
        assert_eq!(ec2.name_of(id), Some(step.name.clone()), "{}", step.kind);
    }

    let volume_id = &ec2.instances()[0].volume_id;
    assert_eq!(ec2.name_of(volume_id), Some("it-volume".to_string()));
}

#[tokio::test]
async fn test_instance_request_from_config() {
    let config = test_config();
    let ec2 = empty_account(&config);
    let script = web_server_script();

    Provisioner::new(&ec2, &config).run(&script).await.unwrap();

    let request = &ec2.instances()[0].request;
    assert_eq!(request.image_id, "ami-033b95fb8079dc481");
    assert_eq!(request.instance_type, "t2.micro");
    assert_eq!(request.key_name.as_deref(), Some("my-key-pair"));
    assert!(request.associate_public_ip);
    assert_eq!(request.user_data, script.user_data());

    let volume = &request.volume;
    assert_eq!(volume.device_name, "/dev/xvda");
    assert_eq!(volume.size_gib, 10);
    assert_eq!(volume.volume_type, "gp2");
    assert!(!volume.delete_on_termination);
    assert!(!volume.encrypted);
}

// ============================================================================
// Security Group
// ============================================================================

#[tokio::test]
async fn test_security_group_has_exactly_two_rules() {
    let config = test_config();
    let ec2 = empty_account(&config);

    let report = Provisioner::new(&ec2, &config)
        .run(&web_server_script())
        .await
        .unwrap();

    let rules = ec2.ingress_rules(report.id_of(ResourceKind::SecurityGroup).unwrap());
    assert_eq!(rules.len(), 2);

    let ssh = rules.iter().find(|r| r.covers_port(22)).unwrap();
    assert_eq!(ssh.protocol, "tcp");
    assert_eq!(ssh.cidr_ip, config.firewall.admin_cidr);
    assert!(ssh.cidr_ip.ends_with("/32"));
    assert_eq!(
        ssh.description.as_deref(),
        Some("SSH access from my IP address")
    );

    let http = rules.iter().find(|r| r.covers_port(80)).unwrap();
    assert_eq!(http.protocol, "tcp");
    assert!(http.is_open_to_world());
}

// ============================================================================
// Idempotency
// ============================================================================

#[tokio::test]
async fn test_second_run_reuses_network() {
    let config = test_config();
    let ec2 = empty_account(&config);
    let provisioner = Provisioner::new(&ec2, &config);

    let first = provisioner.run(&web_server_script()).await.unwrap();
    let second = provisioner.run(&web_server_script()).await.unwrap();

    for kind in [
        ResourceKind::Vpc,
        ResourceKind::Subnet,
        ResourceKind::InternetGateway,
        ResourceKind::RouteTable,
        ResourceKind::SecurityGroup,
    ] {
        let step = second.step(kind).unwrap();
        assert_eq!(step.outcome, StepOutcome::Found, "{}", kind);
        assert_eq!(step.id.as_deref(), first.id_of(kind), "{}", kind);
        assert_eq!(ec2.count(kind), 1, "{}", kind);
    }

    assert_eq!(ec2.associations().len(), 1);
    assert_eq!(ec2.ingress_rules(first.id_of(ResourceKind::SecurityGroup).unwrap()).len(), 2);
}

#[tokio::test]
async fn test_second_run_launches_another_instance() {
    let config = test_config();
    let ec2 = empty_account(&config);
    let provisioner = Provisioner::new(&ec2, &config);

    let first = provisioner.run(&web_server_script()).await.unwrap();
    let second = provisioner.run(&web_server_script()).await.unwrap();

    assert_eq!(ec2.count(ResourceKind::Instance), 2);
    assert_ne!(
        first.id_of(ResourceKind::Instance),
        second.id_of(ResourceKind::Instance)
    );

    assert_eq!(first.existing_instances, 0);
    assert_eq!(second.existing_instances, 1);
    let step = second.step(ResourceKind::Instance).unwrap();
    assert_eq!(step.outcome, StepOutcome::Launched);
    assert_eq!(step.warnings.len(), 1);
}

#[tokio::test]
async fn test_second_run_makes_only_launch_call() {
    let config = test_config();
    let ec2 = empty_account(&config);
    let provisioner = Provisioner::new(&ec2, &config);

    provisioner.run(&web_server_script()).await.unwrap();
    let before = ec2.mutating_calls().len();
    provisioner.run(&web_server_script()).await.unwrap();

    assert_eq!(
        ec2.mutating_calls()[before..].to_vec(),
        vec![Operation::RunInstances]
    );
}

#[tokio::test]
async fn test_vpc_with_other_block_is_not_reused() {
    let config = test_config();
    let ec2 = empty_account(&config);
    Provisioner::new(&ec2, &config)
        .run(&web_server_script())
        .await
        .unwrap();

    let mut moved = config.clone();
    moved.network.vpc_cidr = "10.8.0.0/16".to_string();
    moved.network.subnet_cidr = "10.8.1.0/24".to_string();
    let report = Provisioner::new(&ec2, &moved).plan().await.unwrap();

    assert_eq!(
        report.step(ResourceKind::Vpc).unwrap().outcome,
        StepOutcome::WouldCreate
    );
    // The subnet is matched by tag alone
    assert_eq!(
        report.step(ResourceKind::Subnet).unwrap().outcome,
        StepOutcome::Found
    );
}

// ============================================================================
// Plan Mode
// ============================================================================

#[tokio::test]
async fn test_plan_makes_no_mutating_calls() {
    let config = test_config();
    let ec2 = empty_account(&config);

    let report = Provisioner::new(&ec2, &config).plan().await.unwrap();

    assert_eq!(report.mode, RunMode::Plan);
    assert!(ec2.mutating_calls().is_empty());
    assert_eq!(report.changed(), 6);
}

#[tokio::test]
async fn test_plan_after_run_reports_reuse() {
    let config = test_config();
    let ec2 = empty_account(&config);
    let provisioner = Provisioner::new(&ec2, &config);

    let applied = provisioner.run(&web_server_script()).await.unwrap();
    let before = ec2.mutating_calls().len();
    let plan = provisioner.plan().await.unwrap();

    assert_eq!(ec2.mutating_calls().len(), before);
    assert_eq!(plan.unchanged(), 5);
    assert_eq!(plan.existing_instances, 1);
    assert_eq!(
        plan.id_of(ResourceKind::RouteTable),
        applied.id_of(ResourceKind::RouteTable)
    );

    let instance = plan.step(ResourceKind::Instance).unwrap();
    assert_eq!(instance.outcome, StepOutcome::WouldLaunch);
    assert_eq!(instance.id, None);
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_route_failure_is_logged_only() {
    let config = test_config();
    let ec2 = empty_account(&config);
    ec2.fail_on(Operation::CreateRoute);

    let report = Provisioner::new(&ec2, &config)
        .run(&web_server_script())
        .await
        .unwrap();

    let step = report.step(ResourceKind::RouteTable).unwrap();
    assert_eq!(step.outcome, StepOutcome::Created);
    assert_eq!(step.warnings, vec!["CreateRoute failed: injected failure".to_string()]);
    assert!(ec2.routes(step.id.as_deref().unwrap()).is_empty());
    assert_eq!(ec2.count(ResourceKind::Instance), 1);
}

#[tokio::test]
async fn test_association_failure_is_logged_only() {
    let config = test_config();
    let ec2 = empty_account(&config);
    ec2.fail_on(Operation::AssociateRouteTable);

    let report = Provisioner::new(&ec2, &config)
        .run(&web_server_script())
        .await
        .unwrap();

    assert!(ec2.associations().is_empty());
    assert_eq!(report.warnings().count(), 1);
    assert_eq!(ec2.count(ResourceKind::Instance), 1);
}

#[tokio::test]
async fn test_failure_aborts_and_keeps_earlier_resources() {
    let config = test_config();
    let ec2 = empty_account(&config);
    ec2.fail_on(Operation::CreateSecurityGroup);

    let err = Provisioner::new(&ec2, &config)
        .run(&web_server_script())
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "CreateSecurityGroup failed: injected failure");
    assert_eq!(err.exit_code(), 2);
    assert_eq!(ec2.count(ResourceKind::Vpc), 1);
    assert_eq!(ec2.count(ResourceKind::Subnet), 1);
    assert_eq!(ec2.count(ResourceKind::InternetGateway), 1);
    assert_eq!(ec2.count(ResourceKind::SecurityGroup), 0);
    assert_eq!(ec2.count(ResourceKind::Instance), 0);
    assert!(!ec2.calls().contains(&Operation::RunInstances));
}

#[tokio::test]
async fn test_rerun_after_failure_resumes() {
    let config = test_config();
    let ec2 = empty_account(&config);
    ec2.fail_on(Operation::RunInstances);

    let provisioner = Provisioner::new(&ec2, &config);
    assert!(provisioner.run(&web_server_script()).await.is_err());

    ec2.clear_failure(Operation::RunInstances);
    let report = provisioner.run(&web_server_script()).await.unwrap();

    assert_eq!(report.changed(), 1);
    assert_eq!(ec2.count(ResourceKind::Vpc), 1);
    assert_eq!(ec2.count(ResourceKind::Instance), 1);
}

#[tokio::test]
async fn test_attach_failure_aborts() {
    let config = test_config();
    let ec2 = empty_account(&config);
    ec2.fail_on(Operation::AttachInternetGateway);

    let err = Provisioner::new(&ec2, &config)
        .run(&web_server_script())
        .await
        .unwrap_err();

    assert!(err.is_provider());
    assert_eq!(ec2.count(ResourceKind::InternetGateway), 1);
    assert!(!ec2.calls().contains(&Operation::CreateRoute));
}

#[tokio::test]
async fn test_rerun_reuses_detached_gateway_without_attaching() {
    let config = test_config();
    let ec2 = empty_account(&config);
    ec2.fail_on(Operation::AttachInternetGateway);

    let provisioner = Provisioner::new(&ec2, &config);
    assert!(provisioner.run(&web_server_script()).await.is_err());

    ec2.clear_failure(Operation::AttachInternetGateway);
    let report = provisioner.run(&web_server_script()).await.unwrap();

    let gateway_id = report.id_of(ResourceKind::InternetGateway).unwrap();
    assert_eq!(ec2.count(ResourceKind::InternetGateway), 1);
    assert_eq!(ec2.attachment(gateway_id), None);
    let attaches = ec2
        .calls()
        .into_iter()
        .filter(|op| *op == Operation::AttachInternetGateway)
        .count();
    assert_eq!(attaches, 1);
}

#[tokio::test]
async fn test_lookup_failure_aborts_before_create() {
    let config = test_config();
    let ec2 = empty_account(&config);
    ec2.fail_on(Operation::DescribeSubnets);

    let err = Provisioner::new(&ec2, &config)
        .run(&web_server_script())
        .await
        .unwrap_err();

    assert!(err.to_string().starts_with("DescribeSubnets failed"));
    assert_eq!(ec2.mutating_calls(), vec![Operation::CreateVpc]);
}
