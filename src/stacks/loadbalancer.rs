//! Public TLS balancer with path routing, internal balancer, target groups.

use serde_json::json;

use super::network::Vpc;
use super::service::ServiceKind;
use super::{Built, Error};
use crate::stack::{Handle, Stack};
use crate::template::{fns, Resource};

pub const NAME: &str = "LoadBalancerStack";

const TLS_POLICY: &str = "ELBSecurityPolicy-TLS13-1-2-2021-06";
const HEALTH_CHECK_INTERVAL_SECS: u32 = 30;
const CATCH_ALL: &str = "/*";

/// Path rule on the public HTTPS listener. Lower priority is evaluated first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerRule {
    pub priority: u16,
    pub path_pattern: &'static str,
    pub target: ServiceKind,
}

impl ListenerRule {
    fn logical_id(&self) -> String {
        format!("PublicALBHttpsListener{}Rule", self.target.id())
    }
}

pub const PUBLIC_RULES: [ListenerRule; 2] = [
    ListenerRule {
        priority: 10,
        path_pattern: "/socket.io/*",
        target: ServiceKind::Realtime,
    },
    ListenerRule {
        priority: 20,
        path_pattern: CATCH_ALL,
        target: ServiceKind::Frontend,
    },
];

/// Returns the rules in evaluation order. Priorities must be unique and no
/// rule may sit behind the catch-all, which would shadow it.
pub fn evaluation_order(rules: &[ListenerRule]) -> Result<Vec<ListenerRule>, Error> {
    let mut ordered = rules.to_vec();
    ordered.sort_by_key(|rule| rule.priority);

    for pair in ordered.windows(2) {
        if pair[0].priority == pair[1].priority {
            return Err(Error::DuplicateRulePriority(pair[0].priority));
        }
    }

    if let Some(catch_all) = ordered.iter().position(|rule| rule.path_pattern == CATCH_ALL) {
        if let Some(shadowed) = ordered.get(catch_all + 1) {
            return Err(Error::ShadowedRule {
                catch_all: ordered[catch_all].priority,
                pattern: shadowed.path_pattern.to_string(),
                priority: shadowed.priority,
            });
        }
    }

    Ok(ordered)
}

#[derive(Debug, Clone)]
pub struct TargetGroup {
    pub arn: Handle,
    pub port: u16,
    pub health_check_path: &'static str,
}

pub struct LoadBalancerProps<'a> {
    pub vpc: &'a Vpc,
    pub public_group: &'a Handle,
    pub backend_group: &'a Handle,
    pub certificate_arn: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct LoadBalancerOutputs {
    pub public_load_balancer: Handle,
    pub https_listener: Handle,
    pub internal_load_balancer: Handle,
    pub internal_dns_name: Handle,
    pub internal_listener: Handle,
    pub frontend: TargetGroup,
    pub realtime: TargetGroup,
    pub backend: TargetGroup,
    pub rules: Vec<ListenerRule>,
}

impl LoadBalancerOutputs {
    pub fn target_group(&self, kind: ServiceKind) -> &TargetGroup {
        match kind {
            ServiceKind::Frontend => &self.frontend,
            ServiceKind::Realtime => &self.realtime,
            ServiceKind::Backend => &self.backend,
        }
    }
}

pub fn build(props: LoadBalancerProps) -> Result<Built<LoadBalancerOutputs>, Error> {
    let certificate_arn = props.certificate_arn.ok_or(Error::MissingCertificate)?;
    let rules = evaluation_order(&PUBLIC_RULES)?;

    let mut stack = Stack::new(NAME, "Public and internal application load balancers");
    let vpc_id = stack.resolve(&props.vpc.vpc_id);
    let public_subnets = stack.resolve_all(&props.vpc.public_subnets);
    let egress_subnets = stack.resolve_all(&props.vpc.egress_subnets);
    let public_group = stack.resolve(props.public_group);
    let backend_group = stack.resolve(props.backend_group);

    stack.add(
        "PublicALB",
        Resource::new(
            "AWS::ElasticLoadBalancingV2::LoadBalancer",
            json!({
                "Type": "application",
                "Scheme": "internet-facing",
                "Subnets": public_subnets,
                "SecurityGroups": [public_group],
                "LoadBalancerAttributes": [
                    { "Key": "deletion_protection.enabled", "Value": "false" },
                    { "Key": "routing.http2.enabled", "Value": "true" },
                ],
            }),
        ),
    )?;

    stack.add(
        "PublicALBRedirect80To443",
        Resource::new(
            "AWS::ElasticLoadBalancingV2::Listener",
            json!({
                "LoadBalancerArn": fns::reference("PublicALB"),
                "Port": 80,
                "Protocol": "HTTP",
                "DefaultActions": [{
                    "Type": "redirect",
                    "RedirectConfig": {
                        "Protocol": "HTTPS",
                        "Port": "443",
                        "StatusCode": "HTTP_301",
                    },
                }],
            }),
        ),
    )?;

    stack.add(
        "PublicALBHttpsListener",
        Resource::new(
            "AWS::ElasticLoadBalancingV2::Listener",
            json!({
                "LoadBalancerArn": fns::reference("PublicALB"),
                "Port": 443,
                "Protocol": "HTTPS",
                "Certificates": [{ "CertificateArn": certificate_arn }],
                "SslPolicy": TLS_POLICY,
                "DefaultActions": [{
                    "Type": "fixed-response",
                    "FixedResponseConfig": {
                        "StatusCode": "200",
                        "ContentType": "text/plain",
                        "MessageBody": "ALB is ready",
                    },
                }],
            }),
        ),
    )?;

    stack.add(
        "BackendALB",
        Resource::new(
            "AWS::ElasticLoadBalancingV2::LoadBalancer",
            json!({
                "Type": "application",
                "Scheme": "internal",
                "Subnets": egress_subnets,
                "SecurityGroups": [backend_group],
                "LoadBalancerAttributes": [
                    { "Key": "deletion_protection.enabled", "Value": "false" },
                ],
            }),
        ),
    )?;

    for kind in ServiceKind::ALL {
        stack.add(
            kind.target_group_id(),
            Resource::new(
                "AWS::ElasticLoadBalancingV2::TargetGroup",
                json!({
                    "Port": kind.port(),
                    "Protocol": "HTTP",
                    "TargetType": "ip",
                    "VpcId": vpc_id,
                    "HealthCheckPath": kind.health_check_path(),
                    "HealthCheckIntervalSeconds": HEALTH_CHECK_INTERVAL_SECS,
                }),
            ),
        )?;
    }

    stack.add(
        "BackendALBBackendListener",
        Resource::new(
            "AWS::ElasticLoadBalancingV2::Listener",
            json!({
                "LoadBalancerArn": fns::reference("BackendALB"),
                "Port": ServiceKind::Backend.port(),
                "Protocol": "HTTP",
                "DefaultActions": [{
                    "Type": "forward",
                    "TargetGroupArn": fns::reference(ServiceKind::Backend.target_group_id()),
                }],
            }),
        ),
    )?;

    for rule in &rules {
        stack.add(
            &rule.logical_id(),
            Resource::new(
                "AWS::ElasticLoadBalancingV2::ListenerRule",
                json!({
                    "ListenerArn": fns::reference("PublicALBHttpsListener"),
                    "Priority": rule.priority,
                    "Conditions": [{
                        "Field": "path-pattern",
                        "PathPatternConfig": { "Values": [rule.path_pattern] },
                    }],
                    "Actions": [{
                        "Type": "forward",
                        "TargetGroupArn": fns::reference(rule.target.target_group_id()),
                    }],
                }),
            ),
        )?;
    }

    let outputs = LoadBalancerOutputs {
        public_load_balancer: stack.export("PublicALB")?,
        https_listener: stack.export("PublicALBHttpsListener")?,
        internal_load_balancer: stack.export("BackendALB")?,
        internal_dns_name: stack.export_attribute("BackendALB", "DNSName")?,
        internal_listener: stack.export("BackendALBBackendListener")?,
        frontend: export_target_group(&mut stack, ServiceKind::Frontend)?,
        realtime: export_target_group(&mut stack, ServiceKind::Realtime)?,
        backend: export_target_group(&mut stack, ServiceKind::Backend)?,
        rules,
    };
    stack.add_output(
        "PublicLoadBalancerDns",
        "Public DNS name of the internet-facing load balancer",
        fns::get_att("PublicALB", "DNSName"),
    )?;

    Ok(Built { stack, outputs })
}

fn export_target_group(stack: &mut Stack, kind: ServiceKind) -> Result<TargetGroup, Error> {
    Ok(TargetGroup {
        arn: stack.export(kind.target_group_id())?,
        port: kind.port(),
        health_check_path: kind.health_check_path(),
    })
}
