//! VPC, subnets, NAT instances, and every security group with its rules.

use serde_json::{json, Value};
use tracing::debug;

use super::{Built, Error};
use crate::config::ImageQuery;
use crate::context::LookupContext;
use crate::net::{Ipv4Cidr, Port, SubnetAllocator, SubnetType};
use crate::stack::{Handle, Stack};
use crate::template::{fns, name_tag, Resource};

pub const NAME: &str = "NetworkStack";

const NAT_INSTANCE_TYPE: &str = "t4g.nano";

struct SubnetGroup {
    name: &'static str,
    subnet_type: SubnetType,
    cidr_mask: u8,
}

const SUBNET_GROUPS: [SubnetGroup; 3] = [
    SubnetGroup {
        name: "Frontend",
        subnet_type: SubnetType::Public,
        cidr_mask: 24,
    },
    SubnetGroup {
        name: "Backend",
        subnet_type: SubnetType::PrivateWithEgress,
        cidr_mask: 20,
    },
    SubnetGroup {
        name: "Other",
        subnet_type: SubnetType::PrivateIsolated,
        cidr_mask: 20,
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Group {
    PublicLoadBalancer,
    BackendLoadBalancer,
    FrontendService,
    RealtimeService,
    BackendService,
    CommonService,
    Database,
    Cache,
    FileSystem,
    Nat,
}

impl Group {
    pub const ALL: [Group; 10] = [
        Group::Nat,
        Group::PublicLoadBalancer,
        Group::BackendLoadBalancer,
        Group::FrontendService,
        Group::RealtimeService,
        Group::BackendService,
        Group::CommonService,
        Group::Database,
        Group::Cache,
        Group::FileSystem,
    ];

    pub fn logical_id(self) -> &'static str {
        match self {
            Group::PublicLoadBalancer => "PublicLoadBalancerSecurityGroup",
            Group::BackendLoadBalancer => "BackendLoadBalancerSecurityGroup",
            Group::FrontendService => "FrontendServiceSecurityGroup",
            Group::RealtimeService => "SocketIoServiceSecurityGroup",
            Group::BackendService => "BackendServiceSecurityGroup",
            Group::CommonService => "CommonServiceSecurityGroup",
            Group::Database => "DatabaseSecurityGroup",
            Group::Cache => "RedisSecurityGroup",
            Group::FileSystem => "EFSSecurityGroup",
            Group::Nat => "NatSecurityGroup",
        }
    }

    fn group_name(self) -> Option<&'static str> {
        match self {
            Group::PublicLoadBalancer => Some("LoadBalancerSecurityGroup"),
            Group::Nat => None,
            other => Some(other.logical_id()),
        }
    }

    fn description(self) -> &'static str {
        match self {
            Group::PublicLoadBalancer => "Allow http and https IPv4/IPv6 from anywhere",
            Group::BackendLoadBalancer => "Allow http 8000 from Frontend",
            Group::FrontendService => "Backend ALB (8000 TCP) to Frontend (8080 TCP) to Public ALB",
            Group::RealtimeService => "Allow 9000 TCP from Public ALB",
            Group::BackendService => "Backend to Internal ALB",
            Group::CommonService => "Common service security group to access Redis, EFS, DB",
            Group::Database => "Allow MySQL from Common Service",
            Group::Cache => "Allow Redis from Common Service",
            Group::FileSystem => "Allow EFS from Common Service",
            Group::Nat => "Security group for NAT instance",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    AnyIpv4,
    AnyIpv6,
    Cidr(Ipv4Cidr),
    Group(Group),
}

impl Source {
    pub fn is_unrestricted(&self) -> bool {
        match self {
            Source::AnyIpv4 | Source::AnyIpv6 => true,
            Source::Cidr(cidr) => cidr.is_any(),
            Source::Group(_) => false,
        }
    }

    fn id_fragment(&self) -> String {
        match self {
            Source::AnyIpv4 => String::from("AnyIpv4"),
            Source::AnyIpv6 => String::from("AnyIpv6"),
            Source::Cidr(cidr) => format!(
                "Cidr{}",
                cidr.to_string()
                    .chars()
                    .filter(|c| c.is_ascii_digit())
                    .collect::<String>()
            ),
            Source::Group(group) => group.logical_id().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngressRule {
    pub target: Group,
    pub source: Source,
    pub port: Port,
    pub description: &'static str,
}

impl IngressRule {
    fn new(target: Group, source: Source, port: Port, description: &'static str) -> Self {
        Self {
            target,
            source,
            port,
            description,
        }
    }

    fn logical_id(&self) -> String {
        let port = match self.port {
            Port::Tcp(port) => format!("Tcp{}", port),
            Port::IcmpPing => String::from("IcmpPing"),
            Port::AllTraffic => String::from("AllTraffic"),
        };
        format!(
            "{}From{}{}",
            self.target.logical_id(),
            self.source.id_fragment(),
            port
        )
    }

    fn to_resource(&self) -> Resource {
        let (protocol, from_port, to_port) = self.port.rule_fields();
        let mut properties = json!({
            "GroupId": fns::get_att(self.target.logical_id(), "GroupId"),
            "IpProtocol": protocol,
            "Description": self.description,
        });
        if let (Some(from_port), Some(to_port)) = (from_port, to_port) {
            properties["FromPort"] = json!(from_port);
            properties["ToPort"] = json!(to_port);
        }
        match self.source {
            Source::AnyIpv4 => properties["CidrIp"] = json!("0.0.0.0/0"),
            Source::AnyIpv6 => properties["CidrIpv6"] = json!("::/0"),
            Source::Cidr(cidr) => properties["CidrIp"] = json!(cidr.to_string()),
            Source::Group(group) => {
                properties["SourceSecurityGroupId"] = fns::get_att(group.logical_id(), "GroupId")
            }
        }
        Resource::new("AWS::EC2::SecurityGroupIngress", properties)
    }
}

/// Every ingress rule of the topology. Only the public load balancer admits
/// traffic from anywhere.
pub fn ingress_rules(vpc_cidr: Ipv4Cidr) -> Vec<IngressRule> {
    use Group::*;

    let mut rules = Vec::new();
    for source in [Source::AnyIpv4, Source::AnyIpv6] {
        for port in [Port::Tcp(80), Port::Tcp(443), Port::IcmpPing] {
            rules.push(IngressRule::new(
                PublicLoadBalancer,
                source,
                port,
                "Allow from anyone",
            ));
        }
    }

    rules.extend([
        IngressRule::new(Nat, Source::Cidr(vpc_cidr), Port::AllTraffic, "Allow all traffic from the VPC"),
        IngressRule::new(
            BackendLoadBalancer,
            Source::Group(FrontendService),
            Port::Tcp(8000),
            "Allow http 8000 from Frontend",
        ),
        IngressRule::new(
            FrontendService,
            Source::Group(PublicLoadBalancer),
            Port::Tcp(8080),
            "Allow http 8080 from Public ALB",
        ),
        IngressRule::new(
            RealtimeService,
            Source::Group(PublicLoadBalancer),
            Port::Tcp(9000),
            "Allow http 9000 from Public ALB",
        ),
        IngressRule::new(
            BackendService,
            Source::Group(BackendLoadBalancer),
            Port::Tcp(8000),
            "Allow http 8000 from Backend ALB",
        ),
        IngressRule::new(
            Cache,
            Source::Group(CommonService),
            Port::Tcp(6379),
            "Allow Redis from Common Service",
        ),
        IngressRule::new(Cache, Source::Group(Nat), Port::Tcp(22), "Allow SSH from NAT Security Group"),
        IngressRule::new(
            Database,
            Source::Group(CommonService),
            Port::Tcp(3306),
            "Allow MySQL from Common Service",
        ),
        IngressRule::new(
            FileSystem,
            Source::Group(CommonService),
            Port::Tcp(2049),
            "Allow EFS from Common Service",
        ),
    ]);
    rules
}

/// Unrestricted sources are allowed only on the public load balancer, and
/// only for HTTP, HTTPS, and ping.
pub fn check_ingress(rules: &[IngressRule]) -> Result<(), Error> {
    for rule in rules.iter().filter(|rule| rule.source.is_unrestricted()) {
        let public_port = matches!(rule.port, Port::Tcp(80) | Port::Tcp(443) | Port::IcmpPing);
        if rule.target != Group::PublicLoadBalancer || !public_port {
            return Err(Error::UnrestrictedIngress {
                group: rule.target.logical_id().to_string(),
                port: rule.port.to_string(),
            });
        }
    }
    Ok(())
}

pub struct NetworkProps<'a> {
    pub cidr: Ipv4Cidr,
    pub max_azs: u8,
    pub key_pair: &'a str,
    pub nat_image: &'a ImageQuery,
    pub region: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct Vpc {
    pub vpc_id: Handle,
    pub public_subnets: Vec<Handle>,
    pub egress_subnets: Vec<Handle>,
    pub isolated_subnets: Vec<Handle>,
}

#[derive(Debug, Clone)]
pub struct SecurityGroups {
    pub public_load_balancer: Handle,
    pub backend_load_balancer: Handle,
    pub frontend_service: Handle,
    pub realtime_service: Handle,
    pub backend_service: Handle,
    pub common_service: Handle,
    pub database: Handle,
    pub cache: Handle,
    pub file_system: Handle,
}

#[derive(Debug, Clone)]
pub struct NetworkOutputs {
    pub vpc: Vpc,
    pub groups: SecurityGroups,
    pub rules: Vec<IngressRule>,
}

pub fn build(props: NetworkProps, context: &LookupContext) -> Result<Built<NetworkOutputs>, Error> {
    let nat_image = context.machine_image(props.region, props.nat_image)?;
    debug!(image = %nat_image.image_id, name = %nat_image.name, "resolved NAT image");

    let mut stack = Stack::new(NAME, "VPC, NAT instances and security groups");

    stack.add(
        "MainVpc",
        Resource::new(
            "AWS::EC2::VPC",
            json!({
                "CidrBlock": props.cidr.to_string(),
                "EnableDnsHostnames": true,
                "EnableDnsSupport": true,
                "InstanceTenancy": "default",
                "Tags": name_tag("MainVpc"),
            }),
        ),
    )?;
    stack.add("MainVpcIGW", Resource::new("AWS::EC2::InternetGateway", json!({})))?;
    stack.add(
        "MainVpcVPCGW",
        Resource::new(
            "AWS::EC2::VPCGatewayAttachment",
            json!({
                "VpcId": fns::reference("MainVpc"),
                "InternetGatewayId": fns::reference("MainVpcIGW"),
            }),
        ),
    )?;

    // The NAT group exists before the instances that use it; its rules are
    // added with everyone else's below.
    add_security_group(&mut stack, Group::Nat)?;

    let mut allocator = SubnetAllocator::new(props.cidr);
    let mut public_subnets = Vec::new();
    let mut egress_subnets = Vec::new();
    let mut isolated_subnets = Vec::new();

    for group in SUBNET_GROUPS.iter() {
        for az in 0..usize::from(props.max_azs) {
            let subnet_id = format!("{}Subnet{}", group.name, az + 1);
            let cidr = allocator.allocate(group.cidr_mask)?;
            add_subnet(&mut stack, &subnet_id, cidr, az, group.subnet_type)?;

            match group.subnet_type {
                SubnetType::Public => {
                    add_nat_instance(&mut stack, &subnet_id, props.key_pair, &nat_image.image_id)?;
                    public_subnets.push(subnet_id);
                }
                SubnetType::PrivateWithEgress => {
                    let nat_id = format!("{}NatInstance", public_subnets[az]);
                    stack.add(
                        &format!("{}DefaultRoute", subnet_id),
                        Resource::new(
                            "AWS::EC2::Route",
                            json!({
                                "RouteTableId": fns::reference(&format!("{}RouteTable", subnet_id)),
                                "DestinationCidrBlock": "0.0.0.0/0",
                                "InstanceId": fns::reference(&nat_id),
                            }),
                        ),
                    )?;
                    egress_subnets.push(subnet_id);
                }
                SubnetType::PrivateIsolated => isolated_subnets.push(subnet_id),
            }
        }
    }

    for group in Group::ALL.iter().filter(|group| **group != Group::Nat) {
        add_security_group(&mut stack, *group)?;
    }

    let rules = ingress_rules(props.cidr);
    check_ingress(&rules)?;
    for rule in &rules {
        // Second pass: every group referenced by a rule already exists.
        for group in [Some(rule.target), source_group(rule)].into_iter().flatten() {
            if stack.template().resource(group.logical_id()).is_none() {
                return Err(Error::Template(crate::template::Error::UnknownResource(
                    group.logical_id().to_string(),
                )));
            }
        }
        stack.add(&rule.logical_id(), rule.to_resource())?;
    }

    let vpc = Vpc {
        vpc_id: stack.export("MainVpc")?,
        public_subnets: export_all(&mut stack, &public_subnets)?,
        egress_subnets: export_all(&mut stack, &egress_subnets)?,
        isolated_subnets: export_all(&mut stack, &isolated_subnets)?,
    };
    let groups = SecurityGroups {
        public_load_balancer: export_group(&mut stack, Group::PublicLoadBalancer)?,
        backend_load_balancer: export_group(&mut stack, Group::BackendLoadBalancer)?,
        frontend_service: export_group(&mut stack, Group::FrontendService)?,
        realtime_service: export_group(&mut stack, Group::RealtimeService)?,
        backend_service: export_group(&mut stack, Group::BackendService)?,
        common_service: export_group(&mut stack, Group::CommonService)?,
        database: export_group(&mut stack, Group::Database)?,
        cache: export_group(&mut stack, Group::Cache)?,
        file_system: export_group(&mut stack, Group::FileSystem)?,
    };
    stack.add_output("VpcId", "Main VPC", fns::reference("MainVpc"))?;

    Ok(Built {
        stack,
        outputs: NetworkOutputs { vpc, groups, rules },
    })
}

fn source_group(rule: &IngressRule) -> Option<Group> {
    match rule.source {
        Source::Group(group) => Some(group),
        _ => None,
    }
}

fn add_security_group(stack: &mut Stack, group: Group) -> Result<(), Error> {
    // Every group may open outbound connections; ingress rules alone scope access.
    let mut properties = json!({
        "GroupDescription": group.description(),
        "VpcId": fns::reference("MainVpc"),
        "SecurityGroupEgress": [{
            "CidrIp": "0.0.0.0/0",
            "Description": "Allow all outbound traffic by default",
            "IpProtocol": "-1",
        }],
    });
    if let Some(name) = group.group_name() {
        properties["GroupName"] = json!(name);
    }

    stack.add(group.logical_id(), Resource::new("AWS::EC2::SecurityGroup", properties))?;
    Ok(())
}

fn add_subnet(
    stack: &mut Stack,
    subnet_id: &str,
    cidr: Ipv4Cidr,
    az: usize,
    subnet_type: SubnetType,
) -> Result<(), Error> {
    let route_table_id = format!("{}RouteTable", subnet_id);

    stack.add(
        subnet_id,
        Resource::new(
            "AWS::EC2::Subnet",
            json!({
                "VpcId": fns::reference("MainVpc"),
                "CidrBlock": cidr.to_string(),
                "AvailabilityZone": fns::select(az, fns::get_azs()),
                "MapPublicIpOnLaunch": subnet_type == SubnetType::Public,
                "Tags": subnet_tags(subnet_id, subnet_type),
            }),
        ),
    )?;
    stack.add(
        &route_table_id,
        Resource::new(
            "AWS::EC2::RouteTable",
            json!({ "VpcId": fns::reference("MainVpc") }),
        ),
    )?;
    stack.add(
        &format!("{}RouteTableAssociation", subnet_id),
        Resource::new(
            "AWS::EC2::SubnetRouteTableAssociation",
            json!({
                "RouteTableId": fns::reference(&route_table_id),
                "SubnetId": fns::reference(subnet_id),
            }),
        ),
    )?;

    if subnet_type == SubnetType::Public {
        stack.add(
            &format!("{}DefaultRoute", subnet_id),
            Resource::new(
                "AWS::EC2::Route",
                json!({
                    "RouteTableId": fns::reference(&route_table_id),
                    "DestinationCidrBlock": "0.0.0.0/0",
                    "GatewayId": fns::reference("MainVpcIGW"),
                }),
            )
            .depends_on("MainVpcVPCGW"),
        )?;
    }
    Ok(())
}

fn subnet_tags(subnet_id: &str, subnet_type: SubnetType) -> Value {
    let kind = match subnet_type {
        SubnetType::Public => "Public",
        SubnetType::PrivateWithEgress => "Private",
        SubnetType::PrivateIsolated => "Isolated",
    };
    json!([
        { "Key": "Name", "Value": subnet_id },
        { "Key": "fayolex:subnet-type", "Value": kind },
    ])
}

fn add_nat_instance(stack: &mut Stack, subnet_id: &str, key_pair: &str, image_id: &str) -> Result<(), Error> {
    let instance_id = format!("{}NatInstance", subnet_id);
    stack.add(
        &instance_id,
        Resource::new(
            "AWS::EC2::Instance",
            json!({
                "ImageId": image_id,
                "InstanceType": NAT_INSTANCE_TYPE,
                "KeyName": key_pair,
                "SourceDestCheck": false,
                "SubnetId": fns::reference(subnet_id),
                "SecurityGroupIds": [fns::get_att(Group::Nat.logical_id(), "GroupId")],
                "Tags": name_tag(&instance_id),
            }),
        )
        .depends_on(&format!("{}DefaultRoute", subnet_id)),
    )?;
    Ok(())
}

fn export_all(stack: &mut Stack, logical_ids: &[String]) -> Result<Vec<Handle>, Error> {
    let mut handles = Vec::new();
    for logical_id in logical_ids {
        handles.push(stack.export(logical_id)?);
    }
    Ok(handles)
}

fn export_group(stack: &mut Stack, group: Group) -> Result<Handle, Error> {
    Ok(stack.export_attribute(group.logical_id(), "GroupId")?)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::context::MachineImage;

    pub(crate) fn nat_query() -> ImageQuery {
        ImageQuery {
            name: String::from("fck-nat-al2023-*-arm64-ebs"),
            owners: vec![String::from("568608671756")],
        }
    }

    pub(crate) fn context_with_nat_image() -> LookupContext {
        let mut context = LookupContext::default();
        context.record(
            Some("ap-southeast-3"),
            &nat_query(),
            vec![MachineImage {
                image_id: String::from("ami-0123456789abcdef0"),
                name: String::from("fck-nat-al2023-hvm-1.3.0-20240125-arm64-ebs"),
            }],
        );
        context
    }

    pub(crate) fn build_network() -> Built<NetworkOutputs> {
        let query = nat_query();
        build(
            NetworkProps {
                cidr: "10.0.0.0/16".parse().unwrap(),
                max_azs: 2,
                key_pair: "YSA",
                nat_image: &query,
                region: Some("ap-southeast-3"),
            },
            &context_with_nat_image(),
        )
        .unwrap()
    }

    #[test]
    fn lays_out_subnets_per_az() {
        let network = build_network();
        let template = network.stack.template().to_json();

        assert_eq!(2, network.outputs.vpc.public_subnets.len());
        assert_eq!(2, network.outputs.vpc.egress_subnets.len());
        assert_eq!(2, network.outputs.vpc.isolated_subnets.len());
        assert_eq!("10.0.0.0/24", template["Resources"]["FrontendSubnet1"]["Properties"]["CidrBlock"]);
        assert_eq!("10.0.16.0/20", template["Resources"]["BackendSubnet1"]["Properties"]["CidrBlock"]);
        assert_eq!("10.0.64.0/20", template["Resources"]["OtherSubnet2"]["Properties"]["CidrBlock"]);
        assert!(template["Resources"].get("OtherSubnet1DefaultRoute").is_none());
    }

    #[test]
    fn private_subnets_egress_through_nat_instances_in_the_same_az() {
        let template = build_network().stack.template().to_json();

        assert_eq!(
            json!({ "Ref": "FrontendSubnet2NatInstance" }),
            template["Resources"]["BackendSubnet2DefaultRoute"]["Properties"]["InstanceId"]
        );
        let nat = &template["Resources"]["FrontendSubnet1NatInstance"]["Properties"];
        assert_eq!("ami-0123456789abcdef0", nat["ImageId"]);
        assert_eq!(false, nat["SourceDestCheck"]);
        assert_eq!("YSA", nat["KeyName"]);
    }

    #[test]
    fn nat_group_admits_the_vpc_and_reaches_everywhere() {
        let template = build_network().stack.template().to_json();

        let rule = &template["Resources"]["NatSecurityGroupFromCidr1000016AllTraffic"]["Properties"];
        assert_eq!("10.0.0.0/16", rule["CidrIp"]);
        assert_eq!("-1", rule["IpProtocol"]);
        assert_eq!(
            "0.0.0.0/0",
            template["Resources"]["NatSecurityGroup"]["Properties"]["SecurityGroupEgress"][0]["CidrIp"]
        );
    }

    #[test]
    fn every_group_allows_all_outbound_traffic() {
        let network = build_network();
        let groups: Vec<_> = network
            .stack
            .template()
            .resources_of_type("AWS::EC2::SecurityGroup")
            .collect();
        assert_eq!(Group::ALL.len(), groups.len());

        for (logical_id, resource) in groups {
            assert_eq!(
                json!([{
                    "CidrIp": "0.0.0.0/0",
                    "Description": "Allow all outbound traffic by default",
                    "IpProtocol": "-1",
                }]),
                resource.properties["SecurityGroupEgress"],
                "{}",
                logical_id
            );
        }
    }

    #[test]
    fn only_the_public_load_balancer_is_open_to_the_world() {
        let network = build_network();
        check_ingress(&network.outputs.rules).unwrap();

        for (_, resource) in network
            .stack
            .template()
            .resources_of_type("AWS::EC2::SecurityGroupIngress")
        {
            let properties = &resource.properties;
            let open = properties.get("CidrIp") == Some(&json!("0.0.0.0/0"))
                || properties.get("CidrIpv6").is_some();
            if open {
                assert_eq!(
                    json!({ "Fn::GetAtt": ["PublicLoadBalancerSecurityGroup", "GroupId"] }),
                    properties["GroupId"]
                );
                let from = properties["FromPort"].as_i64().unwrap();
                assert!([80, 443, 8].contains(&from));
            } else if properties.get("CidrIp").is_none() {
                assert!(properties.get("SourceSecurityGroupId").is_some());
            }
        }
    }

    #[test]
    fn check_ingress_rejects_open_rules_elsewhere() {
        let rules = vec![IngressRule::new(
            Group::Database,
            Source::AnyIpv4,
            Port::Tcp(3306),
            "oops",
        )];
        match check_ingress(&rules) {
            Err(Error::UnrestrictedIngress { group, .. }) => {
                assert_eq!("DatabaseSecurityGroup", group)
            }
            other => panic!("Expected `UnrestrictedIngress`, got {:?}", other),
        }

        let rules = vec![IngressRule::new(
            Group::PublicLoadBalancer,
            Source::AnyIpv4,
            Port::Tcp(22),
            "ssh",
        )];
        assert!(check_ingress(&rules).is_err());
    }

    #[test]
    fn exports_nine_named_groups() {
        let network = build_network();
        let outputs = network.stack.template().outputs();
        let exported_groups = outputs
            .keys()
            .filter(|key| key.ends_with("SecurityGroupGroupId"))
            .count();
        assert_eq!(9, exported_groups);
        assert!(!outputs.contains_key("ExportNatSecurityGroupGroupId"));
        assert_eq!(
            "NetworkStack:RedisSecurityGroup:GroupId",
            network.outputs.groups.cache.export_name()
        );
    }

    #[test]
    fn ambiguous_nat_image_fails_construction() {
        let query = nat_query();
        let mut context = LookupContext::default();
        context.record(
            Some("ap-southeast-3"),
            &query,
            vec![
                MachineImage {
                    image_id: String::from("ami-1"),
                    name: String::from("a"),
                },
                MachineImage {
                    image_id: String::from("ami-2"),
                    name: String::from("b"),
                },
            ],
        );

        let result = build(
            NetworkProps {
                cidr: "10.0.0.0/16".parse().unwrap(),
                max_azs: 2,
                key_pair: "YSA",
                nat_image: &query,
                region: Some("ap-southeast-3"),
            },
            &context,
        );
        match result {
            Err(Error::Lookup(crate::context::Error::Ambiguous { .. })) => {}
            other => panic!("Expected ambiguous lookup, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn undersized_block_fails_construction() {
        let query = nat_query();
        let result = build(
            NetworkProps {
                cidr: "10.0.0.0/20".parse().unwrap(),
                max_azs: 2,
                key_pair: "YSA",
                nat_image: &query,
                region: Some("ap-southeast-3"),
            },
            &context_with_nat_image(),
        );
        assert!(matches!(
            result,
            Err(Error::Network(crate::net::Error::AddressSpaceExhausted { .. }))
        ));
    }
}
