//! ECS cluster and the private service-discovery namespace.

use serde_json::json;

use super::network::Vpc;
use super::{Built, Error};
use crate::stack::{Handle, Stack};
use crate::template::{fns, Resource};

pub const NAME: &str = "ComputeStack";

pub const NAMESPACE: &str = "local";

const CAPACITY_PROVIDER: &str = "FARGATE";

pub struct ComputeProps<'a> {
    pub vpc: &'a Vpc,
    pub cluster_name: &'a str,
}

#[derive(Debug, Clone)]
pub struct ComputeOutputs {
    pub cluster_name: Handle,
    pub cluster_arn: Handle,
    pub namespace: Handle,
}

pub fn build(props: ComputeProps) -> Result<Built<ComputeOutputs>, Error> {
    let mut stack = Stack::new(NAME, "ECS cluster with Fargate capacity");
    let vpc_id = stack.resolve(&props.vpc.vpc_id);

    stack.add(
        "MainCluster",
        Resource::new(
            "AWS::ECS::Cluster",
            json!({
                "ClusterName": props.cluster_name,
                "ClusterSettings": [{ "Name": "containerInsights", "Value": "enabled" }],
            }),
        ),
    )?;

    stack.add(
        "MainClusterCapacityProviders",
        Resource::new(
            "AWS::ECS::ClusterCapacityProviderAssociations",
            json!({
                "Cluster": fns::reference("MainCluster"),
                "CapacityProviders": [CAPACITY_PROVIDER],
                "DefaultCapacityProviderStrategy": [],
            }),
        ),
    )?;

    stack.add(
        "MainClusterNamespace",
        Resource::new(
            "AWS::ServiceDiscovery::PrivateDnsNamespace",
            json!({
                "Name": NAMESPACE,
                "Vpc": vpc_id,
            }),
        ),
    )?;

    let outputs = ComputeOutputs {
        cluster_name: stack.export("MainCluster")?,
        cluster_arn: stack.export_attribute("MainCluster", "Arn")?,
        namespace: stack.export_attribute("MainClusterNamespace", "Id")?,
    };
    stack.add_output("ClusterName", "ECS cluster name", fns::reference("MainCluster"))?;

    Ok(Built { stack, outputs })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stacks::network::tests::build_network;

    #[test]
    fn cluster_runs_fargate_only_with_insights() {
        let network = build_network();
        let compute = build(ComputeProps {
            vpc: &network.outputs.vpc,
            cluster_name: "fayolex-cluster",
        })
        .unwrap();
        let template = compute.stack.template().to_json();

        let cluster = &template["Resources"]["MainCluster"]["Properties"];
        assert_eq!("fayolex-cluster", cluster["ClusterName"]);
        assert_eq!("enabled", cluster["ClusterSettings"][0]["Value"]);
        assert_eq!(
            json!(["FARGATE"]),
            template["Resources"]["MainClusterCapacityProviders"]["Properties"]["CapacityProviders"]
        );

        let namespace = &template["Resources"]["MainClusterNamespace"]["Properties"];
        assert_eq!("local", namespace["Name"]);
        assert_eq!(json!({ "Fn::ImportValue": "NetworkStack:MainVpc" }), namespace["Vpc"]);
        assert!(compute.stack.imports().contains("NetworkStack"));
        assert_eq!("ComputeStack:MainCluster:Arn", compute.outputs.cluster_arn.export_name());
    }
}
