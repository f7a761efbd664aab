//! Shared EFS filesystems: persistent site data and disposable logs.

use serde_json::{json, Value};

use super::network::Vpc;
use super::{Built, Error};
use crate::stack::{Handle, Stack};
use crate::template::{fns, RemovalPolicy, Resource};

pub const NAME: &str = "StorageStack";

const POSIX_ID: &str = "1000";

struct FileSystemDefinition {
    logical_id: &'static str,
    access_point_id: &'static str,
    access_path: &'static str,
    transition_to_ia: &'static str,
    removal_policy: RemovalPolicy,
}

const SITES: FileSystemDefinition = FileSystemDefinition {
    logical_id: "SitesFs",
    access_point_id: "SitesAccess",
    access_path: "/sites",
    transition_to_ia: "AFTER_14_DAYS",
    removal_policy: RemovalPolicy::Retain,
};

const LOGS: FileSystemDefinition = FileSystemDefinition {
    logical_id: "LogsFs",
    access_point_id: "LogsAccess",
    access_path: "/logs",
    transition_to_ia: "AFTER_7_DAYS",
    removal_policy: RemovalPolicy::Destroy,
};

pub struct StorageProps<'a> {
    pub vpc: &'a Vpc,
    pub file_system_group: &'a Handle,
}

#[derive(Debug, Clone)]
pub struct FileSystem {
    pub file_system_id: Handle,
    pub arn: Handle,
    pub access_point_id: Handle,
    pub removal_policy: RemovalPolicy,
}

#[derive(Debug, Clone)]
pub struct StorageOutputs {
    pub sites: FileSystem,
    pub logs: FileSystem,
}

pub fn build(props: StorageProps) -> Result<Built<StorageOutputs>, Error> {
    let mut stack = Stack::new(NAME, "EFS filesystems for sites and logs");

    let subnets = stack.resolve_all(&props.vpc.isolated_subnets);
    let group = stack.resolve(props.file_system_group);

    let sites = add_file_system(&mut stack, &SITES, &subnets, &group)?;
    let logs = add_file_system(&mut stack, &LOGS, &subnets, &group)?;

    Ok(Built {
        stack,
        outputs: StorageOutputs { sites, logs },
    })
}

fn add_file_system(
    stack: &mut Stack,
    definition: &FileSystemDefinition,
    subnets: &[Value],
    group: &Value,
) -> Result<FileSystem, Error> {
    stack.add(
        definition.logical_id,
        Resource::new(
            "AWS::EFS::FileSystem",
            json!({
                "Encrypted": true,
                "LifecyclePolicies": [{ "TransitionToIA": definition.transition_to_ia }],
                "PerformanceMode": "generalPurpose",
                "ThroughputMode": "elastic",
                "FileSystemTags": [{ "Key": "Name", "Value": definition.logical_id }],
            }),
        )
        .with_removal_policy(definition.removal_policy),
    )?;

    for (index, subnet) in subnets.iter().enumerate() {
        stack.add(
            &format!("{}MountTarget{}", definition.logical_id, index + 1),
            Resource::new(
                "AWS::EFS::MountTarget",
                json!({
                    "FileSystemId": fns::reference(definition.logical_id),
                    "SecurityGroups": [group],
                    "SubnetId": subnet,
                }),
            ),
        )?;
    }

    stack.add(
        definition.access_point_id,
        Resource::new(
            "AWS::EFS::AccessPoint",
            json!({
                "FileSystemId": fns::reference(definition.logical_id),
                "PosixUser": { "Uid": POSIX_ID, "Gid": POSIX_ID },
                "RootDirectory": {
                    "Path": definition.access_path,
                    "CreationInfo": {
                        "OwnerUid": POSIX_ID,
                        "OwnerGid": POSIX_ID,
                        "Permissions": "755",
                    },
                },
            }),
        ),
    )?;

    Ok(FileSystem {
        file_system_id: stack.export(definition.logical_id)?,
        arn: stack.export_attribute(definition.logical_id, "Arn")?,
        access_point_id: stack.export(definition.access_point_id)?,
        removal_policy: definition.removal_policy,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stacks::network::tests::build_network;

    #[test]
    fn sites_are_retained_and_logs_are_destroyed() {
        let network = build_network();
        let storage = build(StorageProps {
            vpc: &network.outputs.vpc,
            file_system_group: &network.outputs.groups.file_system,
        })
        .unwrap();

        assert_eq!(RemovalPolicy::Retain, storage.outputs.sites.removal_policy);
        assert_eq!(RemovalPolicy::Destroy, storage.outputs.logs.removal_policy);

        let template = storage.stack.template();
        assert_eq!(Some(RemovalPolicy::Retain), template.resource("SitesFs").unwrap().removal_policy());
        assert_eq!(Some(RemovalPolicy::Destroy), template.resource("LogsFs").unwrap().removal_policy());
    }

    #[test]
    fn access_points_scope_to_posix_user_and_mount_in_isolated_subnets() {
        let network = build_network();
        let storage = build(StorageProps {
            vpc: &network.outputs.vpc,
            file_system_group: &network.outputs.groups.file_system,
        })
        .unwrap();
        let template = storage.stack.template().to_json();

        let access = &template["Resources"]["LogsAccess"]["Properties"];
        assert_eq!("/logs", access["RootDirectory"]["Path"]);
        assert_eq!("1000", access["PosixUser"]["Uid"]);
        assert_eq!(
            json!({ "Fn::ImportValue": "NetworkStack:OtherSubnet2" }),
            template["Resources"]["SitesFsMountTarget2"]["Properties"]["SubnetId"]
        );
        assert_eq!(
            "AFTER_14_DAYS",
            template["Resources"]["SitesFs"]["Properties"]["LifecyclePolicies"][0]["TransitionToIA"]
        );
    }
}
