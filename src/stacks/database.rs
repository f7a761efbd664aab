//! Aurora serverless cluster and the single-node cache instance.

use serde_json::{json, Value};

use super::network::Vpc;
use super::{Built, Error};
use crate::iam::Role;
use crate::stack::{Handle, Stack};
use crate::template::{fns, name_tag, RemovalPolicy, Resource};

pub const NAME: &str = "DatabaseStack";

pub const CACHE_PORT: u16 = 6379;

const ENGINE: &str = "aurora-mysql";
const ENGINE_VERSION: &str = "8.0.mysql_aurora.3.08.1";
const MASTER_USERNAME: &str = "admin";
const MIN_CAPACITY: f64 = 0.0;
const MAX_CAPACITY: f64 = 1.0;
const BACKUP_RETENTION_DAYS: u32 = 7;
const BACKUP_WINDOW: &str = "19:00-20:00";
const MONITORING_INTERVAL_SECS: u32 = 60;

const CACHE_INSTANCE_TYPE: &str = "t4g.micro";
const CACHE_IMAGE: &str =
    "{{resolve:ssm:/aws/service/ami-amazon-linux-latest/al2023-ami-kernel-default-arm64}}";
const CACHE_CONFIG: &str = "/etc/redis6/redis6.conf";

/// A targeted in-place substitution on the cache config file. Once applied the
/// pattern no longer matches, so replaying the boot script changes nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigEdit {
    pub find: &'static str,
    pub replace: &'static str,
}

impl ConfigEdit {
    fn command(&self) -> String {
        format!("sed -i \"s/{}/{}/\" {}", self.find, self.replace, CACHE_CONFIG)
    }
}

pub const CACHE_CONFIG_EDITS: [ConfigEdit; 3] = [
    ConfigEdit {
        find: "bind 127.0.0.1",
        replace: "bind 0.0.0.0",
    },
    ConfigEdit {
        find: "# maxmemory <bytes>",
        replace: "maxmemory 1gb",
    },
    ConfigEdit {
        find: "# maxmemory-policy noeviction",
        replace: "maxmemory-policy allkeys-lru",
    },
];

/// First-boot commands for the cache node.
pub fn cache_boot_commands() -> Vec<String> {
    let mut commands: Vec<String> = [
        "yum update -y",
        "dnf install -y redis6",
        "systemctl enable redis6.service",
        "systemctl start redis6.service",
        "redis6-cli ping",
    ]
    .iter()
    .map(|command| command.to_string())
    .collect();

    commands.extend(CACHE_CONFIG_EDITS.iter().map(ConfigEdit::command));
    commands.push(String::from("systemctl restart redis6.service"));
    commands.push(String::from("redis6-cli ping"));
    commands
}

/// `{{resolve:secretsmanager:...}}` reference to one field of a JSON secret.
pub fn secret_field(secret_arn: Value, field: &str) -> Value {
    fns::join(
        "",
        vec![
            json!("{{resolve:secretsmanager:"),
            secret_arn,
            json!(format!(":SecretString:{}::}}}}", field)),
        ],
    )
}

pub struct DatabaseProps<'a> {
    pub vpc: &'a Vpc,
    pub database_group: &'a Handle,
    pub cache_group: &'a Handle,
    pub key_pair: &'a str,
}

#[derive(Debug, Clone)]
pub struct DatabaseCluster {
    pub endpoint_address: Handle,
    pub endpoint_port: Handle,
    pub secret: Handle,
}

#[derive(Debug, Clone)]
pub struct CacheNode {
    pub private_ip: Handle,
}

#[derive(Debug, Clone)]
pub struct DatabaseOutputs {
    pub cluster: DatabaseCluster,
    pub cache: CacheNode,
}

pub fn build(props: DatabaseProps) -> Result<Built<DatabaseOutputs>, Error> {
    let mut stack = Stack::new(NAME, "Aurora MySQL serverless cluster and Redis cache node");

    let isolated_subnets = stack.resolve_all(&props.vpc.isolated_subnets);
    let database_group = stack.resolve(props.database_group);
    let cache_group = stack.resolve(props.cache_group);
    let cache_subnet = stack.resolve(&props.vpc.egress_subnets[0]);

    stack.add(
        "MainDatabaseSubnets",
        Resource::new(
            "AWS::RDS::DBSubnetGroup",
            json!({
                "DBSubnetGroupDescription": "Subnets for MainDatabase database",
                "SubnetIds": isolated_subnets,
            }),
        ),
    )?;

    stack.add(
        "MainDatabaseSecret",
        Resource::new(
            "AWS::SecretsManager::Secret",
            json!({
                "Description": "Generated credentials for MainDatabase",
                "GenerateSecretString": {
                    "ExcludeCharacters": " %+~`#$&*()|[]{}:;<>?!'/@\"\\",
                    "GenerateStringKey": "password",
                    "PasswordLength": 30,
                    "SecretStringTemplate": json!({ "username": MASTER_USERNAME }).to_string(),
                },
            }),
        )
        .with_removal_policy(RemovalPolicy::Retain),
    )?;

    stack.add(
        "MainDatabaseMonitoringRole",
        Role::assumed_by("monitoring.rds.amazonaws.com")
            .with_managed_policy("service-role/AmazonRDSEnhancedMonitoringRole")
            .to_resource("MainDatabaseMonitoringRole"),
    )?;

    let secret_arn = fns::reference("MainDatabaseSecret");
    stack.add(
        "MainDatabase",
        Resource::new(
            "AWS::RDS::DBCluster",
            json!({
                "Engine": ENGINE,
                "EngineVersion": ENGINE_VERSION,
                "DBSubnetGroupName": fns::reference("MainDatabaseSubnets"),
                "VpcSecurityGroupIds": [database_group],
                "MasterUsername": secret_field(secret_arn.clone(), "username"),
                "MasterUserPassword": secret_field(secret_arn, "password"),
                "ServerlessV2ScalingConfiguration": {
                    "MinCapacity": MIN_CAPACITY,
                    "MaxCapacity": MAX_CAPACITY,
                },
                "StorageEncrypted": true,
                "BackupRetentionPeriod": BACKUP_RETENTION_DAYS,
                "PreferredBackupWindow": BACKUP_WINDOW,
                "CopyTagsToSnapshot": true,
            }),
        )
        .with_removal_policy(RemovalPolicy::Retain),
    )?;

    stack.add(
        "MainDatabaseSecretAttachment",
        Resource::new(
            "AWS::SecretsManager::SecretTargetAttachment",
            json!({
                "SecretId": fns::reference("MainDatabaseSecret"),
                "TargetId": fns::reference("MainDatabase"),
                "TargetType": "AWS::RDS::DBCluster",
            }),
        ),
    )?;

    stack.add(
        "MainDatabaseWriter",
        Resource::new(
            "AWS::RDS::DBInstance",
            json!({
                "DBClusterIdentifier": fns::reference("MainDatabase"),
                "DBInstanceClass": "db.serverless",
                "Engine": ENGINE,
                "PromotionTier": 0,
                "PubliclyAccessible": false,
                "MonitoringInterval": MONITORING_INTERVAL_SECS,
                "MonitoringRoleArn": fns::get_att("MainDatabaseMonitoringRole", "Arn"),
            }),
        )
        .depends_on("MainDatabaseMonitoringRole")
        .with_removal_policy(RemovalPolicy::Retain),
    )?;

    let script = format!("#!/bin/bash\n{}", cache_boot_commands().join("\n"));
    stack.add(
        "RedisNode",
        Resource::new(
            "AWS::EC2::Instance",
            json!({
                "ImageId": CACHE_IMAGE,
                "InstanceType": CACHE_INSTANCE_TYPE,
                "KeyName": props.key_pair,
                "SubnetId": cache_subnet,
                "SecurityGroupIds": [cache_group],
                "UserData": fns::base64(json!(script)),
                "Tags": name_tag("RedisNode"),
            }),
        ),
    )?;

    let cluster = DatabaseCluster {
        endpoint_address: stack.export_attribute("MainDatabase", "Endpoint.Address")?,
        endpoint_port: stack.export_attribute("MainDatabase", "Endpoint.Port")?,
        secret: stack.export("MainDatabaseSecret")?,
    };
    let cache = CacheNode {
        private_ip: stack.export_attribute("RedisNode", "PrivateIp")?,
    };
    stack.add_output(
        "DatabaseEndpoint",
        "Writer endpoint of the Aurora cluster",
        fns::get_att("MainDatabase", "Endpoint.Address"),
    )?;
    stack.add_output(
        "RedisAddress",
        "Private address of the Redis node",
        fns::get_att("RedisNode", "PrivateIp"),
    )?;

    Ok(Built {
        stack,
        outputs: DatabaseOutputs { cluster, cache },
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::stacks::network::tests::build_network;

    pub(crate) fn build_database(network: &Stack, vpc: &Vpc, database: &Handle, cache: &Handle) -> Built<DatabaseOutputs> {
        let mut built = build(DatabaseProps {
            vpc,
            database_group: database,
            cache_group: cache,
            key_pair: "YSA",
        })
        .unwrap();
        built.stack.add_dependency(network);
        built
    }

    /// What `sed -i "s/find/replace/"` does: first match on each line.
    fn apply(edit: &ConfigEdit, text: &str) -> String {
        text.lines()
            .map(|line| line.replacen(edit.find, edit.replace, 1))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn cluster_scales_to_zero_and_is_retained() {
        let network = build_network();
        let groups = &network.outputs.groups;
        let database = build_database(&network.stack, &network.outputs.vpc, &groups.database, &groups.cache);
        let template = database.stack.template().to_json();
        let cluster = &template["Resources"]["MainDatabase"];

        assert_eq!(0.0, cluster["Properties"]["ServerlessV2ScalingConfiguration"]["MinCapacity"]);
        assert_eq!(1.0, cluster["Properties"]["ServerlessV2ScalingConfiguration"]["MaxCapacity"]);
        assert_eq!(true, cluster["Properties"]["StorageEncrypted"]);
        assert_eq!(7, cluster["Properties"]["BackupRetentionPeriod"]);
        assert_eq!("Retain", cluster["DeletionPolicy"]);
        assert_eq!(
            json!([{ "Fn::ImportValue": "NetworkStack:DatabaseSecurityGroup:GroupId" }]),
            cluster["Properties"]["VpcSecurityGroupIds"]
        );
        assert!(database.stack.imports().contains("NetworkStack"));
    }

    #[test]
    fn secret_field_builds_a_dynamic_reference() {
        let reference = secret_field(json!({ "Ref": "Secret" }), "password");
        assert_eq!(
            json!({ "Fn::Join": ["", [
                "{{resolve:secretsmanager:",
                { "Ref": "Secret" },
                ":SecretString:password::}}",
            ]]}),
            reference
        );
    }

    #[test]
    fn boot_script_edits_are_substitutions_not_appends() {
        let commands = cache_boot_commands();
        assert!(commands.iter().all(|command| !command.contains(">>")));
        assert_eq!(
            3,
            commands.iter().filter(|command| command.starts_with("sed -i \"s/")).count()
        );
        assert_eq!("redis6-cli ping", commands.last().unwrap());
    }

    #[test]
    fn replaying_config_edits_is_a_no_op() {
        let original = "bind 127.0.0.1 -::1\n# maxmemory <bytes>\n# maxmemory-policy noeviction";

        let once = CACHE_CONFIG_EDITS.iter().fold(original.to_string(), |text, edit| apply(edit, &text));
        let twice = CACHE_CONFIG_EDITS.iter().fold(once.clone(), |text, edit| apply(edit, &text));

        assert_eq!("bind 0.0.0.0 -::1\nmaxmemory 1gb\nmaxmemory-policy allkeys-lru", once);
        assert_eq!(once, twice);
    }
}
