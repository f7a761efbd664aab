//! Fargate services for the backend, frontend and realtime processes.

use serde::Serialize;
use serde_json::{json, Value};

use super::compute::ComputeOutputs;
use super::database::{secret_field, DatabaseOutputs, CACHE_PORT};
use super::loadbalancer::LoadBalancerOutputs;
use super::network::{SecurityGroups, Vpc};
use super::storage::{FileSystem, StorageOutputs};
use super::{Built, Error};
use crate::iam::{PolicyStatement, Role};
use crate::stack::{Handle, Stack};
use crate::template::{fns, Resource};

pub const NAME: &str = "ServiceStack";

const TASK_CPU: &str = "1024";
const TASK_MEMORY: &str = "2048";
const LOG_RETENTION_DAYS: u32 = 7;
const DESIRED_COUNT: u32 = 1;
const BENCH: &str = "/home/frappe/frappe-bench";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ServiceKind {
    Backend,
    Frontend,
    Realtime,
}

/// How a container starts when it does not use the image default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Launch {
    ImageDefault,
    EntryPoint(&'static [&'static str]),
    Command(&'static [&'static str]),
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 3] = [ServiceKind::Backend, ServiceKind::Frontend, ServiceKind::Realtime];

    /// Logical id prefix and container name.
    pub fn id(self) -> &'static str {
        match self {
            ServiceKind::Backend => "Backend",
            ServiceKind::Frontend => "Frontend",
            ServiceKind::Realtime => "SocketIo",
        }
    }

    pub fn port(self) -> u16 {
        match self {
            ServiceKind::Backend => 8000,
            ServiceKind::Frontend => 8080,
            ServiceKind::Realtime => 9000,
        }
    }

    pub fn health_check_path(self) -> &'static str {
        match self {
            ServiceKind::Backend => "/api/method/ping",
            ServiceKind::Frontend => "/",
            ServiceKind::Realtime => "/socket.io/health",
        }
    }

    pub fn target_group_id(self) -> &'static str {
        match self {
            ServiceKind::Backend => "BackendTG",
            ServiceKind::Frontend => "FrontendTG",
            ServiceKind::Realtime => "SocketIoTG",
        }
    }

    pub fn stream_prefix(self) -> &'static str {
        match self {
            ServiceKind::Backend => "backend",
            ServiceKind::Frontend => "frontend",
            ServiceKind::Realtime => "socketio",
        }
    }

    pub fn launch(self) -> Launch {
        match self {
            ServiceKind::Backend => Launch::ImageDefault,
            ServiceKind::Frontend => Launch::EntryPoint(&["bash", "-c", "nginx-entrypoint.sh"]),
            ServiceKind::Realtime => Launch::Command(&["node", "/home/frappe/frappe-bench/apps/frappe/socketio.js"]),
        }
    }

    fn security_group(self, groups: &SecurityGroups) -> &Handle {
        match self {
            ServiceKind::Backend => &groups.backend_service,
            ServiceKind::Frontend => &groups.frontend_service,
            ServiceKind::Realtime => &groups.realtime_service,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthCheck {
    pub interval_secs: u32,
    pub timeout_secs: u32,
    pub retries: u32,
    pub start_period_secs: u32,
}

impl HealthCheck {
    pub const DEFAULT: HealthCheck = HealthCheck {
        interval_secs: 30,
        timeout_secs: 5,
        retries: 3,
        start_period_secs: 60,
    };

    pub fn command(port: u16, path: &str) -> Vec<String> {
        vec![
            String::from("CMD-SHELL"),
            format!("curl -f http://localhost:{}{} || exit 1", port, path),
        ]
    }

    fn to_json(&self, kind: ServiceKind) -> Value {
        json!({
            "Command": Self::command(kind.port(), kind.health_check_path()),
            "Interval": self.interval_secs,
            "Timeout": self.timeout_secs,
            "Retries": self.retries,
            "StartPeriod": self.start_period_secs,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalingPolicy {
    pub min_capacity: u32,
    pub max_capacity: u32,
    pub cpu_target_percent: f64,
    pub memory_target_percent: f64,
    pub scale_in_cooldown_secs: u32,
    pub scale_out_cooldown_secs: u32,
}

impl ScalingPolicy {
    pub const DEFAULT: ScalingPolicy = ScalingPolicy {
        min_capacity: 1,
        max_capacity: 2,
        cpu_target_percent: 60.0,
        memory_target_percent: 80.0,
        scale_in_cooldown_secs: 300,
        scale_out_cooldown_secs: 120,
    };

    /// Scaling out must react faster than scaling in, and capacity bounds must
    /// leave at least one task running.
    pub fn validate(&self) -> Result<(), Error> {
        if self.min_capacity < 1 {
            return Err(Error::InvalidScaling(String::from("minimum capacity must be at least 1")));
        }
        if self.min_capacity > self.max_capacity {
            return Err(Error::InvalidScaling(format!(
                "minimum capacity {} exceeds maximum {}",
                self.min_capacity, self.max_capacity
            )));
        }
        for (metric, target) in [("cpu", self.cpu_target_percent), ("memory", self.memory_target_percent)] {
            if !(target > 0.0 && target <= 100.0) {
                return Err(Error::InvalidScaling(format!(
                    "{} target {} is outside (0, 100]",
                    metric, target
                )));
            }
        }
        if self.scale_out_cooldown_secs >= self.scale_in_cooldown_secs {
            return Err(Error::InvalidScaling(format!(
                "scale-out cooldown {}s must be shorter than scale-in cooldown {}s",
                self.scale_out_cooldown_secs, self.scale_in_cooldown_secs
            )));
        }
        Ok(())
    }
}

/// Variables every service container receives.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct BaseEnvironment {
    pub db_host: Value,
    pub db_port: Value,
    pub redis_cache: Value,
    pub redis_queue: Value,
    pub socketio_port: String,
    pub mysql_root_password: Value,
    pub mysql_root_username: Value,
    pub maria_db_root_password: Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct FrontendEnvironment {
    #[serde(flatten)]
    pub base: BaseEnvironment,
    pub backend: Value,
    pub socketio: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ContainerEnvironment {
    Base(BaseEnvironment),
    Frontend(FrontendEnvironment),
}

impl ContainerEnvironment {
    /// Task definition `Environment` entries, ordered by name.
    pub fn to_pairs(&self) -> Result<Vec<Value>, Error> {
        let value = serde_json::to_value(self).map_err(|e| Error::Environment(e.to_string()))?;
        let fields = match value {
            Value::Object(fields) => fields,
            other => return Err(Error::Environment(format!("expected a record, got {}", other))),
        };

        let mut pairs: Vec<(String, Value)> = fields.into_iter().collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(pairs
            .into_iter()
            .map(|(name, value)| json!({ "Name": name, "Value": value }))
            .collect())
    }
}

/// Services must not share a port; the target group is keyed on it.
pub fn check_distinct_ports(services: &[(ServiceKind, u16)]) -> Result<(), Error> {
    for (index, (first, port)) in services.iter().enumerate() {
        if let Some((second, _)) = services[index + 1..].iter().find(|(_, other)| other == port) {
            return Err(Error::DuplicateServicePort {
                first: first.id().to_string(),
                second: second.id().to_string(),
                port: *port,
            });
        }
    }
    Ok(())
}

pub struct ServiceProps<'a> {
    pub vpc: &'a Vpc,
    pub groups: &'a SecurityGroups,
    pub database: &'a DatabaseOutputs,
    pub storage: &'a StorageOutputs,
    pub load_balancers: &'a LoadBalancerOutputs,
    pub compute: &'a ComputeOutputs,
    pub image: &'a str,
    pub realtime_address: &'a str,
    pub scaling: &'a ScalingPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSummary {
    pub kind: ServiceKind,
    pub port: u16,
    pub health_check_path: &'static str,
    pub target_group: String,
}

#[derive(Debug, Clone)]
pub struct ServiceOutputs {
    pub services: Vec<ServiceSummary>,
}

pub fn build(props: ServiceProps) -> Result<Built<ServiceOutputs>, Error> {
    props.scaling.validate()?;
    let ports: Vec<(ServiceKind, u16)> = ServiceKind::ALL.iter().map(|kind| (*kind, kind.port())).collect();
    check_distinct_ports(&ports)?;

    let mut stack = Stack::new(NAME, "Fargate services for backend, frontend and socket.io");

    let base = base_environment(&mut stack, props.database);
    let backend_dns = stack.resolve(&props.load_balancers.internal_dns_name);
    let frontend = FrontendEnvironment {
        base: base.clone(),
        backend: fns::join("", vec![backend_dns, json!(format!(":{}", ServiceKind::Backend.port()))]),
        socketio: props.realtime_address.to_string(),
    };

    let sites = mount_volume(&mut stack, "sites", &props.storage.sites);
    let logs = mount_volume(&mut stack, "logs", &props.storage.logs);
    let secret = stack.resolve(&props.database.cluster.secret);
    let task_role = Role::assumed_by("ecs-tasks.amazonaws.com")
        .with_managed_policy("AmazonEC2ContainerRegistryReadOnly")
        .with_managed_policy("AmazonElasticFileSystemClientReadWriteAccess")
        .with_statement(PolicyStatement::allow(
            &[
                "elasticfilesystem:ClientRootAccess",
                "elasticfilesystem:ClientWrite",
                "elasticfilesystem:ClientMount",
            ],
            vec![sites.arn.clone(), logs.arn.clone()],
        ))
        .with_statement(PolicyStatement::allow(
            &["secretsmanager:GetSecretValue", "secretsmanager:DescribeSecret"],
            vec![secret],
        ))
        .with_statement(PolicyStatement::allow(
            &[
                "ecr:GetAuthorizationToken",
                "ecr:BatchCheckLayerAvailability",
                "ecr:GetDownloadUrlForLayer",
                "ecr:BatchGetImage",
            ],
            vec![json!("*")],
        ));
    stack.add("TaskRole", task_role.to_resource("TaskRole"))?;

    let shared = Shared {
        cluster_name: stack.resolve(&props.compute.cluster_name),
        subnets: stack.resolve_all(&props.vpc.egress_subnets),
        common_group: stack.resolve(&props.groups.common_service),
        image: props.image,
        volumes: vec![sites, logs],
        scaling: props.scaling,
    };

    let mut services = Vec::new();
    for kind in ServiceKind::ALL {
        let target_group = props.load_balancers.target_group(kind);
        if target_group.port != kind.port() {
            return Err(Error::TargetPortMismatch {
                service: kind.id().to_string(),
                container_port: kind.port(),
                target_port: target_group.port,
            });
        }

        let environment = match kind {
            ServiceKind::Frontend => ContainerEnvironment::Frontend(frontend.clone()),
            _ => ContainerEnvironment::Base(base.clone()),
        };
        let service_group = stack.resolve(kind.security_group(props.groups));
        let target_group_arn = stack.resolve(&target_group.arn);
        add_service(&mut stack, &shared, kind, &environment, service_group, target_group_arn)?;

        services.push(ServiceSummary {
            kind,
            port: kind.port(),
            health_check_path: kind.health_check_path(),
            target_group: target_group.arn.export_name(),
        });
    }

    Ok(Built {
        stack,
        outputs: ServiceOutputs { services },
    })
}

/// Values every service shares once resolved into this stack.
struct Shared<'a> {
    cluster_name: Value,
    subnets: Vec<Value>,
    common_group: Value,
    image: &'a str,
    volumes: Vec<Volume>,
    scaling: &'a ScalingPolicy,
}

struct Volume {
    name: &'static str,
    file_system_id: Value,
    access_point_id: Value,
    arn: Value,
}

impl Volume {
    fn container_path(&self) -> String {
        format!("{}/{}", BENCH, self.name)
    }

    fn mount_point(&self) -> Value {
        json!({
            "SourceVolume": self.name,
            "ContainerPath": self.container_path(),
            "ReadOnly": false,
        })
    }

    fn to_json(&self) -> Value {
        json!({
            "Name": self.name,
            "EFSVolumeConfiguration": {
                "FilesystemId": self.file_system_id,
                "TransitEncryption": "ENABLED",
                "AuthorizationConfig": {
                    "AccessPointId": self.access_point_id,
                    "IAM": "ENABLED",
                },
            },
        })
    }
}

fn mount_volume(stack: &mut Stack, name: &'static str, file_system: &FileSystem) -> Volume {
    Volume {
        name,
        file_system_id: stack.resolve(&file_system.file_system_id),
        access_point_id: stack.resolve(&file_system.access_point_id),
        arn: stack.resolve(&file_system.arn),
    }
}

fn base_environment(stack: &mut Stack, database: &DatabaseOutputs) -> BaseEnvironment {
    let secret = stack.resolve(&database.cluster.secret);
    let cache_ip = stack.resolve(&database.cache.private_ip);
    let redis = fns::join("", vec![cache_ip, json!(format!(":{}", CACHE_PORT))]);

    BaseEnvironment {
        db_host: stack.resolve(&database.cluster.endpoint_address),
        db_port: stack.resolve(&database.cluster.endpoint_port),
        redis_cache: redis.clone(),
        redis_queue: redis,
        socketio_port: ServiceKind::Realtime.port().to_string(),
        mysql_root_password: secret_field(secret.clone(), "password"),
        mysql_root_username: secret_field(secret.clone(), "username"),
        maria_db_root_password: secret_field(secret, "password"),
    }
}

fn add_service(
    stack: &mut Stack,
    shared: &Shared,
    kind: ServiceKind,
    environment: &ContainerEnvironment,
    service_group: Value,
    target_group_arn: Value,
) -> Result<(), Error> {
    let id = kind.id();
    let execution_role = format!("{}ExecutionRole", id);
    let log_group = format!("{}LogGroup", id);
    let task_definition = format!("{}TaskDefinition", id);
    let service = format!("{}Service", id);
    let scalable_target = format!("{}ScalableTarget", id);

    stack.add(
        &execution_role,
        Role::assumed_by("ecs-tasks.amazonaws.com")
            .with_managed_policy("service-role/AmazonECSTaskExecutionRolePolicy")
            .with_managed_policy("AmazonEC2ContainerRegistryReadOnly")
            .to_resource(&execution_role),
    )?;

    stack.add(
        &log_group,
        Resource::new("AWS::Logs::LogGroup", json!({ "RetentionInDays": LOG_RETENTION_DAYS })),
    )?;

    let mut container = json!({
        "Name": id,
        "Image": shared.image,
        "Essential": true,
        "PortMappings": [{ "ContainerPort": kind.port(), "Protocol": "tcp" }],
        "Environment": environment.to_pairs()?,
        "HealthCheck": HealthCheck::DEFAULT.to_json(kind),
        "LogConfiguration": {
            "LogDriver": "awslogs",
            "Options": {
                "awslogs-group": fns::reference(&log_group),
                "awslogs-stream-prefix": kind.stream_prefix(),
                "awslogs-region": fns::region(),
            },
        },
        "MountPoints": shared.volumes.iter().map(Volume::mount_point).collect::<Vec<_>>(),
    });
    match kind.launch() {
        Launch::ImageDefault => {}
        Launch::EntryPoint(entry_point) => container["EntryPoint"] = json!(entry_point),
        Launch::Command(command) => container["Command"] = json!(command),
    }

    stack.add(
        &task_definition,
        Resource::new(
            "AWS::ECS::TaskDefinition",
            json!({
                "Family": format!("{}Task", id),
                "Cpu": TASK_CPU,
                "Memory": TASK_MEMORY,
                "NetworkMode": "awsvpc",
                "RequiresCompatibilities": ["FARGATE"],
                "RuntimePlatform": {
                    "CpuArchitecture": "X86_64",
                    "OperatingSystemFamily": "LINUX",
                },
                "ExecutionRoleArn": fns::get_att(&execution_role, "Arn"),
                "TaskRoleArn": fns::get_att("TaskRole", "Arn"),
                "ContainerDefinitions": [container],
                "Volumes": shared.volumes.iter().map(Volume::to_json).collect::<Vec<_>>(),
            }),
        ),
    )?;

    stack.add(
        &service,
        Resource::new(
            "AWS::ECS::Service",
            json!({
                "Cluster": shared.cluster_name,
                "TaskDefinition": fns::reference(&task_definition),
                "DesiredCount": DESIRED_COUNT,
                "LaunchType": "FARGATE",
                "HealthCheckGracePeriodSeconds": HealthCheck::DEFAULT.start_period_secs,
                "NetworkConfiguration": {
                    "AwsvpcConfiguration": {
                        "AssignPublicIp": "DISABLED",
                        "Subnets": shared.subnets,
                        "SecurityGroups": [service_group, shared.common_group],
                    },
                },
                "LoadBalancers": [{
                    "ContainerName": id,
                    "ContainerPort": kind.port(),
                    "TargetGroupArn": target_group_arn,
                }],
            }),
        ),
    )?;

    let scaling = shared.scaling;
    stack.add(
        &scalable_target,
        Resource::new(
            "AWS::ApplicationAutoScaling::ScalableTarget",
            json!({
                "MinCapacity": scaling.min_capacity,
                "MaxCapacity": scaling.max_capacity,
                "ResourceId": fns::join("/", vec![
                    json!("service"),
                    shared.cluster_name.clone(),
                    fns::get_att(&service, "Name"),
                ]),
                "RoleARN": fns::join("", vec![
                    json!("arn:"),
                    fns::partition(),
                    json!(":iam::"),
                    fns::account_id(),
                    json!(":role/aws-service-role/ecs.application-autoscaling.amazonaws.com/AWSServiceRoleForApplicationAutoScaling_ECSService"),
                ]),
                "ScalableDimension": "ecs:service:DesiredCount",
                "ServiceNamespace": "ecs",
            }),
        ),
    )?;

    for (suffix, metric, target) in [
        ("Cpu", "ECSServiceAverageCPUUtilization", scaling.cpu_target_percent),
        ("Memory", "ECSServiceAverageMemoryUtilization", scaling.memory_target_percent),
    ] {
        let policy = format!("{}{}Scaling", id, suffix);
        stack.add(
            &policy,
            Resource::new(
                "AWS::ApplicationAutoScaling::ScalingPolicy",
                json!({
                    "PolicyName": policy,
                    "PolicyType": "TargetTrackingScaling",
                    "ScalingTargetId": fns::reference(&scalable_target),
                    "TargetTrackingScalingPolicyConfiguration": {
                        "PredefinedMetricSpecification": { "PredefinedMetricType": metric },
                        "TargetValue": target,
                        "ScaleInCooldown": scaling.scale_in_cooldown_secs,
                        "ScaleOutCooldown": scaling.scale_out_cooldown_secs,
                    },
                }),
            ),
        )?;
    }

    Ok(())
}
