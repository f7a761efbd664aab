//! Wires the six stacks together from the deployment config.

use tracing::info;

use crate::assembly::{self, Assembly};
use crate::config::{self, DeploymentConfig};
use crate::context::LookupContext;
use crate::stacks::compute::{self, ComputeProps};
use crate::stacks::database::{self, DatabaseProps};
use crate::stacks::loadbalancer::{self, LoadBalancerProps};
use crate::stacks::network::{self, NetworkProps};
use crate::stacks::service::{self, ScalingPolicy, ServiceProps};
use crate::stacks::storage::{self, StorageProps};
use crate::stacks;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] config::Error),

    #[error("Failed to build {stack}")]
    Stack {
        stack: &'static str,
        #[source]
        source: stacks::Error,
    },

    #[error(transparent)]
    Assembly(#[from] assembly::Error),
}

/// Every stack the topology defines, in declaration order.
pub const STACK_NAMES: [&str; 6] = [
    network::NAME,
    database::NAME,
    storage::NAME,
    loadbalancer::NAME,
    compute::NAME,
    service::NAME,
];

fn in_stack(stack: &'static str) -> impl FnOnce(stacks::Error) -> Error {
    move |source| Error::Stack { stack, source }
}

#[derive(Debug)]
pub struct Topology {
    pub assembly: Assembly,
    /// Deployment layers over all stacks.
    pub layers: Vec<Vec<String>>,
}

/// Builds every stack, declares the dependency edges and validates the result.
/// Nothing is written here.
pub fn compose(config: &DeploymentConfig, context: &LookupContext) -> Result<Topology, Error> {
    let nat_image = &config.network.nat_image;
    let network = network::build(
        NetworkProps {
            cidr: config.network.cidr_block()?,
            max_azs: config.network.max_azs,
            key_pair: &config.key_pair,
            nat_image,
            region: config.region.as_deref(),
        },
        context,
    )
    .map_err(in_stack(network::NAME))?;
    let vpc = &network.outputs.vpc;
    let groups = &network.outputs.groups;

    let mut database = database::build(DatabaseProps {
        vpc,
        database_group: &groups.database,
        cache_group: &groups.cache,
        key_pair: &config.key_pair,
    })
    .map_err(in_stack(database::NAME))?;
    database.stack.add_dependency(&network.stack);

    let mut storage = storage::build(StorageProps {
        vpc,
        file_system_group: &groups.file_system,
    })
    .map_err(in_stack(storage::NAME))?;
    storage.stack.add_dependency(&network.stack);

    let mut load_balancers = loadbalancer::build(LoadBalancerProps {
        vpc,
        public_group: &groups.public_load_balancer,
        backend_group: &groups.backend_load_balancer,
        certificate_arn: config.certificate_arn.as_deref(),
    })
    .map_err(in_stack(loadbalancer::NAME))?;
    load_balancers.stack.add_dependency(&network.stack);

    let mut compute = compute::build(ComputeProps {
        vpc,
        cluster_name: &config.cluster_name,
    })
    .map_err(in_stack(compute::NAME))?;
    compute.stack.add_dependency(&network.stack);

    let mut services = service::build(ServiceProps {
        vpc,
        groups,
        database: &database.outputs,
        storage: &storage.outputs,
        load_balancers: &load_balancers.outputs,
        compute: &compute.outputs,
        image: &config.image,
        realtime_address: &config.realtime_address,
        scaling: &ScalingPolicy::DEFAULT,
    })
    .map_err(in_stack(service::NAME))?;
    for upstream in [
        &network.stack,
        &database.stack,
        &storage.stack,
        &load_balancers.stack,
        &compute.stack,
    ] {
        services.stack.add_dependency(upstream);
    }

    let mut assembly = Assembly::new();
    for stack in [
        network.stack,
        database.stack,
        storage.stack,
        load_balancers.stack,
        compute.stack,
        services.stack,
    ] {
        assembly.add(stack)?;
    }

    let layers = assembly.validate()?;
    info!(stacks = assembly.names().count(), layers = layers.len(), "composed topology");

    Ok(Topology { assembly, layers })
}
