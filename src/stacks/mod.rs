//! Stack builders. Each takes only the upstream handles it needs and returns
//! the stack plus the handles its dependents consume.

pub mod compute;
pub mod database;
pub mod loadbalancer;
pub mod network;
pub mod service;
pub mod storage;

use crate::stack::Stack;
use crate::{context, net, template};

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Template(#[from] template::Error),

    #[error(transparent)]
    Network(#[from] net::Error),

    #[error("NAT image lookup failed")]
    Lookup(#[from] context::Error),

    #[error("Security group {group} must not accept {port} from an unrestricted address range")]
    UnrestrictedIngress { group: String, port: String },

    #[error("An HTTPS listener needs a certificate; set `certificate_arn`")]
    MissingCertificate,

    #[error("Listener rule priority {0} is used more than once")]
    DuplicateRulePriority(u16),

    #[error("Catch-all rule at priority {catch_all} shadows `{pattern}` at priority {priority}")]
    ShadowedRule {
        catch_all: u16,
        pattern: String,
        priority: u16,
    },

    #[error("Services `{first}` and `{second}` both claim port {port}")]
    DuplicateServicePort {
        first: String,
        second: String,
        port: u16,
    },

    #[error("Service `{service}` listens on {container_port} but its target group forwards to {target_port}")]
    TargetPortMismatch {
        service: String,
        container_port: u16,
        target_port: u16,
    },

    #[error("Invalid autoscaling policy: {0}")]
    InvalidScaling(String),

    #[error("Container environment could not be serialized: {0}")]
    Environment(String),
}

/// A constructed stack and the outputs its dependents consume.
#[derive(Debug)]
pub struct Built<O> {
    pub stack: Stack,
    pub outputs: O,
}
