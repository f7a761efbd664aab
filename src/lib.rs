//! Composes the Fayolex AWS deployment into CloudFormation stacks.
//!
//! Six stacks are built from a YAML deployment config: network, database,
//! storage, load balancers, compute and the services on top. Cross-stack
//! references travel as CloudFormation exports, and the stacks are written as
//! a cloud assembly with a manifest that orders them for deployment.

pub mod assembly;
pub mod aws;
pub mod config;
pub mod context;
pub mod graph;
pub mod iam;
pub mod net;
pub mod outputs;
pub mod selection;
pub mod stack;
pub mod stacks;
pub mod template;
pub mod topology;
pub mod writer;
