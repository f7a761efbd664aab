//! CLI command definitions.

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use fayolex_infra::config::{self, DeploymentConfig};
use fayolex_infra::context::LookupContext;
use fayolex_infra::selection;

pub mod list;
pub mod lookup;
pub mod outputs;
pub mod synth;

/// Compose the Fayolex deployment into CloudFormation stacks
#[derive(Parser)]
#[command(name = "fayolex-infra")]
#[command(version, about = "Compose the Fayolex deployment into CloudFormation stacks")]
#[command(long_about = r#"
Builds the network, database, storage, load balancer, compute and service
stacks from a deployment config and writes them as a cloud assembly.

COMMANDS:
  synth    → Write templates and manifest.json for the selected stacks
  list     → Print the selected stacks by deployment layer
  lookup   → Refresh cached machine image lookups from EC2
  outputs  → Fetch outputs of deployed stacks into JSON and dotenv files

EXIT CODES:
  0 - Success
  1 - General error
  3 - Configuration or validation failure
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Synthesize the cloud assembly
    Synth(synth::SynthArgs),

    /// List stacks, their dependencies and deployment layers
    List(list::ListArgs),

    /// Cache machine image lookups in the context file
    Lookup(lookup::LookupArgs),

    /// Read outputs of deployed stacks
    Outputs(outputs::OutputsArgs),
}

#[derive(Args)]
pub struct CommonArgs {
    /// Deployment config file
    #[arg(short, long, env = "FAYOLEX_CONFIG", default_value = "deploy.yaml")]
    pub config: PathBuf,

    /// Lookup context file
    #[arg(long, env = "FAYOLEX_CONTEXT", default_value = "context.yaml")]
    pub context: PathBuf,

    /// Stack filter, e.g. `Network*` or `NetworkStack,ServiceStack`
    #[arg(short, long, env = "STACKS")]
    pub stacks: Option<String>,
}

impl CommonArgs {
    pub fn load_config(&self) -> Result<DeploymentConfig> {
        config::parse(&self.config)
            .with_context(|| format!("Failed to load deployment config {}", self.config.display()))
    }

    pub fn load_context(&self) -> Result<LookupContext> {
        LookupContext::load(&self.context)
            .with_context(|| format!("Failed to load lookup context {}", self.context.display()))
    }

    /// The command-line filter wins over the one in the config file.
    pub fn select<'a, I>(&self, config: &DeploymentConfig, names: I) -> Result<BTreeSet<String>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let filter = self.stacks.as_deref().or(config.stacks.as_deref());
        selection::select_stacks(names, filter).context("Invalid stack filter")
    }
}
