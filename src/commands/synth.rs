//! Synth command - write the cloud assembly.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use fayolex_infra::{assembly, topology};

use super::CommonArgs;

#[derive(Args)]
pub struct SynthArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Output directory for templates and manifest.json
    #[arg(short, long, default_value = "cdk.out")]
    out: PathBuf,
}

pub fn execute(args: SynthArgs) -> Result<()> {
    let config = args.common.load_config()?;
    let context = args.common.load_context()?;

    let topology = topology::compose(&config, &context).context("Topology validation failed")?;
    let selected = args.common.select(&config, topology.assembly.names())?;
    info!(stacks = ?selected, out = %args.out.display(), "synthesizing");

    let environment = assembly::environment(config.account.as_deref(), config.region.as_deref());
    let manifest = topology
        .assembly
        .write(&args.out, &selected, &environment)
        .with_context(|| format!("Failed to write assembly to {}", args.out.display()))?;

    for (index, layer) in manifest.deployment_order.iter().enumerate() {
        println!("{}: {}", index, layer.join(", "));
    }
    println!("Wrote {} stack(s) to {}", manifest.stacks.len(), args.out.display());

    Ok(())
}
