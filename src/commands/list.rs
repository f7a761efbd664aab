//! List command - show the selected stacks by deployment layer.

use anyhow::{Context, Result};
use clap::Args;

use fayolex_infra::topology;

use super::CommonArgs;

#[derive(Args)]
pub struct ListArgs {
    #[command(flatten)]
    common: CommonArgs,
}

pub fn execute(args: ListArgs) -> Result<()> {
    let config = args.common.load_config()?;
    let context = args.common.load_context()?;

    let topology = topology::compose(&config, &context).context("Topology validation failed")?;
    let selected = args.common.select(&config, topology.assembly.names())?;

    for (index, layer) in topology.layers.iter().enumerate() {
        for name in layer.iter().filter(|name| selected.contains(*name)) {
            let dependencies = topology
                .assembly
                .stack(name)
                .map(|stack| stack.dependencies().iter().cloned().collect::<Vec<_>>())
                .unwrap_or_default();

            if dependencies.is_empty() {
                println!("[{}] {}", index, name);
            } else {
                println!("[{}] {} <- {}", index, name, dependencies.join(", "));
            }
        }
    }

    Ok(())
}
