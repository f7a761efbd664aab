//! Outputs command - fetch deployed stack outputs.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use fayolex_infra::outputs::{self, DeployedStack};
use fayolex_infra::{aws, topology, writer};

use super::CommonArgs;

#[derive(Args)]
pub struct OutputsArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Write outputs as a JSON map
    #[arg(long)]
    json: Option<PathBuf>,

    /// Write outputs as a dotenv file
    #[arg(long)]
    env: Option<PathBuf>,
}

pub async fn execute(args: OutputsArgs) -> Result<()> {
    let config = args.common.load_config()?;
    let selected = args.common.select(&config, topology::STACK_NAMES)?;

    let sdk_config = aws::load(config.region.as_deref()).await?;
    let stacks: Vec<DeployedStack> = selected
        .iter()
        .map(|name| DeployedStack::new(name, &sdk_config))
        .collect();

    let mut collected = Vec::new();
    for (stack, result) in stacks.iter().zip(outputs::fetch_all(&stacks).await) {
        let stack_outputs =
            result.with_context(|| format!("Failed to read outputs of {}", stack.stack_name))?;
        info!(stack = %stack.stack_name, count = stack_outputs.len(), "fetched outputs");
        collected.extend(outputs::operator_outputs(stack_outputs));
    }

    if let Some(path) = &args.json {
        writer::write_json(path, &collected)?;
        println!("Wrote {}", path.display());
    }
    if let Some(path) = &args.env {
        writer::write_env(path, &collected)?;
        println!("Wrote {}", path.display());
    }
    if args.json.is_none() && args.env.is_none() {
        for output in &collected {
            println!("{} = {}", output.key, output.value);
        }
    }

    Ok(())
}
