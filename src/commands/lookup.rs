//! Lookup command - cache EC2 image lookups for offline synthesis.

use anyhow::{Context, Result};
use clap::Args;
use tracing::{info, warn};

use fayolex_infra::{aws, context};

use super::CommonArgs;

#[derive(Args)]
pub struct LookupArgs {
    #[command(flatten)]
    common: CommonArgs,
}

pub async fn execute(args: LookupArgs) -> Result<()> {
    let config = args.common.load_config()?;
    let mut lookup_context = args.common.load_context()?;

    let sdk_config = aws::load(config.region.as_deref()).await?;
    let client = aws_sdk_ec2::Client::new(&sdk_config);

    let query = &config.network.nat_image;
    let candidates = context::describe_images(&client, query)
        .await
        .with_context(|| format!("Failed to look up image `{}`", query.name))?;

    match candidates.len() {
        0 => warn!(name = %query.name, "no image matches; synthesis will fail until one does"),
        1 => info!(name = %query.name, image = %candidates[0].image_id, "resolved image"),
        count => warn!(name = %query.name, count, "several images match; narrow the query before synthesizing"),
    }

    lookup_context.record(config.region.as_deref(), query, candidates);
    lookup_context
        .save(&args.common.context)
        .with_context(|| format!("Failed to save lookup context {}", args.common.context.display()))?;
    println!("Updated {}", args.common.context.display());

    Ok(())
}
