use aws_config::meta::region::RegionProviderChain;
use aws_types::region::Region;
use aws_types::SdkConfig;
use tracing::debug;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("No AWS region configured. Set `region` in the deployment config or AWS_REGION.")]
    MissingRegion,
}

/// SDK configuration for the configured region, falling back to the default
/// provider chain.
pub async fn load(region: Option<&str>) -> Result<SdkConfig, Error> {
    let region = match region {
        Some(provided_region) => Region::new(provided_region.to_string()),
        None => match RegionProviderChain::default_provider().region().await {
            Some(region) => region,
            None => return Err(Error::MissingRegion),
        },
    };

    debug!(region = %region, "loading AWS SDK configuration");
    let sdk_config = aws_config::from_env().region(region).load().await;

    return Ok(sdk_config);
}
