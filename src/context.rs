//! Cached lookups resolved against the AWS account.
//!
//! Synthesis reads only this file, so it stays offline and deterministic; the
//! `lookup` command refreshes it from EC2.

use std::{fs, io, path::Path};

use aws_sdk_ec2::model::Filter;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::ImageQuery;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("Parsing error: {0}")]
    ParsingError(String),

    #[error("Unknown error occurred: {0}")]
    Unknown(String),

    #[error("No cached lookup for image `{name}` in {region}; run `lookup` first")]
    NotCached { name: String, region: String },

    #[error("No machine image matches `{0}`")]
    NoMatch(String),

    #[error("Image lookup `{name}` is ambiguous: {candidates:?}")]
    Ambiguous { name: String, candidates: Vec<String> },

    #[error("Service error occurred: {0}")]
    ServiceError(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineImage {
    pub image_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ImageLookup {
    region: Option<String>,
    query: ImageQuery,
    candidates: Vec<MachineImage>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LookupContext {
    #[serde(default)]
    machine_images: Vec<ImageLookup>,
}

impl LookupContext {
    /// A missing file is an empty context.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let contents = match fs::read_to_string(path) {
            Ok(raw_contents) => raw_contents,
            Err(error) => match error.kind() {
                io::ErrorKind::NotFound => {
                    debug!(path = %path.display(), "no lookup context yet");
                    return Ok(Self::default());
                }
                _ => return Err(Error::Unknown(error.to_string())),
            },
        };

        return match serde_yaml::from_str(&contents) {
            Ok(context) => Ok(context),
            Err(error) => Err(Error::ParsingError(error.to_string())),
        };
    }

    pub fn save(&self, path: &Path) -> Result<(), Error> {
        let contents = match serde_yaml::to_string(self) {
            Ok(contents) => contents,
            Err(error) => return Err(Error::ParsingError(error.to_string())),
        };

        match fs::write(path, contents) {
            Ok(_) => Ok(()),
            Err(error) => Err(Error::Unknown(error.to_string())),
        }
    }

    /// Replaces any earlier result for the same query and region.
    pub fn record(&mut self, region: Option<&str>, query: &ImageQuery, candidates: Vec<MachineImage>) {
        let region = region.map(str::to_string);
        self.machine_images
            .retain(|lookup| !(lookup.region == region && &lookup.query == query));
        self.machine_images.push(ImageLookup {
            region,
            query: query.clone(),
            candidates,
        });
    }

    /// Resolves a query to exactly one image. Zero or several candidates are
    /// an error, never a guess.
    pub fn machine_image(&self, region: Option<&str>, query: &ImageQuery) -> Result<MachineImage, Error> {
        let lookup = self
            .machine_images
            .iter()
            .find(|lookup| lookup.region.as_deref() == region && &lookup.query == query)
            .ok_or_else(|| Error::NotCached {
                name: query.name.clone(),
                region: region.unwrap_or("the default region").to_string(),
            })?;

        match lookup.candidates.as_slice() {
            [] => Err(Error::NoMatch(query.name.clone())),
            [image] => Ok(image.clone()),
            candidates => Err(Error::Ambiguous {
                name: query.name.clone(),
                candidates: candidates.iter().map(|image| image.image_id.clone()).collect(),
            }),
        }
    }
}

/// Queries EC2 for images matching the query.
pub async fn describe_images(
    client: &aws_sdk_ec2::Client,
    query: &ImageQuery,
) -> Result<Vec<MachineImage>, Error> {
    info!(name = %query.name, owners = ?query.owners, "looking up machine images");

    let result = client
        .describe_images()
        .set_owners(Some(query.owners.clone()))
        .filters(Filter::builder().name("name").values(&query.name).build())
        .filters(Filter::builder().name("state").values("available").build())
        .send()
        .await;

    let result = match result {
        Ok(data) => data,
        Err(aws_sdk_ec2::types::SdkError::ServiceError { err, .. }) => {
            return Err(Error::ServiceError(err.to_string()));
        }
        Err(err) => return Err(Error::Unknown(err.to_string())),
    };

    let images = result
        .images()
        .unwrap_or_else(|| &[])
        .iter()
        .filter_map(|image| {
            Some(MachineImage {
                image_id: image.image_id()?.to_string(),
                name: image.name().unwrap_or_default().to_string(),
            })
        })
        .collect();

    return Ok(images);
}
