use serde::{Deserialize, Serialize};
use std::{env, fs, io, path::Path};
use validator::{Validate, ValidationError};

use crate::net::Ipv4Cidr;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("File {0} not found")]
    FileNotFound(String),

    #[error("Parsing error: {0}")]
    ParsingError(String),

    #[error("Validation errors: {0}")]
    ValidationError(String),

    #[error("Unknown error occurred: {0}")]
    Unknown(String),
}

/// Machine image lookup by name pattern and owning accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ImageQuery {
    #[validate(length(min = 1))]
    pub name: String,

    #[validate(length(min = 1))]
    pub owners: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NetworkConfig {
    #[validate(custom = "validate_cidr")]
    #[serde(default = "default_cidr")]
    pub cidr: String,

    #[validate(range(min = 1, max = 6))]
    #[serde(default = "default_max_azs")]
    pub max_azs: u8,

    #[validate]
    #[serde(default = "default_nat_image")]
    pub nat_image: ImageQuery,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            cidr: default_cidr(),
            max_azs: default_max_azs(),
            nat_image: default_nat_image(),
        }
    }
}

impl NetworkConfig {
    pub fn cidr_block(&self) -> Result<Ipv4Cidr, Error> {
        self.cidr
            .parse()
            .map_err(|error: crate::net::Error| Error::ValidationError(error.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DeploymentConfig {
    #[validate(custom = "validate_account")]
    pub account: Option<String>,

    pub region: Option<String>,

    #[validate(custom = "validate_certificate_arn")]
    pub certificate_arn: Option<String>,

    /// Container image shared by every service.
    #[validate(length(min = 1))]
    pub image: String,

    /// EC2 key pair for the NAT and cache instances.
    #[validate(length(min = 1))]
    pub key_pair: String,

    /// Stack-selection filter, e.g. `Network*` or `NetworkStack,DatabaseStack`.
    pub stacks: Option<String>,

    #[validate(length(min = 1))]
    #[serde(default = "default_cluster_name")]
    pub cluster_name: String,

    /// Address the frontend uses to reach the realtime service.
    #[validate(length(min = 1))]
    #[serde(default = "default_realtime_address")]
    pub realtime_address: String,

    #[validate]
    #[serde(default)]
    pub network: NetworkConfig,
}

impl DeploymentConfig {
    /// Fills account and region from `CDK_DEFAULT_ACCOUNT` / `CDK_DEFAULT_REGION`
    /// when the file leaves them out.
    pub fn with_environment_defaults(mut self) -> Self {
        if self.account.is_none() {
            self.account = env::var("CDK_DEFAULT_ACCOUNT").ok();
        }
        if self.region.is_none() {
            self.region = env::var("CDK_DEFAULT_REGION").ok();
        }
        self
    }
}

pub fn parse(path: &Path) -> Result<DeploymentConfig, Error> {
    let contents = match fs::read_to_string(path) {
        Ok(raw_contents) => Ok(raw_contents),
        Err(error) => match error.kind() {
            io::ErrorKind::NotFound => Err(Error::FileNotFound(path.display().to_string())),
            _ => Err(Error::Unknown(error.to_string())),
        },
    }?;

    let config: DeploymentConfig = match serde_yaml::from_str(&contents) {
        Ok(data) => Ok(data),
        Err(error) => Err(Error::ParsingError(error.to_string())),
    }?;

    let config = config.with_environment_defaults();
    match config.validate() {
        Ok(_) => (),
        Err(error) => return Err(Error::ValidationError(error.to_string())),
    }

    return Ok(config);
}

fn default_cidr() -> String {
    String::from("10.0.0.0/16")
}

fn default_max_azs() -> u8 {
    2
}

fn default_nat_image() -> ImageQuery {
    ImageQuery {
        name: String::from("fck-nat-al2023-*-arm64-ebs"),
        owners: vec![String::from("568608671756")],
    }
}

fn default_cluster_name() -> String {
    String::from("fayolex-cluster")
}

fn default_realtime_address() -> String {
    String::from("websocket:9000")
}

fn validate_cidr(cidr: &str) -> Result<(), ValidationError> {
    if cidr.parse::<Ipv4Cidr>().is_err() {
        return Err(ValidationError::new(
            "The network CIDR has to be an aligned IPv4 block like `10.0.0.0/16`",
        ));
    }

    return Ok(());
}

fn validate_account(account: &str) -> Result<(), ValidationError> {
    if account.len() != 12 || !account.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::new(
            "The AWS account id has to be exactly 12 digits",
        ));
    }

    return Ok(());
}

fn validate_certificate_arn(arn: &str) -> Result<(), ValidationError> {
    let parts: Vec<&str> = arn.splitn(6, ':').collect();
    if parts.len() != 6 || parts[0] != "arn" || parts[2] != "acm" || !parts[5].starts_with("certificate/") {
        return Err(ValidationError::new(
            "The certificate has to be an ACM ARN like `arn:aws:acm:<region>:<account>:certificate/<id>`",
        ));
    }

    return Ok(());
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::io::Write;

    use super::parse;
    use super::Error;
    use tempfile::tempdir;

    const VALID: &str = r#"
account: "968874455930"
region: ap-southeast-3
certificate_arn: arn:aws:acm:ap-southeast-3:968874455930:certificate/73c33d82-4a42-43fe-87fe-1b57b3a66c20
image: 968874455930.dkr.ecr.ap-southeast-3.amazonaws.com/fayolex:latest
key_pair: YSA
"#;

    fn write_config(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("deploy.yaml");

        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "{}", contents).unwrap();
        (dir, file_path)
    }

    #[test]
    fn file_does_not_exist() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("deploy.yaml");

        let result = parse(&file_path);
        assert_eq!(true, result.is_err());
        match result.err().unwrap() {
            Error::FileNotFound(_) => {}
            _ => panic!("Expected `FileNotFound` error"),
        }
    }

    #[test]
    fn file_wrong_format() {
        let (_dir, file_path) = write_config("Not yaml");

        let result = parse(&file_path);
        assert_eq!(true, result.is_err());
        match result.err().unwrap() {
            Error::ParsingError(_) => {}
            _ => panic!("Expected `ParsingError` error"),
        }
    }

    #[test]
    fn parses_the_config_with_defaults() {
        let (_dir, file_path) = write_config(VALID);

        let config = parse(&file_path).unwrap();
        assert_eq!("YSA", config.key_pair);
        assert_eq!("10.0.0.0/16", config.network.cidr);
        assert_eq!(2, config.network.max_azs);
        assert_eq!("fck-nat-al2023-*-arm64-ebs", config.network.nat_image.name);
        assert_eq!("fayolex-cluster", config.cluster_name);
        assert_eq!("websocket:9000", config.realtime_address);
        assert_eq!(None, config.stacks);
    }

    #[test]
    fn account_and_region_fall_back_to_cdk_environment() {
        std::env::set_var("CDK_DEFAULT_ACCOUNT", "111122223333");
        std::env::set_var("CDK_DEFAULT_REGION", "eu-west-1");

        let contents = VALID
            .replace("account: \"968874455930\"\n", "")
            .replace("region: ap-southeast-3\n", "");
        let (_dir, file_path) = write_config(&contents);
        let config = parse(&file_path).unwrap();
        assert_eq!(Some("111122223333"), config.account.as_deref());
        assert_eq!(Some("eu-west-1"), config.region.as_deref());

        let (_dir, file_path) = write_config(VALID);
        let config = parse(&file_path).unwrap();
        assert_eq!(Some("968874455930"), config.account.as_deref());
        assert_eq!(Some("ap-southeast-3"), config.region.as_deref());

        std::env::remove_var("CDK_DEFAULT_ACCOUNT");
        std::env::remove_var("CDK_DEFAULT_REGION");
    }

    #[test]
    fn invalid_cidr_fails_validation() {
        let contents = format!("{}network:\n  cidr: 10.0.0.1/16\n", VALID);
        let (_dir, file_path) = write_config(&contents);

        match parse(&file_path).err().unwrap() {
            Error::ValidationError(_) => {}
            _ => panic!("Expected `ValidationError` error"),
        }
    }

    #[test]
    fn malformed_certificate_fails_validation() {
        let contents = VALID.replace(
            "arn:aws:acm:ap-southeast-3:968874455930:certificate/73c33d82-4a42-43fe-87fe-1b57b3a66c20",
            "arn:aws:iam::968874455930:role/nope",
        );
        let (_dir, file_path) = write_config(&contents);

        match parse(&file_path).err().unwrap() {
            Error::ValidationError(_) => {}
            _ => panic!("Expected `ValidationError` error"),
        }
    }

    #[test]
    fn empty_owner_list_fails_validation() {
        let contents = format!(
            "{}network:\n  nat_image:\n    name: fck-nat-*\n    owners: []\n",
            VALID
        );
        let (_dir, file_path) = write_config(&contents);

        match parse(&file_path).err().unwrap() {
            Error::ValidationError(_) => {}
            _ => panic!("Expected `ValidationError` error"),
        }
    }
}
