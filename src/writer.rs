use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::outputs::StackOutput;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("Serialization error: {0}")]
    ParsingError(String),

    #[error("Could not write {path}: {reason}")]
    WriteError { path: String, reason: String },
}

/// `{ "OutputKey": "value" }` across every stack.
pub fn write_json(path: &Path, outputs: &[StackOutput]) -> Result<(), Error> {
    let contents = outputs.iter().fold(BTreeMap::new(), |mut acc, output| {
        acc.insert(output.key.as_str(), output.value.as_str());
        return acc;
    });

    let file_contents = match serde_json::to_string_pretty(&contents) {
        Ok(file_contents) => file_contents,
        Err(error) => return Err(Error::ParsingError(error.to_string())),
    };
    write(path, file_contents)
}

/// One `OUTPUT_KEY=value` line per output, for sourcing into a shell.
pub fn write_env(path: &Path, outputs: &[StackOutput]) -> Result<(), Error> {
    let contents = outputs.iter().fold(String::new(), |mut acc, output| {
        let entry = format!("{}={}\n", env_key(&output.key), output.value);

        acc.push_str(&entry);
        return acc;
    });

    write(path, contents)
}

/// `PublicLoadBalancerDns` -> `PUBLIC_LOAD_BALANCER_DNS`.
pub fn env_key(output_key: &str) -> String {
    let mut key = String::new();
    let mut previous: Option<char> = None;

    for c in output_key.chars() {
        if !c.is_ascii_alphanumeric() {
            if !key.is_empty() && !key.ends_with('_') {
                key.push('_');
            }
            previous = None;
            continue;
        }

        let boundary = match previous {
            Some(p) => c.is_ascii_uppercase() && (p.is_ascii_lowercase() || p.is_ascii_digit()),
            None => false,
        };
        if boundary && !key.ends_with('_') {
            key.push('_');
        }
        key.push(c.to_ascii_uppercase());
        previous = Some(c);
    }

    key
}

fn write(path: &Path, contents: String) -> Result<(), Error> {
    match fs::write(path, contents) {
        Ok(_) => Ok(()),
        Err(error) => Err(Error::WriteError {
            path: path.display().to_string(),
            reason: error.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::{env_key, write_env, write_json};
    use crate::outputs::StackOutput;

    fn outputs() -> Vec<StackOutput> {
        vec![
            StackOutput {
                key: String::from("VpcId"),
                value: String::from("vpc-0abc"),
                export_name: None,
            },
            StackOutput {
                key: String::from("PublicLoadBalancerDns"),
                value: String::from("public-alb-123.ap-southeast-3.elb.amazonaws.com"),
                export_name: None,
            },
        ]
    }

    #[test]
    fn converts_output_keys_to_env_names() {
        assert_eq!("PUBLIC_LOAD_BALANCER_DNS", env_key("PublicLoadBalancerDns"));
        assert_eq!("VPC_ID", env_key("VpcId"));
        assert_eq!("REDIS_ADDRESS", env_key("Redis-Address"));
        assert_eq!("ALB2_DNS", env_key("Alb2Dns"));
    }

    #[test]
    fn writes_json_map() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("outputs.json");

        write_json(&path, &outputs()).unwrap();

        let written: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!("vpc-0abc", written["VpcId"]);
        assert_eq!(2, written.as_object().unwrap().len());
    }

    #[test]
    fn writes_dotenv_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".env");

        write_env(&path, &outputs()).unwrap();

        assert_eq!(
            "VPC_ID=vpc-0abc\nPUBLIC_LOAD_BALANCER_DNS=public-alb-123.ap-southeast-3.elb.amazonaws.com\n",
            fs::read_to_string(&path).unwrap()
        );
    }

    #[test]
    fn reports_unwritable_paths() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("outputs.json");

        assert!(write_json(&path, &outputs()).is_err());
    }
}
