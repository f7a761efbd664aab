//! CloudFormation template model.
//!
//! Stacks only ever build these descriptors; nothing here talks to AWS.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Value};

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("Logical id `{0}` is already defined in the template")]
    DuplicateLogicalId(String),

    #[error("Logical id `{0}` must be non-empty and alphanumeric")]
    InvalidLogicalId(String),

    #[error("Resource `{0}` does not exist in the template")]
    UnknownResource(String),
}

/// What happens to a resource when it is removed from its stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RemovalPolicy {
    Retain,
    #[serde(rename = "Delete")]
    Destroy,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Resource {
    #[serde(rename = "Type")]
    pub resource_type: String,

    pub properties: Value,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<RemovalPolicy>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_replace_policy: Option<RemovalPolicy>,
}

impl Resource {
    pub fn new(resource_type: &str, properties: Value) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            properties,
            depends_on: Vec::new(),
            deletion_policy: None,
            update_replace_policy: None,
        }
    }

    pub fn depends_on(mut self, logical_id: &str) -> Self {
        self.depends_on.push(logical_id.to_string());
        self
    }

    pub fn with_removal_policy(mut self, policy: RemovalPolicy) -> Self {
        self.deletion_policy = Some(policy);
        self.update_replace_policy = Some(policy);
        self
    }

    pub fn removal_policy(&self) -> Option<RemovalPolicy> {
        self.deletion_policy
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Export {
    #[serde(rename = "Name")]
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Output {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub value: Value,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub export: Option<Export>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    format_version: &'static str,

    #[serde(rename = "Description")]
    description: String,

    #[serde(rename = "Resources")]
    resources: BTreeMap<String, Resource>,

    #[serde(rename = "Outputs", skip_serializing_if = "BTreeMap::is_empty")]
    outputs: BTreeMap<String, Output>,
}

impl Template {
    pub fn new(description: &str) -> Self {
        Self {
            format_version: "2010-09-09",
            description: description.to_string(),
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    pub fn add_resource(&mut self, logical_id: &str, resource: Resource) -> Result<(), Error> {
        validate_logical_id(logical_id)?;
        if self.resources.contains_key(logical_id) {
            return Err(Error::DuplicateLogicalId(logical_id.to_string()));
        }

        self.resources.insert(logical_id.to_string(), resource);
        return Ok(());
    }

    /// Adds an output. Re-adding the same id replaces the previous value.
    pub fn add_output(&mut self, logical_id: &str, output: Output) -> Result<(), Error> {
        validate_logical_id(logical_id)?;
        self.outputs.insert(logical_id.to_string(), output);
        return Ok(());
    }

    pub fn resource(&self, logical_id: &str) -> Option<&Resource> {
        self.resources.get(logical_id)
    }

    pub fn resources_of_type<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a Resource)> + 'a {
        self.resources
            .iter()
            .filter(move |(_, resource)| resource.resource_type == resource_type)
    }

    pub fn outputs(&self) -> &BTreeMap<String, Output> {
        &self.outputs
    }

    pub fn to_json(&self) -> Value {
        // Every field is plain data; serialization cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn validate_logical_id(logical_id: &str) -> Result<(), Error> {
    if logical_id.is_empty() || !logical_id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(Error::InvalidLogicalId(logical_id.to_string()));
    }
    Ok(())
}

/// Intrinsic functions and pseudo parameters.
pub mod fns {
    use serde_json::{json, Value};

    pub fn reference(logical_id: &str) -> Value {
        json!({ "Ref": logical_id })
    }

    pub fn get_att(logical_id: &str, attribute: &str) -> Value {
        json!({ "Fn::GetAtt": [logical_id, attribute] })
    }

    pub fn import_value(export_name: &str) -> Value {
        json!({ "Fn::ImportValue": export_name })
    }

    pub fn join(separator: &str, parts: Vec<Value>) -> Value {
        json!({ "Fn::Join": [separator, parts] })
    }

    pub fn select(index: usize, list: Value) -> Value {
        json!({ "Fn::Select": [index, list] })
    }

    pub fn get_azs() -> Value {
        json!({ "Fn::GetAZs": "" })
    }

    pub fn base64(value: Value) -> Value {
        json!({ "Fn::Base64": value })
    }

    pub fn region() -> Value {
        reference("AWS::Region")
    }

    pub fn account_id() -> Value {
        reference("AWS::AccountId")
    }

    pub fn partition() -> Value {
        reference("AWS::Partition")
    }
}

/// `[{Key: Name, Value: ...}]`, the tag shape most resource types accept.
pub fn name_tag(name: &str) -> Value {
    json!([{ "Key": "Name", "Value": name }])
}
