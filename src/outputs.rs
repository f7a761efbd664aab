//! Reads CloudFormation outputs back from deployed stacks.

use aws_types::SdkConfig;
use futures::future::join_all;
use tracing::{debug, warn};

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("Service error occurred: {0}")]
    ServiceError(String),

    #[error("Unknown error occurred: {0}")]
    UnknownError(String),

    #[error("Stack {0} not found")]
    NotFoundError(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackOutput {
    pub key: String,
    pub value: String,
    pub export_name: Option<String>,
}

pub struct DeployedStack {
    pub stack_name: String,

    client: aws_sdk_cloudformation::Client,
}

impl DeployedStack {
    pub fn new(stack_name: &str, sdk_config: &SdkConfig) -> Self {
        let client = aws_sdk_cloudformation::Client::new(sdk_config);

        return Self {
            stack_name: stack_name.to_string(),
            client,
        };
    }

    pub async fn get_outputs(&self) -> Result<Vec<StackOutput>, Error> {
        debug!(stack = %self.stack_name, "describing stack");
        let result = self
            .client
            .describe_stacks()
            .stack_name(&self.stack_name)
            .send()
            .await;

        let result = match result {
            Ok(data) => data,
            Err(aws_sdk_cloudformation::types::SdkError::ServiceError { err, .. }) => {
                return Err(Error::ServiceError(err.to_string()));
            }
            Err(err) => return Err(Error::UnknownError(err.to_string())),
        };

        let stack = match result.stacks().unwrap_or_default().first() {
            Some(stack) => stack,
            None => return Err(Error::NotFoundError(self.stack_name.clone())),
        };

        let mut outputs = Vec::new();
        for output in stack.outputs().unwrap_or_default() {
            match (output.output_key(), output.output_value()) {
                (Some(key), Some(value)) => outputs.push(StackOutput {
                    key: key.to_string(),
                    value: value.to_string(),
                    export_name: output.export_name().map(str::to_string),
                }),
                _ => warn!(stack = %self.stack_name, "skipping output without a key or value"),
            }
        }

        return Ok(outputs);
    }
}

/// Fetches every stack's outputs concurrently, preserving the input order.
pub async fn fetch_all(stacks: &[DeployedStack]) -> Vec<Result<Vec<StackOutput>, Error>> {
    join_all(stacks.iter().map(|stack| stack.get_outputs())).await
}

/// Operator-facing outputs only; exports exist for other stacks to import.
pub fn operator_outputs(outputs: Vec<StackOutput>) -> Vec<StackOutput> {
    outputs
        .into_iter()
        .filter(|output| output.export_name.is_none())
        .collect()
}
