//! IAM roles as template resources.

use serde_json::{json, Value};

use crate::template::{fns, Resource};

#[derive(Debug, Clone)]
pub struct PolicyStatement {
    pub actions: Vec<&'static str>,
    pub resources: Vec<Value>,
}

impl PolicyStatement {
    pub fn allow(actions: &[&'static str], resources: Vec<Value>) -> Self {
        Self {
            actions: actions.to_vec(),
            resources,
        }
    }

    fn to_json(&self) -> Value {
        json!({
            "Effect": "Allow",
            "Action": self.actions,
            "Resource": self.resources,
        })
    }
}

/// A role assumed by one AWS service principal.
#[derive(Debug, Clone)]
pub struct Role {
    service: &'static str,
    managed_policies: Vec<&'static str>,
    statements: Vec<PolicyStatement>,
}

impl Role {
    pub fn assumed_by(service: &'static str) -> Self {
        Self {
            service,
            managed_policies: Vec::new(),
            statements: Vec::new(),
        }
    }

    pub fn with_managed_policy(mut self, name: &'static str) -> Self {
        self.managed_policies.push(name);
        self
    }

    pub fn with_statement(mut self, statement: PolicyStatement) -> Self {
        self.statements.push(statement);
        self
    }

    pub fn to_resource(&self, logical_id: &str) -> Resource {
        let mut properties = json!({
            "AssumeRolePolicyDocument": {
                "Version": "2012-10-17",
                "Statement": [{
                    "Effect": "Allow",
                    "Principal": { "Service": self.service },
                    "Action": "sts:AssumeRole",
                }],
            },
            "ManagedPolicyArns": self
                .managed_policies
                .iter()
                .map(|name| managed_policy_arn(name))
                .collect::<Vec<_>>(),
        });

        if !self.statements.is_empty() {
            properties["Policies"] = json!([{
                "PolicyName": format!("{}DefaultPolicy", logical_id),
                "PolicyDocument": {
                    "Version": "2012-10-17",
                    "Statement": self.statements.iter().map(PolicyStatement::to_json).collect::<Vec<_>>(),
                },
            }]);
        }

        Resource::new("AWS::IAM::Role", properties)
    }
}

pub fn managed_policy_arn(name: &str) -> Value {
    fns::join(
        "",
        vec![
            json!("arn:"),
            fns::partition(),
            json!(format!(":iam::aws:policy/{}", name)),
        ],
    )
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{PolicyStatement, Role};

    #[test]
    fn renders_trust_policy_managed_policies_and_statements() {
        let role = Role::assumed_by("ecs-tasks.amazonaws.com")
            .with_managed_policy("AmazonEC2ContainerRegistryReadOnly")
            .with_statement(PolicyStatement::allow(&["ecr:BatchGetImage"], vec![json!("*")]));

        let properties = role.to_resource("TaskRole").properties;
        assert_eq!(
            "ecs-tasks.amazonaws.com",
            properties["AssumeRolePolicyDocument"]["Statement"][0]["Principal"]["Service"]
        );
        assert_eq!(
            ":iam::aws:policy/AmazonEC2ContainerRegistryReadOnly",
            properties["ManagedPolicyArns"][0]["Fn::Join"][1][2]
        );
        assert_eq!("TaskRoleDefaultPolicy", properties["Policies"][0]["PolicyName"]);
        assert_eq!(
            json!(["ecr:BatchGetImage"]),
            properties["Policies"][0]["PolicyDocument"]["Statement"][0]["Action"]
        );
    }

    #[test]
    fn omits_inline_policy_without_statements() {
        let role = Role::assumed_by("monitoring.rds.amazonaws.com");
        assert!(role.to_resource("MonitoringRole").properties.get("Policies").is_none());
    }
}
