//! A named stack and the handles it hands to its dependents.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::template::{fns, Error, Export, Output, Resource, Template};

/// Reference to a resource (or one of its attributes) owned by a stack.
///
/// Inside the owning stack a handle resolves to `Ref`/`Fn::GetAtt`; anywhere
/// else it resolves to an `Fn::ImportValue` of the export the owner declared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle {
    stack: String,
    logical_id: String,
    attribute: Option<String>,
}

impl Handle {
    pub fn export_name(&self) -> String {
        match &self.attribute {
            Some(attribute) => format!("{}:{}:{}", self.stack, self.logical_id, attribute),
            None => format!("{}:{}", self.stack, self.logical_id),
        }
    }

    fn output_id(&self) -> String {
        let attribute: String = self
            .attribute
            .as_deref()
            .unwrap_or("Ref")
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        format!("Export{}{}", self.logical_id, attribute)
    }

    fn local_value(&self) -> Value {
        match &self.attribute {
            Some(attribute) => fns::get_att(&self.logical_id, attribute),
            None => fns::reference(&self.logical_id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Stack {
    name: String,
    template: Template,
    dependencies: BTreeSet<String>,
    imports: BTreeSet<String>,
}

impl Stack {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            template: Template::new(description),
            dependencies: BTreeSet::new(),
            imports: BTreeSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn dependencies(&self) -> &BTreeSet<String> {
        &self.dependencies
    }

    /// Stacks whose exports this stack consumes.
    pub fn imports(&self) -> &BTreeSet<String> {
        &self.imports
    }

    pub fn add_dependency(&mut self, other: &Stack) {
        self.depend_on(other.name());
    }

    pub fn depend_on(&mut self, stack_name: &str) {
        self.dependencies.insert(stack_name.to_string());
    }

    pub fn add(&mut self, logical_id: &str, resource: Resource) -> Result<(), Error> {
        self.template.add_resource(logical_id, resource)
    }

    /// Plain output for operators, read back by the `outputs` command.
    pub fn add_output(&mut self, logical_id: &str, description: &str, value: Value) -> Result<(), Error> {
        self.template.add_output(
            logical_id,
            Output {
                description: Some(description.to_string()),
                value,
                export: None,
            },
        )
    }

    pub fn export(&mut self, logical_id: &str) -> Result<Handle, Error> {
        self.export_handle(logical_id, None)
    }

    pub fn export_attribute(&mut self, logical_id: &str, attribute: &str) -> Result<Handle, Error> {
        self.export_handle(logical_id, Some(attribute))
    }

    fn export_handle(&mut self, logical_id: &str, attribute: Option<&str>) -> Result<Handle, Error> {
        if self.template.resource(logical_id).is_none() {
            return Err(Error::UnknownResource(logical_id.to_string()));
        }

        let handle = Handle {
            stack: self.name.clone(),
            logical_id: logical_id.to_string(),
            attribute: attribute.map(str::to_string),
        };
        self.template.add_output(
            &handle.output_id(),
            Output {
                description: None,
                value: handle.local_value(),
                export: Some(Export {
                    name: handle.export_name(),
                }),
            },
        )?;

        return Ok(handle);
    }

    /// Resolves a handle for use in this stack's template.
    pub fn resolve(&mut self, handle: &Handle) -> Value {
        if handle.stack == self.name {
            return handle.local_value();
        }

        self.imports.insert(handle.stack.clone());
        fns::import_value(&handle.export_name())
    }

    pub fn resolve_all(&mut self, handles: &[Handle]) -> Vec<Value> {
        handles.iter().map(|handle| self.resolve(handle)).collect()
    }
}
