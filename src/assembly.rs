//! The cloud assembly: every composed stack, validated as a graph, and the
//! directory of templates plus `manifest.json` that deployment tooling reads.

use std::collections::{BTreeMap, BTreeSet};
use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::graph::{self, Edges};
use crate::stack::Stack;

pub const MANIFEST_FILE: &str = "manifest.json";
const MANIFEST_VERSION: &str = "1.0";

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("Stack `{0}` is defined more than once")]
    DuplicateStack(String),

    #[error("Stack `{stack}` imports from `{producer}` without depending on it")]
    UndeclaredImport { stack: String, producer: String },

    #[error(transparent)]
    Graph(#[from] graph::Error),

    #[error("Parsing error: {0}")]
    ParsingError(String),

    #[error("Unknown error occurred: {0}")]
    Unknown(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub template_file: String,
    pub dependencies: Vec<String>,
    pub environment: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub version: String,
    pub stacks: BTreeMap<String, ManifestEntry>,
    /// Selected stacks grouped into layers that may deploy in parallel.
    pub deployment_order: Vec<Vec<String>>,
}

/// `aws://account/region`, with the placeholders used for environment-agnostic
/// stacks when either is unknown.
pub fn environment(account: Option<&str>, region: Option<&str>) -> String {
    format!(
        "aws://{}/{}",
        account.unwrap_or("unknown-account"),
        region.unwrap_or("unknown-region")
    )
}

pub fn template_file(stack_name: &str) -> String {
    format!("{}.template.json", stack_name)
}

#[derive(Debug, Default)]
pub struct Assembly {
    stacks: BTreeMap<String, Stack>,
}

impl Assembly {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, stack: Stack) -> Result<(), Error> {
        if self.stacks.contains_key(stack.name()) {
            return Err(Error::DuplicateStack(stack.name().to_string()));
        }
        self.stacks.insert(stack.name().to_string(), stack);
        Ok(())
    }

    pub fn stack(&self, name: &str) -> Option<&Stack> {
        self.stacks.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stacks.keys().map(String::as_str)
    }

    pub fn edges(&self) -> Edges {
        self.stacks
            .iter()
            .map(|(name, stack)| (name.clone(), stack.dependencies().clone()))
            .collect()
    }

    /// Checks that every import is backed by a declared dependency and that
    /// the dependencies form a DAG. Returns the deployment layers.
    pub fn validate(&self) -> Result<Vec<Vec<String>>, Error> {
        for stack in self.stacks.values() {
            if let Some(producer) = stack
                .imports()
                .iter()
                .find(|producer| !stack.dependencies().contains(*producer))
            {
                return Err(Error::UndeclaredImport {
                    stack: stack.name().to_string(),
                    producer: producer.clone(),
                });
            }
        }

        let layers = graph::plan_layers(&self.edges())?;
        debug!(layers = ?layers, "planned deployment layers");
        Ok(layers)
    }

    /// Writes the selected stacks' templates and the manifest into `out_dir`.
    pub fn write(&self, out_dir: &Path, selected: &BTreeSet<String>, environment: &str) -> Result<Manifest, Error> {
        let layers = self.validate()?;

        for name in selected {
            if let Some(stack) = self.stacks.get(name) {
                for dependency in stack.dependencies().difference(selected) {
                    warn!(
                        stack = %name,
                        dependency = %dependency,
                        "selected stack depends on a stack that is not selected; it must already be deployed"
                    );
                }
            }
        }

        if let Err(error) = fs::create_dir_all(out_dir) {
            return Err(Error::Unknown(error.to_string()));
        }

        let mut entries = BTreeMap::new();
        for (name, stack) in self.stacks.iter().filter(|(name, _)| selected.contains(*name)) {
            let file = template_file(name);
            write_json(&out_dir.join(&file), &stack.template().to_json())?;
            info!(stack = %name, file = %file, "wrote template");

            entries.insert(
                name.clone(),
                ManifestEntry {
                    template_file: file,
                    dependencies: stack.dependencies().iter().cloned().collect(),
                    environment: environment.to_string(),
                },
            );
        }

        let manifest = Manifest {
            version: String::from(MANIFEST_VERSION),
            stacks: entries,
            deployment_order: layers
                .into_iter()
                .map(|layer| layer.into_iter().filter(|name| selected.contains(name)).collect::<Vec<_>>())
                .filter(|layer| !layer.is_empty())
                .collect(),
        };
        write_json(&out_dir.join(MANIFEST_FILE), &manifest)?;

        return Ok(manifest);
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), Error> {
    let contents = match serde_json::to_string_pretty(value) {
        Ok(contents) => contents,
        Err(error) => return Err(Error::ParsingError(error.to_string())),
    };

    match fs::write(path, contents) {
        Ok(_) => Ok(()),
        Err(error) => Err(Error::Unknown(error.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::fs;

    use serde_json::json;

    use super::{environment, Assembly, Error, Manifest, MANIFEST_FILE};
    use crate::stack::Stack;
    use crate::template::Resource;

    fn producer_and_consumer(declare_dependency: bool) -> Assembly {
        let mut producer = Stack::new("ProducerStack", "producer");
        producer
            .add("Bucket", Resource::new("AWS::S3::Bucket", json!({})))
            .unwrap();
        let bucket = producer.export("Bucket").unwrap();

        let mut consumer = Stack::new("ConsumerStack", "consumer");
        let value = consumer.resolve(&bucket);
        consumer
            .add("Queue", Resource::new("AWS::SQS::Queue", json!({ "QueueName": value })))
            .unwrap();
        if declare_dependency {
            consumer.add_dependency(&producer);
        }

        let mut assembly = Assembly::new();
        assembly.add(producer).unwrap();
        assembly.add(consumer).unwrap();
        assembly
    }

    #[test]
    fn rejects_imports_without_a_dependency() {
        assert_eq!(
            Err(Error::UndeclaredImport {
                stack: String::from("ConsumerStack"),
                producer: String::from("ProducerStack"),
            }),
            producer_and_consumer(false).validate()
        );
    }

    #[test]
    fn rejects_duplicate_stacks() {
        let mut assembly = Assembly::new();
        assembly.add(Stack::new("A", "a")).unwrap();
        assert_eq!(
            Err(Error::DuplicateStack(String::from("A"))),
            assembly.add(Stack::new("A", "again"))
        );
    }

    #[test]
    fn writes_selected_templates_and_manifest() {
        let assembly = producer_and_consumer(true);
        let dir = tempfile::tempdir().unwrap();
        let selected: BTreeSet<String> = [String::from("ConsumerStack")].into_iter().collect();

        let manifest = assembly
            .write(dir.path(), &selected, &environment(Some("968874455930"), None))
            .unwrap();

        assert!(dir.path().join("ConsumerStack.template.json").exists());
        assert!(!dir.path().join("ProducerStack.template.json").exists());
        assert_eq!(vec![vec![String::from("ConsumerStack")]], manifest.deployment_order);

        let written: Manifest =
            serde_json::from_str(&fs::read_to_string(dir.path().join(MANIFEST_FILE)).unwrap()).unwrap();
        assert_eq!(manifest, written);
        let entry = &written.stacks["ConsumerStack"];
        assert_eq!(vec![String::from("ProducerStack")], entry.dependencies);
        assert_eq!("aws://968874455930/unknown-region", entry.environment);
    }
}
