//! Dependency planning over stack names.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("Stack `{stack}` depends on unknown stack `{dependency}`")]
    UnknownDependency { stack: String, dependency: String },

    #[error("Dependency cycle between stacks; resolved {resolved}/{total}")]
    Cycle { resolved: usize, total: usize },
}

/// Node name -> names it depends on.
pub type Edges = BTreeMap<String, BTreeSet<String>>;

/// Orders the graph into layers: layer N depends only on layers 0..N-1, so
/// every stack in a layer may be provisioned in parallel.
pub fn plan_layers(edges: &Edges) -> Result<Vec<Vec<String>>, Error> {
    let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

    for (node, dependencies) in edges {
        in_degree.entry(node.as_str()).or_insert(0);
        for dependency in dependencies {
            if !edges.contains_key(dependency) {
                return Err(Error::UnknownDependency {
                    stack: node.clone(),
                    dependency: dependency.clone(),
                });
            }
            dependents
                .entry(dependency.as_str())
                .or_default()
                .push(node.as_str());
            *in_degree.entry(node.as_str()).or_insert(0) += 1;
        }
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(node, _)| *node)
        .collect();
    let mut layers = Vec::new();
    let mut resolved = 0;

    while !queue.is_empty() {
        let mut layer = Vec::new();
        for _ in 0..queue.len() {
            let Some(current) = queue.pop_front() else {
                break;
            };
            layer.push(current.to_string());
            resolved += 1;

            for &dependent in dependents.get(current).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
        }
        layer.sort();
        layers.push(layer);
    }

    if resolved != edges.len() {
        return Err(Error::Cycle {
            resolved,
            total: edges.len(),
        });
    }

    Ok(layers)
}

/// Nodes nothing else needs to exist first.
pub fn sources(edges: &Edges) -> Vec<String> {
    edges
        .iter()
        .filter(|(_, dependencies)| dependencies.is_empty())
        .map(|(node, _)| node.clone())
        .collect()
}

/// Nodes no other node depends on.
pub fn sinks(edges: &Edges) -> Vec<String> {
    let depended_on: BTreeSet<&String> = edges.values().flatten().collect();
    edges
        .keys()
        .filter(|node| !depended_on.contains(node))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edges(pairs: &[(&str, &[&str])]) -> Edges {
        pairs
            .iter()
            .map(|(node, deps)| {
                (
                    node.to_string(),
                    deps.iter().map(|dep| dep.to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn diamond_plans_into_three_layers() {
        let graph = edges(&[
            ("a", &[]),
            ("b", &["a"]),
            ("c", &["a"]),
            ("d", &["b", "c"]),
        ]);

        let layers = plan_layers(&graph).unwrap();
        assert_eq!(
            vec![vec!["a"], vec!["b", "c"], vec!["d"]],
            layers
                .iter()
                .map(|layer| layer.iter().map(String::as_str).collect::<Vec<_>>())
                .collect::<Vec<_>>()
        );
        assert_eq!(vec!["a"], sources(&graph));
        assert_eq!(vec!["d"], sinks(&graph));
    }

    #[test]
    fn cycle_is_rejected() {
        let graph = edges(&[("a", &["c"]), ("b", &["a"]), ("c", &["b"])]);
        match plan_layers(&graph) {
            Err(Error::Cycle { resolved: 0, total: 3 }) => {}
            other => panic!("Expected `Cycle` error, got {:?}", other),
        }
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let graph = edges(&[("a", &["ghost"])]);
        assert_eq!(
            Err(Error::UnknownDependency {
                stack: String::from("a"),
                dependency: String::from("ghost"),
            }),
            plan_layers(&graph)
        );
    }
}
