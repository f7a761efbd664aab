//! `--stacks` filter matching.

use std::collections::BTreeSet;

use tracing::warn;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("Invalid stack pattern `{0}`: `*` is only allowed as the last character")]
    InvalidPattern(String),

    #[error("Stack filter `{0}` selects no stacks")]
    NoMatch(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Pattern<'a> {
    Exact(&'a str),
    Prefix(&'a str),
}

impl<'a> Pattern<'a> {
    fn parse(raw: &'a str) -> Result<Self, Error> {
        let (body, wildcard) = match raw.strip_suffix('*') {
            Some(prefix) => (prefix, true),
            None => (raw, false),
        };
        if body.contains('*') {
            return Err(Error::InvalidPattern(raw.to_string()));
        }

        if wildcard {
            Ok(Pattern::Prefix(body))
        } else {
            Ok(Pattern::Exact(body))
        }
    }

    fn matches(&self, name: &str) -> bool {
        match self {
            Pattern::Exact(exact) => name == *exact,
            Pattern::Prefix(prefix) => name.starts_with(prefix),
        }
    }
}

/// Names matching a comma-separated filter such as `Network*,ServiceStack`.
/// No filter, or an empty one, selects every stack; a filter that selects
/// nothing is an error.
pub fn select_stacks<'a, I>(names: I, filter: Option<&str>) -> Result<BTreeSet<String>, Error>
where
    I: IntoIterator<Item = &'a str>,
{
    let names: Vec<&str> = names.into_iter().collect();

    let filter = match filter.map(str::trim).filter(|filter| !filter.is_empty()) {
        Some(filter) => filter,
        None => return Ok(names.iter().map(|name| name.to_string()).collect()),
    };
    let patterns = filter
        .split(',')
        .map(str::trim)
        .filter(|pattern| !pattern.is_empty())
        .map(Pattern::parse)
        .collect::<Result<Vec<_>, _>>()?;

    let mut selected = BTreeSet::new();
    for pattern in &patterns {
        let before = selected.len();
        let mut matched = false;
        for name in names.iter().filter(|name| pattern.matches(name)) {
            matched = true;
            selected.insert(name.to_string());
        }
        if !matched {
            warn!(pattern = ?pattern, "stack pattern matched nothing");
        } else if selected.len() == before {
            warn!(pattern = ?pattern, "stack pattern only matched already selected stacks");
        }
    }

    if selected.is_empty() {
        return Err(Error::NoMatch(filter.to_string()));
    }
    Ok(selected)
}
