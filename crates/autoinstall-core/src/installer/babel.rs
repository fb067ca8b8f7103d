//! Babel configuration check.
//!
//! Presets and plugins named in `.babelrc` are loaded by Babel at transform
//! time, long after resolution, so they never show up as resolution
//! failures. They are collected up front instead.

use crate::error::Error;
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;

/// Babel config file read from the project root.
pub const BABELRC: &str = ".babelrc";

/// Package names required by the project's `.babelrc`.
///
/// Returns an empty list when there is no `.babelrc`. The list includes
/// `babel-core` whenever any preset or plugin is configured.
pub fn babel_dependencies(root: &Path) -> Result<Vec<String>, Error> {
    let path = root.join(BABELRC);
    if !path.is_file() {
        return Ok(Vec::new());
    }

    let content = std::fs::read_to_string(&path).map_err(|source| Error::ConfigRead {
        path: path.clone(),
        source,
    })?;
    let json: Value =
        serde_json::from_str(&content).map_err(|source| Error::ConfigParse { path, source })?;

    let mut deps: Vec<String> = entries(&json, "presets")
        .map(|name| qualify(name, "babel-preset-"))
        .chain(entries(&json, "plugins").map(|name| qualify(name, "babel-plugin-")))
        .collect();

    if !deps.is_empty() {
        deps.insert(0, "babel-core".to_string());
    }
    let mut seen = HashSet::new();
    deps.retain(|dep| seen.insert(dep.clone()));
    Ok(deps)
}

/// Names listed under `key`. Entries are either `"name"` or `["name", {options}]`.
fn entries<'a>(json: &'a Value, key: &str) -> impl Iterator<Item = &'a str> {
    json.get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|entry| match entry {
            Value::String(s) => Some(s.as_str()),
            Value::Array(items) => items.first().and_then(Value::as_str),
            _ => None,
        })
}

fn qualify(name: &str, prefix: &str) -> String {
    if name.starts_with('@') || name.starts_with(prefix) || name.starts_with('.') {
        name.to_string()
    } else {
        format!("{prefix}{name}")
    }
}
