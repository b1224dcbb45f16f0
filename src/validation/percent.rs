//! Leaf-level match percentage between an expected and an actual tree.

use std::collections::{BTreeMap, HashSet};

use serde_json::Value;

use super::diff::{child_path, index_path};

/// Reduce a tree to `(path, leaf)` pairs; containers are walked, not counted.
pub fn flatten(value: &Value) -> Vec<(String, Value)> {
    let mut out = Vec::new();
    flatten_into(value, "", &mut out);
    out
}

fn flatten_into(value: &Value, path: &str, out: &mut Vec<(String, Value)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                flatten_into(child, &child_path(path, key), out);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                flatten_into(child, &index_path(path, index), out);
            }
        }
        leaf => out.push((path.to_string(), leaf.clone())),
    }
}

/// Percent of expected leaves found in `actual` at the same path.
pub fn match_percent(expected: &Value, actual: &Value) -> f64 {
    match_report(expected, actual).0
}

/// Percent plus the matched `path -> value` pairs.
pub fn match_report(expected: &Value, actual: &Value) -> (f64, BTreeMap<String, Value>) {
    let expected_leaves = flatten(expected);
    if expected_leaves.is_empty() {
        return (100.0, BTreeMap::new());
    }

    let actual_leaves: HashSet<(String, String)> = flatten(actual)
        .into_iter()
        .map(|(path, value)| (path, value.to_string()))
        .collect();

    let mut matches = BTreeMap::new();
    let mut hits = 0usize;
    for (path, value) in &expected_leaves {
        if actual_leaves.contains(&(path.clone(), value.to_string())) {
            hits += 1;
            matches.insert(path.clone(), value.clone());
        }
    }

    let percent = 100.0 * hits as f64 / expected_leaves.len() as f64;
    (percent, matches)
}
