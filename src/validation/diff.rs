//! # Structural Diff
//!
//! Computes the differences between an expected and an actual JSON tree.
//! Object keys only present in `actual` are ignored; arrays are compared as
//! unordered collections unless the caller asks for positional comparison.
//!
//! Arrays holding composite elements are paired by sorting both sides on the
//! canonical (sorted-key) serialization of each element and zipping. This is
//! a heuristic, not a minimum-cost matching: two arrays that differ in one
//! element can shift the pairing of their neighbours.

use std::collections::BTreeMap;

use serde_json::Value;

use super::types::Difference;

/// Diff with the default unordered-array rule and no path prefix.
pub fn diff(expected: &Value, actual: &Value) -> Vec<Difference> {
    Differ::default().diff(expected, actual, "")
}

#[derive(Debug, Clone, Copy)]
pub struct Differ {
    pub ignore_array_order: bool,
}

impl Default for Differ {
    fn default() -> Self {
        Self {
            ignore_array_order: true,
        }
    }
}

impl Differ {
    pub fn new(ignore_array_order: bool) -> Self {
        Self { ignore_array_order }
    }

    pub fn diff(&self, expected: &Value, actual: &Value, prefix: &str) -> Vec<Difference> {
        let mut out = Vec::new();
        self.compare(expected, actual, prefix, &mut out);
        out
    }

    fn compare(&self, expected: &Value, actual: &Value, path: &str, out: &mut Vec<Difference>) {
        // An empty container expects nothing, whatever came back.
        if is_empty_container(expected) {
            return;
        }
        match (expected, actual) {
            (Value::Object(exp), Value::Object(act)) => {
                for (key, exp_value) in exp {
                    let child = child_path(path, key);
                    match act.get(key) {
                        None => out.push(Difference::missing(child, exp_value.clone())),
                        Some(act_value) => self.compare(exp_value, act_value, &child, out),
                    }
                }
            }
            (Value::Array(exp), Value::Array(act)) => self.compare_arrays(exp, act, path, out),
            _ if expected != actual => out.push(Difference::mismatch(
                here(path),
                expected.clone(),
                actual.clone(),
            )),
            _ => {}
        }
    }

    fn compare_arrays(&self, exp: &[Value], act: &[Value], path: &str, out: &mut Vec<Difference>) {
        if all_primitive(exp) && all_primitive(act) {
            let equal = if self.ignore_array_order {
                multiset(exp) == multiset(act)
            } else {
                exp == act
            };
            if !equal {
                out.push(Difference::mismatch(
                    here(path),
                    Value::Array(exp.to_vec()),
                    Value::Array(act.to_vec()),
                ));
            }
            return;
        }

        let (exp, act): (Vec<&Value>, Vec<&Value>) = if self.ignore_array_order {
            (sorted_canonically(exp), sorted_canonically(act))
        } else {
            (exp.iter().collect(), act.iter().collect())
        };

        for index in 0..exp.len().max(act.len()) {
            let child = index_path(path, index);
            match (exp.get(index), act.get(index)) {
                (Some(e), Some(a)) => self.compare(e, a, &child, out),
                (Some(e), None) => out.push(Difference::missing(child, (*e).clone())),
                (None, Some(a)) => out.push(Difference::unexpected(child, (*a).clone())),
                (None, None) => {}
            }
        }
    }
}

pub(crate) fn is_primitive(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

fn is_empty_container(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn all_primitive(values: &[Value]) -> bool {
    values.iter().all(is_primitive)
}

/// Element counts keyed by canonical serialization.
fn multiset(values: &[Value]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for value in values {
        *counts.entry(value.to_string()).or_insert(0) += 1;
    }
    counts
}

fn sorted_canonically(values: &[Value]) -> Vec<&Value> {
    let mut keyed: Vec<(String, &Value)> = values.iter().map(|v| (v.to_string(), v)).collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    keyed.into_iter().map(|(_, v)| v).collect()
}

pub(crate) fn child_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

pub(crate) fn index_path(prefix: &str, index: usize) -> String {
    format!("{prefix}[{index}]")
}

fn here(path: &str) -> String {
    if path.is_empty() {
        "root".to_string()
    } else {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::types::DiffKind;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn identical_trees_have_no_diffs() {
        let tree = json!({"a": 1, "b": {"c": [1, 2, {"d": null}]}, "e": "x"});
        assert!(diff(&tree, &tree).is_empty());
    }

    #[test]
    fn missing_key_reported_with_dotted_path() {
        let diffs = diff(&json!({"a": {"b": 1, "c": 2}}), &json!({"a": {"b": 1}}));
        assert_eq!(diffs, vec![Difference::missing("a.c", json!(2))]);
    }

    #[test]
    fn extra_actual_keys_are_ignored() {
        assert!(diff(&json!({"a": 1}), &json!({"a": 1, "b": 2})).is_empty());
    }

    #[test]
    fn scalar_mismatch_at_root_uses_root_path() {
        let diffs = diff(&json!(1), &json!(2));
        assert_eq!(diffs, vec![Difference::mismatch("root", json!(1), json!(2))]);
    }

    #[test]
    fn type_change_is_a_mismatch() {
        let diffs = diff(&json!({"a": {"b": 1}}), &json!({"a": "flat"}));
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].kind, DiffKind::Mismatch);
        assert_eq!(diffs[0].path, "a");
    }

    #[test]
    fn primitive_arrays_compare_as_multisets() {
        assert!(diff(&json!({"x": [1, 2, 2, 3]}), &json!({"x": [2, 3, 1, 2]})).is_empty());

        let diffs = diff(&json!({"x": [1, 2, 2]}), &json!({"x": [1, 2]}));
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].path, "x");
        assert_eq!(diffs[0].kind, DiffKind::Mismatch);
    }

    #[test]
    fn composite_arrays_pair_by_canonical_order() {
        let expected = json!({"items": [{"id": 2, "v": "b"}, {"id": 1, "v": "a"}]});
        let actual = json!({"items": [{"id": 1, "v": "a"}, {"id": 2, "v": "b"}]});
        assert!(diff(&expected, &actual).is_empty());
    }

    #[test]
    fn composite_arrays_report_nested_path() {
        let expected = json!({"items": [{"id": 1, "v": "a"}]});
        let actual = json!({"items": [{"id": 1, "v": "z"}]});
        assert_eq!(
            diff(&expected, &actual),
            vec![Difference::mismatch("items[0].v", json!("a"), json!("z"))]
        );
    }

    #[test]
    fn unpaired_composite_elements() {
        let diffs = diff(&json!([{"a": 1}, {"b": 2}]), &json!([{"a": 1}]));
        assert_eq!(diffs, vec![Difference::missing("[1]", json!({"b": 2}))]);

        let diffs = diff(&json!([{"a": 1}]), &json!([{"a": 1}, {"z": 0}]));
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].kind, DiffKind::Unexpected);
    }

    #[test]
    fn ordered_mode_compares_positionally() {
        let differ = Differ::new(false);
        let diffs = differ.diff(&json!({"x": [1, 2]}), &json!({"x": [2, 1]}), "");
        assert_eq!(diffs.len(), 1);

        let diffs = differ.diff(&json!([{"a": 1}, {"a": 2}]), &json!([{"a": 2}, {"a": 1}]), "");
        assert_eq!(diffs.len(), 2);
        assert_eq!(diffs[0].path, "[0].a");
    }

    #[test]
    fn empty_expected_matches_anything() {
        for actual in [json!("plain text"), json!([1, 2]), json!(null), json!(5), json!({"a": 1})] {
            assert!(diff(&json!({}), &actual).is_empty(), "{{}} vs {actual}");
            assert!(diff(&json!([]), &actual).is_empty(), "[] vs {actual}");
        }
        assert!(diff(&json!({"meta": {}}), &json!({"meta": "none"})).is_empty());
    }

    #[test]
    fn prefix_is_applied() {
        let diffs = Differ::default().diff(&json!({"a": 1}), &json!({"a": 2}), "body");
        assert_eq!(diffs[0].path, "body.a");
    }

    proptest! {
        #[test]
        fn primitive_permutations_never_differ(
            mut values in proptest::collection::vec(any::<i32>(), 0..12),
            seed in any::<u64>(),
        ) {
            let original = json!({"x": values.clone()});
            let len = values.len().max(1);
            values.rotate_left((seed as usize) % len);
            values.reverse();
            let permuted = json!({"x": values});
            prop_assert!(diff(&original, &permuted).is_empty());
            prop_assert!(diff(&permuted, &original).is_empty());
        }

        #[test]
        fn any_tree_equals_itself(
            keys in proptest::collection::vec("[a-z]{1,6}", 0..6),
            numbers in proptest::collection::vec(any::<i64>(), 0..6),
        ) {
            let mut map = serde_json::Map::new();
            for (key, number) in keys.iter().zip(numbers.iter()) {
                map.insert(key.clone(), json!({"n": number, "list": [number, key]}));
            }
            let tree = Value::Object(map);
            prop_assert!(diff(&tree, &tree).is_empty());
        }
    }
}
